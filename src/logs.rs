use log::LevelFilter;
use log4rs::{
    Config,
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            RollingFileAppender,
            policy::compound::{
                CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
            },
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

const LOG_SIZE_LIMIT: u64 = 10 * 1024 * 1024; // 10 MB

const LOG_FILE_COUNT: u32 = 3;

const LOG_PATTERN: &str = "{d} {l} - {m}{n}";

/// Console logging always; a rolling file as well when `LOG_FILE_PATH` is set.
pub fn init_logger() -> Result<(), String> {
    let stderr_level = LevelFilter::Info;
    let file_level = LevelFilter::Debug;

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let mut builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(stderr_level)))
            .build("stderr", Box::new(stderr)),
    );
    let mut root = Root::builder().appender("stderr");

    if let Ok(file_path) = std::env::var("LOG_FILE_PATH") {
        let archive_pattern = std::env::var("LOG_ARCHIVE_PATTERN")
            .unwrap_or_else(|_| format!("{}.{{}}.gz", file_path));

        let trigger = SizeTrigger::new(LOG_SIZE_LIMIT);
        let roller = FixedWindowRoller::builder()
            .build(&archive_pattern, LOG_FILE_COUNT)
            .map_err(|e| format!("Invalid LOG_ARCHIVE_PATTERN: {}", e))?;
        let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

        let logfile = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(&file_path, Box::new(policy))
            .map_err(|e| format!("Failed to open log file {}: {}", file_path, e))?;

        builder = builder.appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(file_level)))
                .build("logfile", Box::new(logfile)),
        );
        root = root.appender("logfile");
    }

    let config = builder
        .build(root.build(LevelFilter::Trace))
        .map_err(|e| format!("Invalid logger config: {}", e))?;

    log4rs::init_config(config).map_err(|e| format!("Failed to initialize logger: {}", e))?;
    Ok(())
}
