use std::{str::FromStr, time::Duration};

use log::warn;
use wager_core::{ColorPalette, ColorRoundSettings, PayoutSettings};

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub chess_clock_secs: u32,
    pub chess_disconnect_grace: Duration,
    pub color_round: ColorRoundSettings,
    pub color_result_delay: Duration,
    pub color_palette: ColorPalette,
    pub payout: PayoutSettings,
    pub room_ttl: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            chess_clock_secs: 600,
            chess_disconnect_grace: Duration::from_secs(60),
            color_round: ColorRoundSettings::default(),
            color_result_delay: Duration::from_secs(5),
            color_palette: ColorPalette::default(),
            payout: PayoutSettings::default(),
            room_ttl: Duration::from_secs(1800),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        let defaults = GameConfig::default();
        let mut config = GameConfig {
            chess_clock_secs: env_or("WAGER_CHESS_CLOCK_SECS", defaults.chess_clock_secs),
            chess_disconnect_grace: Duration::from_secs(env_or(
                "WAGER_CHESS_DISCONNECT_GRACE_SECS",
                defaults.chess_disconnect_grace.as_secs(),
            )),
            color_round: ColorRoundSettings {
                betting_seconds: env_or(
                    "WAGER_COLOR_BETTING_SECS",
                    defaults.color_round.betting_seconds,
                ),
                history_cap: env_or("WAGER_COLOR_HISTORY_CAP", defaults.color_round.history_cap),
                starting_balance: env_or(
                    "WAGER_COLOR_STARTING_BALANCE",
                    defaults.color_round.starting_balance,
                ),
            },
            color_result_delay: Duration::from_secs(env_or(
                "WAGER_COLOR_RESULT_DELAY_SECS",
                defaults.color_result_delay.as_secs(),
            )),
            color_palette: defaults.color_palette.clone(),
            payout: PayoutSettings {
                winner_share_percent: env_or(
                    "WAGER_WINNER_SHARE_PERCENT",
                    defaults.payout.winner_share_percent,
                ),
            },
            room_ttl: Duration::from_secs(env_or(
                "WAGER_ROOM_TTL_SECS",
                defaults.room_ttl.as_secs(),
            )),
        };

        if config.chess_clock_secs == 0 {
            warn!("WAGER_CHESS_CLOCK_SECS must be positive, using default");
            config.chess_clock_secs = defaults.chess_clock_secs;
        }
        if config.color_round.betting_seconds == 0 {
            warn!("WAGER_COLOR_BETTING_SECS must be positive, using default");
            config.color_round.betting_seconds = defaults.color_round.betting_seconds;
        }
        if !config.payout.is_valid() {
            warn!("WAGER_WINNER_SHARE_PERCENT must be at most 100, using default");
            config.payout = defaults.payout;
        }
        config
    }
}
