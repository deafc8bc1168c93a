use std::fmt::Display;

use thiserror::Error;

pub mod app;
pub mod chess;
pub mod color;
pub mod config;
pub mod connection;
pub mod identity;
pub mod invite;
pub mod matchmaking;
pub mod room;
pub mod settlement;
pub mod transport;

pub type IdentityId = String;
pub type RoomId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameType {
    Chess,
    Color,
}

impl GameType {
    pub const ALL: [GameType; 2] = [GameType::Chess, GameType::Color];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Chess => "chess",
            GameType::Color => "color",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            GameType::Chess => "Chess",
            GameType::Color => "Color Prediction",
        }
    }
}

impl Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("operation not possible: {0}")]
    NotPossible(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn bad_request<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::BadRequest(msg.into()))
    }

    pub fn unauthorized<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Unauthorized(msg.into()))
    }

    pub fn not_found<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::NotFound(msg.into()))
    }

    pub fn not_possible<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::NotPossible(msg.into()))
    }

    /// The reason text without the category prefix, suitable for clients.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::NotFound(m)
            | ServiceError::Unauthorized(m)
            | ServiceError::BadRequest(m)
            | ServiceError::NotPossible(m)
            | ServiceError::Internal(m) => m,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
