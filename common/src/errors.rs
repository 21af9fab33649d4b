// Error handling framework

use thiserror::Error;

/// Interval parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid interval '{interval}': {reason}")]
    InvalidInterval { interval: String, reason: String },

    #[error("Interval '{interval}' is shorter than the minimum of {minimum}")]
    IntervalTooShort { interval: String, minimum: String },
}

/// Task registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task store error: {0}")]
    Store(String),
}

/// Repository capability errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Not a git repository: {0}")]
    NotARepository(String),

    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("No staged changes to commit")]
    NothingToCommit,

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Commit message generation errors
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("LLM API credentials not configured")]
    MissingCredentials,

    #[error("Request to message endpoint failed: {0}")]
    Request(String),

    #[error("Message endpoint returned status {0}")]
    Status(u16),

    #[error("Message endpoint error: {0}")]
    Api(String),

    #[error("Failed to decode message endpoint response: {0}")]
    MalformedResponse(String),

    #[error("Message endpoint returned no message")]
    EmptyResponse,
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GenerationError::MalformedResponse(err.to_string())
        } else {
            GenerationError::Request(err.to_string())
        }
    }
}

/// Commit message resolution errors
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("No LLM credentials and no static message configured")]
    NoSource,

    #[error("Message generation failed and no static message configured: {0}")]
    GenerationFailed(#[source] GenerationError),
}

/// Scheduler lifecycle errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler has been stopped")]
    Stopped,

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Failed to load tasks: {0}")]
    Registry(#[from] RegistryError),
}

/// Settings loading and validation errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unable to determine configuration directory")]
    NoConfigDir,

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write configuration: {0}")]
    Io(#[from] std::io::Error),
}

// Implement From for common external errors
impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RegistryError::NotFound("Record not found".to_string()),
            _ => RegistryError::Store(err.to_string()),
        }
    }
}
