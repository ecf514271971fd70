use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Job has no input references")]
    EmptyJob,

    #[error("Too many active jobs (limit {limit})")]
    TooManyJobs { limit: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;
