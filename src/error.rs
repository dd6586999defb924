use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `TbError` and maps other errors to
/// convert to a `TbError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum TbError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    /// Rejected configuration or intervention input.
    InvalidConfig(String),
    TbError(String),
}

impl From<io::Error> for TbError {
    fn from(error: io::Error) -> Self {
        TbError::IoError(error)
    }
}

impl From<serde_json::Error> for TbError {
    fn from(error: serde_json::Error) -> Self {
        TbError::JsonError(error)
    }
}

impl From<csv::Error> for TbError {
    fn from(error: csv::Error) -> Self {
        TbError::CSVError(error)
    }
}

impl From<String> for TbError {
    fn from(error: String) -> Self {
        TbError::TbError(error)
    }
}

impl From<&str> for TbError {
    fn from(error: &str) -> Self {
        TbError::TbError(error.to_string())
    }
}

impl std::error::Error for TbError {}

impl Display for TbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {self:?}")?;
        Ok(())
    }
}
