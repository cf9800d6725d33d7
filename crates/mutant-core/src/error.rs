//! Error types shared by every mutant crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Fuel exhausted after {0} instructions")]
    FuelExhausted(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Baseline tests fail: {failures} of {attempts} examples failed")]
    BaselineFailed { failures: usize, attempts: usize },

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::BaselineFailed { failures: 2, attempts: 5 };
        assert_eq!(
            err.to_string(),
            "Baseline tests fail: 2 of 5 examples failed"
        );

        let err = Error::FuelExhausted(100);
        assert_eq!(err.to_string(), "Fuel exhausted after 100 instructions");
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
