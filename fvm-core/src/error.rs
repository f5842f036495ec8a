use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FvmCoreError {
    #[error("Invalid matrix dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Non-finite value at index {index}: {value}")]
    NonFinite { index: usize, value: f64 },
}

pub type Result<T> = core::result::Result<T, FvmCoreError>;
