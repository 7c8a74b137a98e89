use thiserror::Error;

/// Errors produced while lowering an I/O statement.
///
/// `Fatal` means the statement is malformed in a way the front end should
/// have rejected; `Unsupported` marks a construct we do not lower yet.
#[derive(Debug, Error)]
pub enum LowerError {
    #[error("{0}")]
    Fatal(String),
    #[error("not yet implemented: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Module(#[from] cranelift_module::ModuleError),
}

impl LowerError {
    pub fn fatal(message: impl Into<String>) -> Self {
        LowerError::Fatal(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        LowerError::Unsupported(message.into())
    }
}

pub type Result<T> = std::result::Result<T, LowerError>;
