use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store {name}: {message}")]
    Corrupt { name: String, message: String },

    #[error("Key error: {0}")]
    Key(String),
}
