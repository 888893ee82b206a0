use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BufferError {
    #[error("index {index} out of range for buffer of length {length}")]
    OutOfRange { index: usize, length: usize },
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
    #[error("invalid {encoding} input: {detail}")]
    Decode {
        encoding: &'static str,
        detail: String,
    },
}

impl BufferError {
    pub fn out_of_range(index: usize, length: usize) -> Self {
        BufferError::OutOfRange { index, length }
    }

    pub fn decode(encoding: &'static str, detail: impl Into<String>) -> Self {
        BufferError::Decode {
            encoding,
            detail: detail.into(),
        }
    }
}
