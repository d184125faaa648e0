use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FitFrameError>;

#[derive(Debug, Error)]
pub enum FitFrameError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("page {page} capture failed: {source}")]
    PageCapture {
        page: usize,
        #[source]
        source: Box<FitFrameError>,
    },
    #[error("output sink rejected {label}: {message}")]
    Sink { label: String, message: String },
    #[error("font error: {0}")]
    Font(String),
    #[error("asset error: {0}")]
    Asset(String),
    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FitFrameError {
    /// The single user-facing notice for this failure.
    pub fn notice(&self) -> Notice {
        match self {
            FitFrameError::InvalidConfiguration(_) => Notice::InvalidWidth,
            _ => Notice::SaveFailed,
        }
    }
}

/// Terse messages shown to the user; nothing structured crosses to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    InvalidWidth,
    SaveFailed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::InvalidWidth => write!(f, "Invalid width, must be greater than 20px"),
            Notice::SaveFailed => write!(f, "Failed to save the image"),
        }
    }
}
