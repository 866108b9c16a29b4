//! Error types for the LCD driver engine

use thiserror::Error;

/// Error type for driver operations
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Opening or initializing the display device failed
    #[error("Failed to open display device {path}: {source}")]
    DeviceOpen {
        /// Path of the character device that was attempted
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A command packet could not be written during a mandatory sequence
    #[error("Device write failed during {stage}: {source}")]
    DeviceWrite {
        /// Which sequence was being sent (e.g. "init", "close")
        stage: &'static str,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The rasterizer rejected the font face data
    #[error("Failed to load font {path}: {reason}")]
    FontLoad {
        /// Path of the font file
        path: String,
        /// Parser message from the rasterizer
        reason: String,
    },

    /// The engine was asked to operate before `open` succeeded
    #[error("Display is not open")]
    NotOpen,

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_open_display() {
        let err = Error::DeviceOpen {
            path: "/dev/lcd0".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/dev/lcd0"));
    }

    #[test]
    fn test_font_load_display() {
        let err = Error::FontLoad {
            path: "missing.ttf".to_string(),
            reason: "unsupported table".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load font missing.ttf: unsupported table"
        );
    }
}
