//! 错误类型
//! Error types for the fall detection core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// 合并了空的检测列表 (调用方违反契约)
    #[error("cannot merge an empty list of detections")]
    EmptyMerge,

    #[error("unknown people detector backend: {0}")]
    UnknownBackend(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HOG error: {0}")]
    Hog(String),

    /// ONNX Runtime 加载或推理失败
    #[error("model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownBackend("ssd".to_string());
        assert!(err.to_string().contains("unknown people detector backend"));
        assert!(err.to_string().contains("ssd"));
        assert!(Error::EmptyMerge.to_string().contains("empty"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }
}
