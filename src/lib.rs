pub mod config; // 检测参数配置
pub mod detection; // 跌倒检测核心
pub mod error; // 错误类型
pub mod pipeline; // 检测线程

pub use crate::config::FallDetectorConfig;
pub use crate::detection::{FallDetector, FallEvent};
pub use crate::error::{Error, Result};

/// 毫秒时间戳格式化为本地时间字符串
pub fn format_timestamp(timestamp_ms: u64, delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    match chrono::DateTime::from_timestamp_millis(timestamp_ms as i64) {
        Some(t) => t.with_timezone(&chrono::Local).format(&fmt).to_string(),
        None => timestamp_ms.to_string(),
    }
}
