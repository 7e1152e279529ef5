//! 跌倒检测线程 (Fall detection worker)
//!
//! 输入: Frame (时间戳 + 前景轮廓) → FallDetector → 输出: FallEvent
//! 输入通道关闭后线程退出, 返回统计信息

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;
use imageproc::point::Point;
use tracing::{debug, info, warn};

use crate::config::FallDetectorConfig;
use crate::detection::{FallDetector, FallEvent};

/// 单个前景目标
#[derive(Clone, Debug)]
pub struct FrameObject {
    pub contour: Vec<Point<i32>>,
    /// 回放数据中的人形标注
    pub human: Option<bool>,
}

/// 一帧输入
#[derive(Clone, Debug)]
pub struct Frame {
    /// 毫秒时间戳 (单调不减)
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    /// 可选的画面像素 (HOG 分类器需要)
    pub pixels: Option<Arc<RgbImage>>,
    pub objects: Vec<FrameObject>,
}

/// 线程统计
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub duplicates_skipped: u64,
    pub fall_events: u64,
    pub human_count: u64,
}

/// 检测线程主循环
pub fn fall_detection_thread(
    rx_frames: Receiver<Frame>,
    tx_events: Sender<FallEvent>,
    mut detector: FallDetector,
) -> PipelineStats {
    info!("跌倒检测线程启动");

    let mut stats = PipelineStats::default();
    let mut last_timestamp: Option<u64> = None;
    let started = Instant::now();

    while let Ok(frame) = rx_frames.recv() {
        stats.frames_received += 1;

        // 重复时间戳的帧直接丢弃
        if last_timestamp == Some(frame.timestamp) {
            stats.duplicates_skipped += 1;
            debug!(timestamp = frame.timestamp, "跳过重复时间戳");
            continue;
        }
        if let Some(prev) = last_timestamp {
            if frame.timestamp < prev {
                warn!(prev, timestamp = frame.timestamp, "时间戳回退");
            }
        }
        last_timestamp = Some(frame.timestamp);

        let frame_size = (frame.width, frame.height);
        let detections = frame
            .objects
            .into_iter()
            .map(|o| {
                detector
                    .detection(o.contour, frame_size, frame.pixels.clone())
                    .with_label(o.human)
            })
            .collect();

        let events = detector.process_frame(detections, frame.timestamp);
        stats.frames_processed += 1;

        for event in events {
            stats.fall_events += 1;
            if tx_events.send(event).is_err() {
                warn!("事件接收端已关闭, 检测线程退出");
                stats.human_count = detector.human_count();
                return stats;
            }
        }
    }

    stats.human_count = detector.human_count();
    let elapsed = started.elapsed().as_secs_f64();
    info!(
        frames = stats.frames_processed,
        skipped = stats.duplicates_skipped,
        events = stats.fall_events,
        "跌倒检测线程结束 ({:.2}s)",
        elapsed
    );
    stats
}

/// 启动检测线程
///
/// 返回 (帧发送端, 事件接收端, 线程句柄); 丢弃帧发送端即可让线程结束
pub fn spawn(
    config: &FallDetectorConfig,
    capacity: usize,
) -> anyhow::Result<(Sender<Frame>, Receiver<FallEvent>, JoinHandle<PipelineStats>)> {
    let detector = FallDetector::new(config).context("创建FallDetector失败")?;

    let (tx_frames, rx_frames) = crossbeam_channel::bounded(capacity.max(1));
    let (tx_events, rx_events) = crossbeam_channel::unbounded();

    let handle = thread::Builder::new()
        .name("fall-detector".to_string())
        .spawn(move || fall_detection_thread(rx_frames, tx_events, detector))
        .context("启动检测线程失败")?;

    Ok((tx_frames, rx_events, handle))
}
