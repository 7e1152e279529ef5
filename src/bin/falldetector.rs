//! 跌倒检测回放 (Fall Detector Replay)
//!
//! 读取录制好的前景轮廓 (JSON Lines), 逐帧送入检测线程, 输出跌倒事件
//!
//! 每行一帧:
//! {"timestamp": 1200, "width": 640, "height": 480,
//!  "objects": [{"contour": [[x, y], ...], "human": true}]}

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use falldetector_rs::pipeline::{self, Frame, FrameObject};
use falldetector_rs::{format_timestamp, FallDetectorConfig};
use imageproc::point::Point;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 跌倒检测回放参数
#[derive(Parser, Debug)]
#[command(author, version, about = "跌倒检测 - 轮廓回放", long_about = None)]
struct Args {
    /// 配置文件 (不存在时创建默认配置)
    #[arg(short, long, default_value = "falldetector.json")]
    config: PathBuf,

    /// 录制的帧数据 (JSON Lines)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 打印配置后退出
    #[arg(long, default_value_t = false)]
    print_config: bool,

    /// 帧队列容量
    #[arg(long, default_value_t = 64)]
    queue: usize,
}

#[derive(Deserialize, Debug)]
struct ObjectRecord {
    contour: Vec<[i32; 2]>,
    #[serde(default)]
    human: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct FrameRecord {
    timestamp: u64,
    width: u32,
    height: u32,
    #[serde(default)]
    objects: Vec<ObjectRecord>,
}

impl From<FrameRecord> for Frame {
    fn from(record: FrameRecord) -> Self {
        Frame {
            timestamp: record.timestamp,
            width: record.width,
            height: record.height,
            pixels: None,
            objects: record
                .objects
                .into_iter()
                .map(|o| FrameObject {
                    contour: o.contour.iter().map(|&[x, y]| Point::new(x, y)).collect(),
                    human: o.human,
                })
                .collect(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = FallDetectorConfig::load_or_create(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    config.print_summary();

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let Some(input) = args.input else {
        warn!("未指定 --input, 退出");
        return Ok(());
    };

    println!("🚀 跌倒检测回放启动");
    println!("📹 输入: {}", input.display());

    let file = File::open(&input).with_context(|| format!("打开输入失败: {}", input.display()))?;
    let (tx_frames, rx_events, handle) = pipeline::spawn(&config, args.queue)?;

    // ========== 事件输出线程 ==========
    let printer = std::thread::spawn(move || {
        let mut count = 0u64;
        for event in rx_events.iter() {
            count += 1;
            println!(
                "🚨 跌倒告警: 轨迹 #{} 于 {} ms 跌倒 (告警时间 {})",
                event.track_id,
                event.timestamp,
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            );
        }
        count
    });

    // ========== 逐行读取并发送 ==========
    let mut sent = 0u64;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("读取第 {} 行失败", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FrameRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("第 {} 行解析失败: {}", line_no + 1, e);
                continue;
            }
        };
        if tx_frames.send(record.into()).is_err() {
            warn!("检测线程已退出");
            break;
        }
        sent += 1;
    }
    drop(tx_frames);

    let stats = handle
        .join()
        .map_err(|_| anyhow::anyhow!("检测线程异常退出"))?;
    let alerts = printer
        .join()
        .map_err(|_| anyhow::anyhow!("事件输出线程异常退出"))?;

    info!(sent, "回放结束 ({})", format_timestamp(chrono::Local::now().timestamp_millis() as u64, "-"));
    println!();
    println!("📊 统计:");
    println!("  接收帧数: {}", stats.frames_received);
    println!("  处理帧数: {}", stats.frames_processed);
    println!("  重复时间戳: {}", stats.duplicates_skipped);
    println!("  人形识别: {}", stats.human_count);
    println!("  跌倒事件: {}", alerts);

    Ok(())
}
