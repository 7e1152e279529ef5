//! 跌倒事件检测
//! Fall event detection over a track's state history
//!
//! 跌倒 = 最终稳定在躺倒姿态 + 稳定之前的一段时间内曾经站立。
//! 中间的过渡过程 (坐姿/噪声) 不要求满足任何模式。

use serde::{Deserialize, Serialize};

use super::state::StateVar;
use super::track::{FallStatus, History, Track};
use super::types::{Pose, PoseThresholds};

/// 各状态变量标准差的容差
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// x, y (像素)
    pub pos: f32,
    /// h, w (像素)
    pub size: f32,
    /// angle (弧度)
    pub angle: f32,
}

impl Tolerance {
    fn for_var(&self, var: StateVar) -> f32 {
        match var {
            StateVar::X | StateVar::Y => self.pos,
            StateVar::H | StateVar::W => self.size,
            StateVar::Angle => self.angle,
        }
    }
}

/// 跌倒检测参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallEventParams {
    /// 状态需保持稳定的时间窗口 (毫秒)
    pub stabilize_interval_ms: u64,
    /// 稳定窗口之前检查是否站立过的时间窗口 (毫秒)
    pub fall_interval_ms: u64,
    pub tolerance: Tolerance,
}

/// 跌倒事件检测器 (无状态)
#[derive(Debug, Clone)]
pub struct FallEventDetector {
    params: FallEventParams,
    pose: PoseThresholds,
}

impl FallEventDetector {
    pub fn new(params: FallEventParams, pose: PoseThresholds) -> Self {
        Self { params, pose }
    }

    /// 检测跌倒
    ///
    /// # 返回
    /// - `Some(timestamp)`: 已跌倒, 时间为躺倒稳定窗口的起始时间
    /// - `None`: 未检测到跌倒
    pub fn detect(&self, track: &Track) -> Option<u64> {
        if track.pose(&self.pose) != Pose::Lying {
            return None;
        }

        if !self.has_pose_stabilized(track.history()) {
            return None;
        }

        if let FallStatus::Fallen { at } = track.fallen() {
            return Some(at);
        }

        self.has_fall_occurred(track.history())
    }

    /// 最近 `stabilize_interval_ms` 内各状态变量的标准差都不超过容差
    pub fn has_pose_stabilized(&self, history: &History) -> bool {
        let (Some(&(_, first)), Some(&(_, end))) = (history.first(), history.last()) else {
            return false;
        };

        // 历史长度不足一个稳定窗口
        if end.saturating_sub(first) < self.params.stabilize_interval_ms {
            return false;
        }

        let start = interval_start_index(history, self.params.stabilize_interval_ms);
        StateVar::ALL.iter().all(|&var| {
            let values: Vec<f32> = history.states().skip(start).map(|s| s.field(var)).collect();
            std_dev(&values) <= self.params.tolerance.for_var(var)
        })
    }

    /// 稳定窗口之前的 `fall_interval_ms` 内若有任一站立状态, 判定为跌倒
    fn has_fall_occurred(&self, history: &History) -> Option<u64> {
        let stabilized_start = interval_start_index(history, self.params.stabilize_interval_ms);
        let fall_start = interval_start_index(
            history,
            self.params.fall_interval_ms + self.params.stabilize_interval_ms,
        );

        let was_standing = history
            .iter()
            .skip(fall_start)
            .take(stabilized_start.saturating_sub(fall_start))
            .any(|(s, _)| self.pose.classify(s.h, s.w, s.angle) == Pose::Standing);

        if was_standing {
            history.get(stabilized_start).map(|(_, t)| *t)
        } else {
            None
        }
    }
}

/// 时间窗口在历史中的起始序号
///
/// 从末尾向前扫描, 返回满足 `end - t[i] >= interval_ms` 的最大 i; 不存在时为 0
pub fn interval_start_index(history: &History, interval_ms: u64) -> usize {
    let Some(&(_, end)) = history.last() else {
        return 0;
    };

    history
        .timestamps()
        .enumerate()
        .rev()
        .find(|&(_, t)| end.saturating_sub(t) >= interval_ms)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// 总体标准差
fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt() as f32
}
