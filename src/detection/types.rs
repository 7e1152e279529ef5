use std::fmt;
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// 跌倒检测系统数据结构定义
/// Data structures for the fall detection core

/// 跟踪ID (每个Scene内单调递增,不复用)
pub type TrackId = u64;

// ========== 枚举类型 ==========

/// 目标类别 (只允许 Object → Human 单向转换)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Object,
    Human,
}

impl ObjectType {
    /// 单向提升: 一旦为 Human 就不再回退
    pub fn promote(self, candidate: ObjectType) -> ObjectType {
        match (self, candidate) {
            (ObjectType::Human, _) | (_, ObjectType::Human) => ObjectType::Human,
            _ => ObjectType::Object,
        }
    }
}

/// 姿态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pose {
    Standing,
    Sitting,
    Lying,
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pose::Standing => "STANDING",
            Pose::Sitting => "SITTING",
            Pose::Lying => "LYING",
        };
        f.write_str(name)
    }
}

/// 姿态判定阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseThresholds {
    /// 高宽比大于该值视为站立
    pub standing_ratio: f32,
    /// 高宽比小于等于该值一律视为躺倒
    pub lying_ratio: f32,
    /// 中间区间内, 主轴角度大于该值视为坐姿 (弧度)
    pub lying_angle: f32,
}

impl PoseThresholds {
    /// 根据 (h, w, angle) 判定姿态, 每次重新计算
    pub fn classify(&self, h: f32, w: f32, angle: f32) -> Pose {
        let ratio = h / w;
        if ratio > self.standing_ratio {
            Pose::Standing
        } else if ratio > self.lying_ratio {
            if angle > self.lying_angle {
                Pose::Sitting
            } else {
                Pose::Lying
            }
        } else {
            Pose::Lying
        }
    }
}

// ========== 数据结构 ==========

/// 轴对齐矩形 (像素坐标, 左上角 + 宽高)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn xmax(&self) -> i32 {
        self.x + self.width
    }

    pub fn ymax(&self) -> i32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

/// 检测区域 (外扩后的ROI, 供人形分类器使用)
///
/// 只在当前帧处理期间有效: 轨迹在下一次更新或惯性推进时会丢弃它
#[derive(Clone)]
pub struct Region {
    /// 外扩并裁剪到画面内的矩形
    pub rect: Rect,
    /// 外扩像素
    pub padding: u32,
    /// 画面尺寸 (width, height)
    pub frame_size: (u32, u32),
    /// 离线回放时附带的人形标注
    pub label: Option<bool>,
    frame: Option<Arc<RgbImage>>,
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("rect", &self.rect)
            .field("padding", &self.padding)
            .field("frame_size", &self.frame_size)
            .field("label", &self.label)
            .field("has_pixels", &self.frame.is_some())
            .finish()
    }
}

impl Region {
    /// 以紧致外接矩形为基础, 四周外扩 `padding` 并裁剪到画面范围
    pub fn new(
        bounds: Rect,
        padding: u32,
        frame_size: (u32, u32),
        frame: Option<Arc<RgbImage>>,
    ) -> Self {
        let pad = padding as i32;
        let max_x = (frame_size.0 as i32 - 1).max(0);
        let max_y = (frame_size.1 as i32 - 1).max(0);

        let x0 = (bounds.x - pad).max(0);
        let y0 = (bounds.y - pad).max(0);
        let x1 = (bounds.xmax() + pad).min(max_x);
        let y1 = (bounds.ymax() + pad).min(max_y);

        Self {
            rect: Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0)),
            padding,
            frame_size,
            label: None,
            frame,
        }
    }

    pub fn with_label(mut self, label: Option<bool>) -> Self {
        self.label = label;
        self
    }

    /// 以同一画面重建区域 (合并检测时使用)
    pub fn rebuild(&self, bounds: Rect) -> Self {
        Region::new(bounds, self.padding, self.frame_size, self.frame.clone())
    }

    pub fn has_pixels(&self) -> bool {
        self.frame.is_some()
    }

    /// 裁剪出ROI图像, 无像素数据或区域为空时返回 None
    pub fn to_image(&self) -> Option<RgbImage> {
        let frame = self.frame.as_ref()?;
        if self.rect.width <= 0 || self.rect.height <= 0 {
            return None;
        }
        let x = self.rect.x as u32;
        let y = self.rect.y as u32;
        let w = (self.rect.width as u32).min(frame.width().saturating_sub(x));
        let h = (self.rect.height as u32).min(frame.height().saturating_sub(y));
        if w == 0 || h == 0 {
            return None;
        }
        Some(image::imageops::crop_imm(frame.as_ref(), x, y, w, h).to_image())
    }
}

/// 跌倒事件 (躺倒稳定窗口的起始时间)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallEvent {
    pub track_id: TrackId,
    pub timestamp: u64,
}

impl fmt::Display for FallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track {} fell at {} ms", self.track_id, self.timestamp)
    }
}
