//! 人形分类器
//! People detectors used to promote a track from Object to Human
//!
//! - Hog:     HOG特征 + 线性SVM, 64x128 滑窗
//! - Nn:      ONNX 目标检测网络 (YOLOv8 / MobileNet-SSD 导出)
//! - Labeled: 使用回放数据中附带的标注
//! - None:    从不提升

use std::fs;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use imageproc::hog::{hog, HogOptions, HogSpec};
use ndarray::{s, Array4, ArrayView2, Axis};
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::types::Region;
use crate::error::{Error, Result};

/// 检测窗口宽度
pub const WINDOW_WIDTH: u32 = 64;
/// 检测窗口高度
pub const WINDOW_HEIGHT: u32 = 128;
/// 缩放后ROI的最大宽度
pub const MAX_ROI_WIDTH: u32 = 100;

/// 人形分类器接口
pub trait PeopleDetector: Send {
    /// 判断ROI内是否有人
    fn detect_human(&mut self, region: &Region) -> bool;
}

// ========== HOG + 线性SVM ==========

/// 线性SVM权重 (JSON: `{"weights": [...], "bias": 0.0}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HogWeights {
    pub weights: Vec<f32>,
    pub bias: f32,
}

/// HOG 分类器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HogParams {
    /// SVM权重文件路径
    pub weights_path: Option<String>,
    /// 判定阈值 (得分大于该值视为人)
    pub hit_threshold: f32,
    /// 滑窗步长 (像素)
    pub window_stride: u32,
}

impl Default for HogParams {
    fn default() -> Self {
        Self {
            weights_path: None,
            hit_threshold: 0.0,
            window_stride: 8,
        }
    }
}

pub struct HogDetector {
    weights: HogWeights,
    hit_threshold: f32,
    window_stride: u32,
}

impl HogDetector {
    /// Dalal-Triggs 行人检测的标准参数: 9方向无符号, 8x8 cell, 2x2 block
    pub fn options() -> HogOptions {
        HogOptions::new(9, false, 8, 2, 1)
    }

    /// 单个 64x128 窗口的描述子长度
    pub fn descriptor_length() -> Result<usize> {
        let spec = HogSpec::from_options(WINDOW_WIDTH, WINDOW_HEIGHT, Self::options())
            .map_err(Error::Hog)?;
        Ok(spec.descriptor_length())
    }

    pub fn new(weights: HogWeights, hit_threshold: f32, window_stride: u32) -> Result<Self> {
        let expected = Self::descriptor_length()?;
        if weights.weights.len() != expected {
            return Err(Error::Hog(format!(
                "SVM权重长度 {} 与描述子长度 {} 不一致",
                weights.weights.len(),
                expected
            )));
        }

        Ok(Self {
            weights,
            hit_threshold,
            window_stride: window_stride.max(1),
        })
    }

    /// 从JSON权重文件加载
    pub fn from_file(path: impl AsRef<Path>, hit_threshold: f32, window_stride: u32) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let weights: HogWeights = serde_json::from_str(&json)?;
        info!("HOG权重已从 {} 加载 ({} 维)", path.display(), weights.weights.len());
        Self::new(weights, hit_threshold, window_stride)
    }

    fn score(&self, window: &GrayImage) -> Option<f32> {
        let features = hog(window, Self::options()).ok()?;
        let dot: f32 = features
            .iter()
            .zip(&self.weights.weights)
            .filter(|(f, _)| f.is_finite())
            .map(|(f, w)| f * w)
            .sum();
        Some(dot + self.weights.bias)
    }

    /// 在灰度ROI上滑窗, 任一窗口得分超过阈值即为真
    fn detect_gray(&self, roi: &GrayImage) -> bool {
        let roi = resize_for_window(roi);
        let (w, h) = roi.dimensions();

        let mut y = 0;
        while y + WINDOW_HEIGHT <= h {
            let mut x = 0;
            while x + WINDOW_WIDTH <= w {
                let window = imageops::crop_imm(&roi, x, y, WINDOW_WIDTH, WINDOW_HEIGHT).to_image();
                if let Some(score) = self.score(&window) {
                    if score > self.hit_threshold {
                        debug!(x, y, score, "HOG命中");
                        return true;
                    }
                }
                x += self.window_stride;
            }
            y += self.window_stride;
        }
        false
    }
}

impl PeopleDetector for HogDetector {
    fn detect_human(&mut self, region: &Region) -> bool {
        match region.to_image() {
            Some(rgb) => self.detect_gray(&imageops::grayscale(&rgb)),
            None => false,
        }
    }
}

/// 缩放ROI: 宽度限制在 [64, 100], 高度至少 128
fn resize_for_window(roi: &GrayImage) -> GrayImage {
    let (w, h) = roi.dimensions();
    if w == 0 || h == 0 {
        return GrayImage::new(WINDOW_WIDTH, WINDOW_HEIGHT);
    }

    let target_w = w.clamp(WINDOW_WIDTH, MAX_ROI_WIDTH);
    let scale = target_w as f32 / w as f32;
    let target_h = ((h as f32 * scale).round() as u32).max(WINDOW_HEIGHT);

    if (target_w, target_h) == (w, h) {
        return roi.clone();
    }
    imageops::resize(roi, target_w, target_h, FilterType::Triangle)
}

// ========== ONNX 神经网络 ==========

/// 网络输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NnLayout {
    /// YOLOv8: 输出 [1, 4+nc, N], 输入 RGB/255 等比缩放
    #[default]
    Yolo,
    /// MobileNet-SSD: 输出 [1, 1, N, 7] (image_id, class, conf, x1, y1, x2, y2),
    /// 输入 BGR, (x - 127.5) * 0.007843
    Ssd,
}

/// 神经网络分类器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NnParams {
    /// ONNX模型路径
    pub model_path: Option<String>,
    pub layout: NnLayout,
    /// 输入边长 (YOLOv8 为 640, MobileNet-SSD 为 300)
    pub input_size: u32,
    /// person 类别编号 (COCO 为 0, VOC 为 15)
    pub person_class: usize,
    /// 置信度阈值
    pub conf_threshold: f32,
    /// 输出张量名
    pub output_name: String,
}

impl Default for NnParams {
    fn default() -> Self {
        Self {
            model_path: None,
            layout: NnLayout::Yolo,
            input_size: 640,
            person_class: 0,
            conf_threshold: 0.5,
            output_name: "output0".to_string(),
        }
    }
}

const SSD_SCALE: f32 = 0.007843;
const SSD_MEAN: f32 = 127.5;

fn model_error(e: impl std::fmt::Display) -> Error {
    Error::Model(e.to_string())
}

pub struct NnDetector {
    session: Session,
    params: NnParams,
}

impl NnDetector {
    /// 加载ONNX模型
    pub fn from_file(path: impl AsRef<Path>, params: NnParams) -> Result<Self> {
        let path = path.as_ref();
        // 模型不存在时直接返回IO错误, 不初始化运行时
        fs::metadata(path)?;
        if params.input_size == 0 {
            return Err(Error::InvalidConfig("nn.input_size 必须大于0".to_string()));
        }

        let builder = Session::builder().map_err(model_error)?;
        let session = builder.commit_from_file(path).map_err(model_error)?;
        info!(
            "ONNX模型已从 {} 加载 ({:?}, {}x{})",
            path.display(),
            params.layout,
            params.input_size,
            params.input_size
        );
        Ok(Self { session, params })
    }

    /// 单次推理, 返回 person 类别的最高置信度
    fn infer(&mut self, roi: &RgbImage) -> Result<Option<f32>> {
        let input = preprocess(roi, self.params.layout, self.params.input_size);
        let tensor = Tensor::from_array(input).map_err(model_error)?;
        let outputs = self
            .session
            .run([SessionInputValue::Owned(tensor.into_dyn())])
            .map_err(model_error)?;

        let (dims, data) = outputs[self.params.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(model_error)?;
        let dims: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
        Ok(person_score(self.params.layout, &dims, data, self.params.person_class))
    }
}

impl PeopleDetector for NnDetector {
    fn detect_human(&mut self, region: &Region) -> bool {
        let Some(roi) = region.to_image() else {
            return false;
        };
        match self.infer(&roi) {
            Ok(Some(score)) => {
                debug!(score, "person 置信度");
                score > self.params.conf_threshold
            }
            Ok(None) => false,
            Err(e) => {
                warn!("人形推理失败: {}", e);
                false
            }
        }
    }
}

/// ROI → NCHW 输入张量
fn preprocess(roi: &RgbImage, layout: NnLayout, size: u32) -> Array4<f32> {
    let side = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, side, side));
    let (w0, h0) = roi.dimensions();
    if w0 == 0 || h0 == 0 || size == 0 {
        return input;
    }

    match layout {
        NnLayout::Yolo => {
            input.fill(144.0 / 255.0);
            let ratio = (size as f32 / w0 as f32).min(size as f32 / h0 as f32);
            let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
            let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, size);
            let img = imageops::resize(roi, w_new, h_new, FilterType::Triangle);
            for (x, y, rgb) in img.enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                let [r, g, b] = rgb.0;
                input[[0, 0, y, x]] = r as f32 / 255.0;
                input[[0, 1, y, x]] = g as f32 / 255.0;
                input[[0, 2, y, x]] = b as f32 / 255.0;
            }
        }
        NnLayout::Ssd => {
            let img = imageops::resize(roi, size, size, FilterType::Triangle);
            for (x, y, rgb) in img.enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                let [r, g, b] = rgb.0;
                input[[0, 0, y, x]] = (b as f32 - SSD_MEAN) * SSD_SCALE;
                input[[0, 1, y, x]] = (g as f32 - SSD_MEAN) * SSD_SCALE;
                input[[0, 2, y, x]] = (r as f32 - SSD_MEAN) * SSD_SCALE;
            }
        }
    }
    input
}

/// 从网络输出中取 person 类别的最高置信度
///
/// 只统计最可能类别为 person 的候选; 输出形状不符时返回 None
fn person_score(layout: NnLayout, dims: &[usize], data: &[f32], person_class: usize) -> Option<f32> {
    let mut best: Option<f32> = None;
    match layout {
        NnLayout::Yolo => {
            let &[1, channels, anchors] = dims else {
                return None;
            };
            if channels <= 4 + person_class || data.len() < channels * anchors {
                return None;
            }
            let preds = ArrayView2::from_shape((channels, anchors), &data[..channels * anchors]).ok()?;
            for anchor in preds.axis_iter(Axis(1)) {
                let classes = anchor.slice(s![4..]);
                let Some((class, &conf)) = classes
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                else {
                    continue;
                };
                if class == person_class {
                    best = Some(best.map_or(conf, |b| b.max(conf)));
                }
            }
        }
        NnLayout::Ssd => {
            if dims.last() != Some(&7) {
                return None;
            }
            for det in data.chunks_exact(7) {
                let (class, conf) = (det[1], det[2]);
                if class >= 0.0 && class.round() as usize == person_class {
                    best = Some(best.map_or(conf, |b| b.max(conf)));
                }
            }
        }
    }
    best
}

// ========== 后端选择 ==========

/// 人形分类器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeopleDetectorConfig {
    /// "hog" | "nn" | "labeled" | "none"
    pub backend: String,
    #[serde(default)]
    pub hog: HogParams,
    #[serde(default)]
    pub nn: NnParams,
}

impl Default for PeopleDetectorConfig {
    fn default() -> Self {
        Self {
            backend: "labeled".to_string(),
            hog: HogParams::default(),
            nn: NnParams::default(),
        }
    }
}

/// 人形分类器后端
pub enum PeopleDetectorKind {
    Hog(HogDetector),
    Nn(NnDetector),
    Labeled,
    None,
}

impl PeopleDetectorKind {
    pub fn from_config(config: &PeopleDetectorConfig) -> Result<Self> {
        let kind = match config.backend.to_lowercase().as_str() {
            "hog" => {
                let path = config.hog.weights_path.as_ref().ok_or_else(|| {
                    Error::InvalidConfig("hog 后端需要 weights_path".to_string())
                })?;
                info!("人形分类器: HOG + 线性SVM");
                PeopleDetectorKind::Hog(HogDetector::from_file(
                    path,
                    config.hog.hit_threshold,
                    config.hog.window_stride,
                )?)
            }
            "nn" | "onnx" | "yolo" | "mobilenet" => {
                let path = config.nn.model_path.as_ref().ok_or_else(|| {
                    Error::InvalidConfig("nn 后端需要 model_path".to_string())
                })?;
                info!("人形分类器: ONNX 神经网络");
                PeopleDetectorKind::Nn(NnDetector::from_file(path, config.nn.clone())?)
            }
            "labeled" => {
                info!("人形分类器: 回放标注");
                PeopleDetectorKind::Labeled
            }
            "none" => {
                info!("人形分类器: 禁用");
                PeopleDetectorKind::None
            }
            other => return Err(Error::UnknownBackend(other.to_string())),
        };
        Ok(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PeopleDetectorKind::Hog(_) => "hog",
            PeopleDetectorKind::Nn(_) => "nn",
            PeopleDetectorKind::Labeled => "labeled",
            PeopleDetectorKind::None => "none",
        }
    }
}

impl PeopleDetector for PeopleDetectorKind {
    fn detect_human(&mut self, region: &Region) -> bool {
        match self {
            PeopleDetectorKind::Hog(hog) => hog.detect_human(region),
            PeopleDetectorKind::Nn(nn) => nn.detect_human(region),
            PeopleDetectorKind::Labeled => region.label.unwrap_or(false),
            PeopleDetectorKind::None => false,
        }
    }
}
