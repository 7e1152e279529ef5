//! 跌倒检测配置 - 通过JSON文件调整参数

use std::f32::consts::FRAC_PI_4;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::fall_event::{FallEventParams, Tolerance};
use crate::detection::people::PeopleDetectorConfig;
use crate::detection::scene::SceneParams;
use crate::detection::types::PoseThresholds;
use crate::error::{Error, Result};

/// 跌倒检测参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FallDetectorConfig {
    // === 目标过滤 ===
    pub object_min_area: f32, // 最小轮廓面积(像素)
    pub object_max_area: f32, // 最大轮廓面积(像素)
    pub region_padding: u32,  // ROI外扩像素

    // === 场景/跟踪 ===
    pub match_area_threshold: f32, // 匹配面积比阈值 K
    pub history_max_len: usize,    // 状态历史最大长度
    pub expire_after_frames: u32,  // 连续未匹配帧数上限

    // === 姿态 ===
    pub pose: PoseThresholds,

    // === 跌倒判定 ===
    pub fall: FallEventParams,

    // === 人形分类 ===
    pub people_detector: PeopleDetectorConfig,
}

impl Default for FallDetectorConfig {
    fn default() -> Self {
        Self {
            // 目标过滤
            object_min_area: 1000.0,
            object_max_area: 50000.0,
            region_padding: 30,

            // 场景
            match_area_threshold: 2.0,
            history_max_len: 200,
            expire_after_frames: 15,

            // 姿态
            pose: PoseThresholds {
                standing_ratio: 1.5,
                lying_ratio: 0.5,
                lying_angle: FRAC_PI_4,
            },

            // 跌倒判定
            fall: FallEventParams {
                stabilize_interval_ms: 1000,
                fall_interval_ms: 1000,
                tolerance: Tolerance {
                    pos: 5.0,
                    size: 5.0,
                    angle: 0.1,
                },
            },

            people_detector: PeopleDetectorConfig::default(),
        }
    }
}

impl FallDetectorConfig {
    /// 从JSON文件加载配置 (解析或校验失败直接返回错误)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        info!("配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 配置文件不存在时创建默认配置
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        info!("配置文件不存在, 创建默认配置: {}", path.display());
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("配置已保存到 {}", path.display());
        Ok(())
    }

    /// 参数合法性检查
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(Error::InvalidConfig(msg))
        }

        if !(self.object_min_area < self.object_max_area) {
            return invalid(format!(
                "object_min_area ({}) 必须小于 object_max_area ({})",
                self.object_min_area, self.object_max_area
            ));
        }
        if !(self.match_area_threshold > 1.0) {
            return invalid(format!(
                "match_area_threshold ({}) 必须大于 1",
                self.match_area_threshold
            ));
        }
        if self.history_max_len < 2 {
            return invalid(format!(
                "history_max_len ({}) 至少为 2",
                self.history_max_len
            ));
        }
        if self.fall.stabilize_interval_ms == 0 || self.fall.fall_interval_ms == 0 {
            return invalid("fall 时间窗口必须为正".to_string());
        }
        let tol = &self.fall.tolerance;
        if !(tol.pos >= 0.0 && tol.size >= 0.0 && tol.angle >= 0.0) {
            return invalid(format!("tolerance 不能为负: {:?}", tol));
        }
        if !(self.pose.standing_ratio > self.pose.lying_ratio) {
            return invalid(format!(
                "standing_ratio ({}) 必须大于 lying_ratio ({})",
                self.pose.standing_ratio, self.pose.lying_ratio
            ));
        }
        Ok(())
    }

    pub fn scene_params(&self) -> SceneParams {
        SceneParams {
            match_area_threshold: self.match_area_threshold,
            expire_after_frames: self.expire_after_frames,
            history_max_len: self.history_max_len,
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!(
            "面积过滤: ({:.0}, {:.0}), ROI外扩: {}",
            self.object_min_area, self.object_max_area, self.region_padding
        );
        info!(
            "匹配面积比: {:.2}, 历史长度: {}, 过期帧数: {}",
            self.match_area_threshold, self.history_max_len, self.expire_after_frames
        );
        info!(
            "姿态阈值: 站立 > {:.2}, 躺倒 <= {:.2}, 角度 {:.3}",
            self.pose.standing_ratio, self.pose.lying_ratio, self.pose.lying_angle
        );
        info!(
            "跌倒窗口: 稳定 {}ms, 检查 {}ms, 容差 pos={:.2} size={:.2} angle={:.3}",
            self.fall.stabilize_interval_ms,
            self.fall.fall_interval_ms,
            self.fall.tolerance.pos,
            self.fall.tolerance.size,
            self.fall.tolerance.angle
        );
        info!("人形分类器: {}", self.people_detector.backend);
        if let Some(model) = &self.people_detector.nn.model_path {
            info!(
                "ONNX模型: {} ({:?}, 阈值 {:.2})",
                model, self.people_detector.nn.layout, self.people_detector.nn.conf_threshold
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        let config = FallDetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.expire_after_frames, 15);
        assert_eq!(config.region_padding, 30);
        assert_eq!(config.match_area_threshold, 2.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("falldetector.json");

        let mut config = FallDetectorConfig::default();
        config.history_max_len = 64;
        config.people_detector.backend = "none".to_string();
        config.save(&path).unwrap();

        let loaded = FallDetectorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.json");
        assert!(!path.exists());

        let config = FallDetectorConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, FallDetectorConfig::default());
        assert_eq!(FallDetectorConfig::load_or_create(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = FallDetectorConfig::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(FallDetectorConfig::load(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.json");
        let mut config = FallDetectorConfig::default();
        config.match_area_threshold = 1.0;
        config.save(&path).unwrap();
        assert!(matches!(
            FallDetectorConfig::load(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate() {
        let base = FallDetectorConfig::default();

        let mut c = base.clone();
        c.object_min_area = 60000.0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.history_max_len = 1;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.fall.stabilize_interval_ms = 0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.fall.tolerance.angle = -0.1;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.pose.lying_ratio = 2.0;
        assert!(c.validate().is_err());

        let mut c = base;
        c.fall.tolerance.pos = 0.0;
        assert!(c.validate().is_ok());
    }
}
