//! 跌倒检测器 (FallDetector)
//! 职责: 面积过滤 → Scene更新 → 人形分类 → 人形轨迹的跌倒判定 → FallEvent

use std::sync::Arc;

use image::RgbImage;
use imageproc::point::Point;
use tracing::{debug, info};

use super::fall_event::FallEventDetector;
use super::object::Detection;
use super::people::{PeopleDetector, PeopleDetectorKind};
use super::scene::Scene;
use super::track::FallStatus;
use super::types::{FallEvent, Pose, PoseThresholds, TrackId};
use crate::config::FallDetectorConfig;
use crate::error::Result;

pub struct FallDetector {
    scene: Scene,
    event_detector: FallEventDetector,
    people: Box<dyn PeopleDetector>,
    pose: PoseThresholds,

    object_min_area: f32,
    object_max_area: f32,
    region_padding: u32,

    // 统计
    frames: u64,
    human_count: u64,
}

impl FallDetector {
    /// 按配置创建 (人形分类器后端由配置选择)
    pub fn new(config: &FallDetectorConfig) -> Result<Self> {
        let people = PeopleDetectorKind::from_config(&config.people_detector)?;
        Self::with_people_detector(config, Box::new(people))
    }

    /// 使用外部提供的人形分类器
    pub fn with_people_detector(
        config: &FallDetectorConfig,
        people: Box<dyn PeopleDetector>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scene: Scene::new(config.scene_params()),
            event_detector: FallEventDetector::new(config.fall, config.pose),
            people,
            pose: config.pose,
            object_min_area: config.object_min_area,
            object_max_area: config.object_max_area,
            region_padding: config.region_padding,
            frames: 0,
            human_count: 0,
        })
    }

    /// 由轮廓构造检测目标 (使用配置的ROI外扩)
    pub fn detection(
        &self,
        contour: Vec<Point<i32>>,
        frame_size: (u32, u32),
        frame: Option<Arc<RgbImage>>,
    ) -> Detection {
        Detection::from_contour(contour, self.region_padding, frame_size, frame)
    }

    /// 处理一帧
    ///
    /// 返回本帧首次确认的跌倒事件; 已确认过的轨迹不会重复上报
    pub fn process_frame(&mut self, detections: Vec<Detection>, timestamp: u64) -> Vec<FallEvent> {
        self.frames += 1;

        let total = detections.len();
        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.area >= self.object_min_area && d.area <= self.object_max_area)
            .collect();
        if detections.len() < total {
            debug!(
                timestamp,
                dropped = total - detections.len(),
                "面积过滤"
            );
        }

        self.scene.update(detections, timestamp);

        // 人形分类: 只对本帧有ROI且尚未确认为人的轨迹调用
        for track in self.scene.tracks_mut() {
            if track.unseen() > 0 || track.is_human() || track.region().is_none() {
                continue;
            }
            if track.classify(self.people.as_mut()) {
                self.human_count += 1;
                info!(track_id = track.id, "识别为人形");
            }
        }

        // 跌倒判定
        let mut events = Vec::new();
        for track in self.scene.tracks_mut().filter(|t| t.is_human()) {
            let Some(at) = self.event_detector.detect(track) else {
                continue;
            };
            if track.fallen() == FallStatus::NotFallen {
                track.mark_fallen(at);
                let event = FallEvent {
                    track_id: track.id,
                    timestamp: at,
                };
                info!(track_id = track.id, fell_at = at, timestamp, "检测到跌倒");
                events.push(event);
            }
        }

        events
    }

    /// 所有轨迹的当前姿态 (按ID升序)
    pub fn poses(&self) -> Vec<(TrackId, Pose)> {
        self.scene
            .tracks()
            .map(|t| (t.id, t.pose(&self.pose)))
            .collect()
    }

    /// 人形分类为真的次数
    pub fn human_count(&self) -> u64 {
        self.human_count
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::Region;

    struct CountingDetector {
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl PeopleDetector for CountingDetector {
        fn detect_human(&mut self, _region: &Region) -> bool {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            true
        }
    }

    fn config() -> FallDetectorConfig {
        FallDetectorConfig {
            region_padding: 10,
            ..FallDetectorConfig::default()
        }
    }

    fn rect_contour(x: i32, y: i32, w: i32, h: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h / 2),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
            Point::new(x, y + h / 2),
        ]
    }

    #[test]
    fn test_area_filter() {
        let mut fd = FallDetector::new(&config()).unwrap();
        let small = fd.detection(rect_contour(10, 10, 20, 20), (640, 480), None);
        let large = fd.detection(rect_contour(0, 0, 400, 300), (640, 480), None);
        let person = fd.detection(rect_contour(200, 100, 40, 100), (640, 480), None);

        fd.process_frame(vec![small, large, person], 0);
        assert_eq!(fd.scene().len(), 1);
        assert_eq!(fd.frames(), 1);
    }

    #[test]
    fn test_classifier_called_until_human() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let detector = CountingDetector {
            calls: calls.clone(),
        };
        let mut fd = FallDetector::with_people_detector(&config(), Box::new(detector)).unwrap();

        for i in 0..5u64 {
            let det = fd.detection(rect_contour(200, 100, 40, 100), (640, 480), None);
            fd.process_frame(vec![det], i * 40);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(fd.human_count(), 1);
        assert!(fd.scene().get(0).unwrap().is_human());
    }

    #[test]
    fn test_unlabeled_objects_stay_objects() {
        let mut fd = FallDetector::new(&config()).unwrap();
        for i in 0..5u64 {
            let det = fd.detection(rect_contour(200, 100, 40, 100), (640, 480), None);
            fd.process_frame(vec![det], i * 40);
        }
        assert_eq!(fd.human_count(), 0);
        assert_eq!(fd.poses(), vec![(0, Pose::Standing)]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut c = config();
        c.match_area_threshold = 0.5;
        assert!(FallDetector::new(&c).is_err());
    }
}
