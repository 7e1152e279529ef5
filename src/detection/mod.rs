/// 跌倒检测核心 (Fall Detection Core)
///
/// 单线程同步处理, 每帧一次:
/// - Scene:             轨迹关联、合并救援、创建、过期、惯性推进
/// - StatePredictor:    每条轨迹独占的卡尔曼滤波器
/// - FallEventDetector: 人形轨迹的躺倒稳定 + 站立→躺倒判定
/// - FallDetector:      每帧调用顺序 (过滤 → 场景 → 分类 → 判定)
pub mod detector;
pub mod fall_event;
pub mod geometry;
pub mod object;
pub mod people;
pub mod scene;
pub mod state;
pub mod state_predictor;
pub mod track;
pub mod types;

pub use detector::FallDetector;
pub use fall_event::{FallEventDetector, FallEventParams, Tolerance};
pub use object::Detection;
pub use people::{
    HogDetector, NnDetector, NnLayout, NnParams, PeopleDetector, PeopleDetectorConfig,
    PeopleDetectorKind,
};
pub use scene::{Scene, SceneParams};
pub use state::{State, StateVar};
pub use state_predictor::StatePredictor;
pub use track::{FallStatus, History, Track};
pub use types::{FallEvent, ObjectType, Pose, PoseThresholds, Rect, Region, TrackId};
