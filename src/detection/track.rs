//! 跟踪目标
//! Tracked object: identity, sticky classification, bounded state history

use std::collections::VecDeque;

use imageproc::point::Point;

use super::object::Detection;
use super::people::PeopleDetector;
use super::state::State;
use super::state_predictor::StatePredictor;
use super::types::{ObjectType, Pose, PoseThresholds, Region, TrackId};

// ========== 历史记录 ==========

/// 有界状态历史 (时间升序, 超出容量时淘汰最旧的记录)
#[derive(Clone, Debug)]
pub struct History {
    entries: VecDeque<(State, u64)>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, state: State, timestamp: u64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((state, timestamp));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn first(&self) -> Option<&(State, u64)> {
        self.entries.front()
    }

    pub fn last(&self) -> Option<&(State, u64)> {
        self.entries.back()
    }

    pub fn get(&self, index: usize) -> Option<&(State, u64)> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &(State, u64)> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.entries.iter().map(|(s, _)| s)
    }

    pub fn timestamps(&self) -> impl DoubleEndedIterator<Item = u64> + ExactSizeIterator + '_ {
        self.entries.iter().map(|(_, t)| *t)
    }
}

// ========== 跌倒状态 ==========

/// 跌倒判定缓存 (一旦确认跌倒, 在轨迹生命周期内保持)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallStatus {
    #[default]
    NotFallen,
    Fallen {
        at: u64,
    },
}

impl FallStatus {
    pub fn timestamp(&self) -> Option<u64> {
        match self {
            FallStatus::NotFallen => None,
            FallStatus::Fallen { at } => Some(*at),
        }
    }
}

// ========== 跟踪目标 ==========

/// 跟踪目标
#[derive(Clone, Debug)]
pub struct Track {
    /// 唯一跟踪ID
    pub id: TrackId,

    /// 类别 (Object → Human 单向)
    classification: ObjectType,

    /// 当前帧ROI (惯性推进时清空)
    region: Option<Region>,

    /// 当前轮廓
    contour: Vec<Point<i32>>,

    /// 观测状态历史
    history: History,

    /// 预测状态历史 (调试/绘制用)
    predicted_history: VecDeque<State>,

    /// 最新的卡尔曼预测 (下一帧匹配使用)
    predicted_state: State,

    /// 连续未匹配帧数
    unseen: u32,

    /// 跌倒判定缓存
    fallen: FallStatus,

    /// 卡尔曼状态预测器
    predictor: StatePredictor,
}

impl Track {
    /// 由未匹配的检测目标创建新轨迹
    pub fn new(id: TrackId, detection: Detection, timestamp: u64, history_len: usize) -> Self {
        let mut track = Self::from_state(id, detection.state(), timestamp, history_len);
        track.region = Some(detection.region);
        track.contour = detection.contour;
        track
    }

    /// 由单个状态创建轨迹 (无轮廓和ROI)
    pub fn from_state(id: TrackId, state: State, timestamp: u64, history_len: usize) -> Self {
        let mut predictor = StatePredictor::new(state);
        let predicted_state = predictor.predict(state);

        let mut history = History::new(history_len);
        history.push(state, timestamp);

        let mut predicted_history = VecDeque::with_capacity(history.capacity());
        predicted_history.push_back(predicted_state);

        Self {
            id,
            classification: ObjectType::Object,
            region: None,
            contour: Vec::new(),
            history,
            predicted_history,
            predicted_state,
            unseen: 0,
            fallen: FallStatus::NotFallen,
            predictor,
        }
    }

    /// 用匹配(或合并)的检测目标更新
    pub fn update(&mut self, detection: Detection, timestamp: u64) {
        let state = detection.state();
        self.unseen = 0;
        self.region = Some(detection.region);
        self.contour = detection.contour;
        self.observe(state, timestamp);
    }

    /// 惯性推进: 以上一次观测状态作为本帧观测, 保持 unseen 不变
    pub fn coast(&mut self, timestamp: u64) {
        self.region = None;
        self.observe(self.state(), timestamp);
    }

    /// 用状态直接更新 (无轮廓数据时使用)
    pub fn update_state(&mut self, state: State, timestamp: u64) {
        self.unseen = 0;
        self.region = None;
        self.observe(state, timestamp);
    }

    fn observe(&mut self, state: State, timestamp: u64) {
        self.history.push(state, timestamp);
        self.predicted_state = self.predictor.predict(state);
        if self.predicted_history.len() == self.history.capacity() {
            self.predicted_history.pop_front();
        }
        self.predicted_history.push_back(self.predicted_state);
    }

    /// 增加未匹配帧数
    pub fn age(&mut self) {
        self.unseen += 1;
    }

    /// 调用人形分类器判断当前ROI; 为真时类别提升为 Human (不可逆)
    pub fn classify(&mut self, detector: &mut dyn PeopleDetector) -> bool {
        let Some(region) = self.region.as_ref() else {
            return false;
        };
        let is_human = detector.detect_human(region);
        let candidate = if is_human {
            ObjectType::Human
        } else {
            ObjectType::Object
        };
        self.classification = self.classification.promote(candidate);
        is_human
    }

    /// 当前姿态 (每次由最新状态重新计算)
    pub fn pose(&self, thresholds: &PoseThresholds) -> Pose {
        let state = self.state();
        thresholds.classify(state.h, state.w, state.angle)
    }

    /// 记录跌倒 (只会从未跌倒变为已跌倒)
    pub fn mark_fallen(&mut self, timestamp: u64) {
        if self.fallen == FallStatus::NotFallen {
            self.fallen = FallStatus::Fallen { at: timestamp };
        }
    }

    /// 最新观测状态
    pub fn state(&self) -> State {
        self.history.last().map(|(s, _)| *s).unwrap_or_default()
    }

    pub fn last_timestamp(&self) -> u64 {
        self.history.last().map(|(_, t)| *t).unwrap_or_default()
    }

    pub fn predicted_state(&self) -> State {
        self.predicted_state
    }

    pub fn predicted_history(&self) -> &VecDeque<State> {
        &self.predicted_history
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn unseen(&self) -> u32 {
        self.unseen
    }

    pub fn classification(&self) -> ObjectType {
        self.classification
    }

    pub fn is_human(&self) -> bool {
        self.classification == ObjectType::Human
    }

    pub fn fallen(&self) -> FallStatus {
        self.fallen
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn contour(&self) -> &[Point<i32>] {
        &self.contour
    }
}
