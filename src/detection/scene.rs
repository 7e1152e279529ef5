//! 场景 (轨迹注册表)
//! Scene: frame-to-frame association, merge recovery, track lifecycle
//!
//! 每帧处理顺序:
//! 1. 所有轨迹 unseen + 1
//! 2. 生成候选: 预测面积/检测面积 ∈ (1/K, K), 代价为质心距离平方
//! 3. 贪心匹配: 全局按代价升序, 依次提交并剔除已用的轨迹和检测
//! 4. 合并救援: 未匹配轨迹的预测框内若包含多个剩余检测的质心, 取凸包合并后更新
//! 5. 剩余检测 → 新建轨迹
//! 6. 删除 unseen 超过阈值的轨迹
//! 7. 仍未匹配的轨迹惯性推进

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::object::Detection;
use super::track::Track;
use super::types::TrackId;

/// 场景参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneParams {
    /// 匹配面积比阈值 K (> 1)
    pub match_area_threshold: f32,
    /// 连续未匹配超过该帧数则删除轨迹
    pub expire_after_frames: u32,
    /// 每条轨迹保留的最大历史长度
    pub history_max_len: usize,
}

/// 匹配候选 (代价, 轨迹ID, 检测序号)
type Candidate = (f32, TrackId, usize);

/// 场景
pub struct Scene {
    /// 当前轨迹 (按ID升序, 保证遍历顺序可复现)
    tracks: BTreeMap<TrackId, Track>,

    /// 下一个分配的ID
    next_id: TrackId,

    params: SceneParams,
}

impl Scene {
    pub fn new(params: SceneParams) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 0,
            params,
        }
    }

    /// 用当前帧的检测目标更新场景
    ///
    /// 调用方需保证时间戳单调不减
    pub fn update(&mut self, detections: Vec<Detection>, timestamp: u64) {
        // 1. 老化
        for track in self.tracks.values_mut() {
            track.age();
        }

        // 2. 候选生成 + 3. 贪心匹配
        let candidates = self.match_candidates(&detections);
        let mut slots: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
        let matched = self.assign_greedy(candidates, &mut slots, timestamp);

        // 4. 合并救援
        let merged = self.recover_merged(&mut slots, timestamp);

        // 5. 新建轨迹
        let mut created = 0;
        for detection in slots.into_iter().flatten() {
            let id = self.next_id();
            debug!(track_id = id, x = detection.state().x, y = detection.state().y, "新建轨迹");
            self.tracks.insert(
                id,
                Track::new(id, detection, timestamp, self.params.history_max_len),
            );
            created += 1;
        }

        // 6. 过期删除
        let expire_after = self.params.expire_after_frames;
        let before = self.tracks.len();
        self.tracks.retain(|id, track| {
            let keep = track.unseen() <= expire_after;
            if !keep {
                debug!(track_id = *id, unseen = track.unseen(), "轨迹过期");
            }
            keep
        });
        let expired = before - self.tracks.len();

        // 7. 惯性推进
        for track in self.tracks.values_mut().filter(|t| t.unseen() > 0) {
            track.coast(timestamp);
        }

        debug!(
            timestamp,
            matched, merged, created, expired,
            tracks = self.tracks.len(),
            "场景更新"
        );
    }

    /// 面积比过滤后的所有 (轨迹, 检测) 候选
    fn match_candidates(&self, detections: &[Detection]) -> Vec<Candidate> {
        let k = self.params.match_area_threshold;
        let mut candidates = Vec::new();

        for (&id, track) in &self.tracks {
            let predicted = track.predicted_state();
            for (det_idx, detection) in detections.iter().enumerate() {
                let measured = detection.state();
                let area_ratio = predicted.area() / measured.area();
                if area_ratio < k && area_ratio > 1.0 / k {
                    candidates.push((predicted.dist_square_from(&measured), id, det_idx));
                }
            }
        }

        candidates
    }

    /// 贪心匹配: 按代价排序 (稳定排序, 代价相同时保持 轨迹ID→检测序号 的枚举顺序)
    fn assign_greedy(
        &mut self,
        mut candidates: Vec<Candidate>,
        slots: &mut [Option<Detection>],
        timestamp: u64,
    ) -> usize {
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut used_tracks = BTreeSet::new();
        for (_, id, det_idx) in candidates {
            if used_tracks.contains(&id) {
                continue;
            }
            let Some(detection) = slots[det_idx].take() else {
                continue;
            };
            if let Some(track) = self.tracks.get_mut(&id) {
                track.update(detection, timestamp);
            }
            used_tracks.insert(id);
        }

        used_tracks.len()
    }

    /// 合并救援: 被分割成多块的目标
    fn recover_merged(&mut self, slots: &mut [Option<Detection>], timestamp: u64) -> usize {
        let unhandled: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.unseen() > 0)
            .map(|(&id, _)| id)
            .collect();

        let mut merged_count = 0;
        for id in unhandled {
            let Some(track) = self.tracks.get_mut(&id) else {
                continue;
            };
            let predicted = track.predicted_state();

            let parts: Vec<Detection> = slots
                .iter_mut()
                .filter(|slot| {
                    slot.as_ref()
                        .is_some_and(|d| predicted.contains(&d.state()))
                })
                .filter_map(Option::take)
                .collect();
            if parts.is_empty() {
                continue;
            }

            let refs: Vec<&Detection> = parts.iter().collect();
            match Detection::merge(&refs) {
                Ok(merged) => {
                    debug!(track_id = id, parts = parts.len(), "合并救援");
                    track.update(merged, timestamp);
                    merged_count += 1;
                }
                Err(e) => warn!(track_id = id, "合并失败: {}", e),
            }
        }

        merged_count
    }

    fn next_id(&mut self) -> TrackId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// 所有轨迹 (按ID升序)
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
