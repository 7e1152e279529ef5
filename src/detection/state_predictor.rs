//! 状态预测器 (卡尔曼滤波)
//! State predictor: constant-velocity Kalman filter over (x, y, angle)
//!
//! 状态向量 (10维): [x, y, h, w, angle, vx, vy, vh, vw, vangle]
//! - x, y, angle: 匀速模型
//! - h, w: 近似常量, vh/vw 两个速度槽位不参与状态转移
//!
//! 观测向量 (5维): [x, y, h, w, angle]

use nalgebra::SMatrix;
use ndarray::{Array1, Array2};

use super::state::{State, STATE_LEN};

/// 滤波器状态维度
pub const FILTER_LEN: usize = 10;

/// 默认过程噪声 (对角阵系数)
pub const DEFAULT_PROCESS_NOISE: f32 = 0.03;

/// 默认观测噪声 (对角阵系数)
pub const DEFAULT_MEASUREMENT_NOISE: f32 = 1.0;

/// 单个目标的状态预测器
///
/// 每个轨迹独占一个实例, 每帧按时间顺序恰好调用一次 [`StatePredictor::predict`];
/// 乱序或跳帧调用会使速度估计失准, 内部不做检查。
#[derive(Clone, Debug)]
pub struct StatePredictor {
    /// 参考状态 (创建时的观测), 滤波前减去、输出时加回
    reference: State,

    /// 状态转移矩阵 F
    transition: Array2<f32>,
    /// 观测矩阵 H
    measurement: Array2<f32>,
    /// 过程噪声 Q
    process_noise: Array2<f32>,
    /// 观测噪声 R
    measurement_noise: Array2<f32>,

    /// 先验估计 (上一次预测的结果)
    state_pre: Array1<f32>,
    cov_pre: Array2<f32>,
    /// 后验估计 (上一次校正的结果)
    state_post: Array1<f32>,
    cov_post: Array2<f32>,
}

impl StatePredictor {
    /// 以参考状态创建预测器, 使用默认噪声参数
    pub fn new(reference: State) -> Self {
        Self::with_noise(reference, DEFAULT_PROCESS_NOISE, DEFAULT_MEASUREMENT_NOISE)
    }

    /// 创建预测器
    ///
    /// # 参数
    /// - `reference`: 参考状态
    /// - `q`: 过程噪声 (越小越平滑)
    /// - `r`: 观测噪声 (越大越平滑)
    pub fn with_noise(reference: State, q: f32, r: f32) -> Self {
        let mut transition = Array2::<f32>::eye(FILTER_LEN);
        transition[[0, 5]] = 1.0; // x += vx
        transition[[1, 6]] = 1.0; // y += vy
        transition[[4, 9]] = 1.0; // angle += vangle

        let mut measurement = Array2::<f32>::zeros((STATE_LEN, FILTER_LEN));
        for i in 0..STATE_LEN {
            measurement[[i, i]] = 1.0;
        }

        Self {
            reference,
            transition,
            measurement,
            process_noise: Array2::<f32>::eye(FILTER_LEN) * q,
            measurement_noise: Array2::<f32>::eye(STATE_LEN) * r,
            state_pre: Array1::zeros(FILTER_LEN),
            cov_pre: Array2::zeros((FILTER_LEN, FILTER_LEN)),
            state_post: Array1::zeros(FILTER_LEN),
            cov_post: Array2::zeros((FILTER_LEN, FILTER_LEN)),
        }
    }

    /// 用观测值校正, 再预测下一帧状态
    pub fn predict(&mut self, measured: State) -> State {
        let z = (measured - self.reference).to_array();
        self.correct(&z);
        let predicted = self.propagate();
        State::from_array(&predicted) + self.reference
    }

    /// 当前速度估计 (vx, vy, vangle)
    pub fn velocity(&self) -> (f32, f32, f32) {
        (self.state_post[5], self.state_post[6], self.state_post[9])
    }

    /// 校正: K = P⁻Hᵀ(HP⁻Hᵀ + R)⁻¹
    fn correct(&mut self, z: &Array1<f32>) {
        let h = &self.measurement;
        let innovation_cov = h.dot(&self.cov_pre).dot(&h.t()) + &self.measurement_noise;

        // R 为正定阵时新息协方差总可逆; 否则跳过本次校正, 保留先验
        let Some(innovation_inv) = invert_5x5(&innovation_cov) else {
            self.state_post = self.state_pre.clone();
            self.cov_post = self.cov_pre.clone();
            return;
        };

        let gain = self.cov_pre.dot(&h.t()).dot(&innovation_inv);
        let innovation = z - &h.dot(&self.state_pre);

        self.state_post = &self.state_pre + &gain.dot(&innovation);
        self.cov_post = &self.cov_pre - &gain.dot(h).dot(&self.cov_pre);
    }

    /// 预测: x⁻ = Fx⁺, P⁻ = FP⁺Fᵀ + Q
    fn propagate(&mut self) -> Array1<f32> {
        let f = &self.transition;
        self.state_pre = f.dot(&self.state_post);
        self.cov_pre = f.dot(&self.cov_post).dot(&f.t()) + &self.process_noise;
        self.state_pre.clone()
    }
}

/// 5x5 矩阵求逆 (nalgebra, 纯Rust实现)
fn invert_5x5(m: &Array2<f32>) -> Option<Array2<f32>> {
    let nm = SMatrix::<f32, STATE_LEN, STATE_LEN>::from_fn(|i, j| m[[i, j]]);
    let inv = nm.try_inverse()?;
    Some(Array2::from_shape_fn((STATE_LEN, STATE_LEN), |(i, j)| inv[(i, j)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_prediction_is_reference() {
        let reference = State::new(100.0, 50.0, 80.0, 40.0, 1.2);
        let mut sp = StatePredictor::new(reference);
        assert_eq!(sp.predict(reference), reference);
    }

    #[test]
    fn test_stationary_object() {
        let reference = State::new(100.0, 50.0, 80.0, 40.0, 1.2);
        let mut sp = StatePredictor::new(reference);
        let mut predicted = reference;
        for _ in 0..20 {
            predicted = sp.predict(reference);
        }
        assert!(predicted.dist_square_from(&reference) < 1e-6);
        assert!((predicted.h - 80.0).abs() < 1e-4);
        assert!((predicted.angle - 1.2).abs() < 1e-4);
    }

    #[test]
    fn test_constant_velocity_is_extrapolated() {
        let reference = State::new(100.0, 100.0, 80.0, 40.0, 1.5);
        let mut sp = StatePredictor::new(reference);
        let mut predicted = reference;
        for i in 0..100 {
            let measured = State::new(100.0 + 5.0 * i as f32, 100.0, 80.0, 40.0, 1.5);
            predicted = sp.predict(measured);
        }
        // 下一帧应在 100 + 5*100 附近
        assert!((predicted.x - 600.0).abs() < 1.0, "x = {}", predicted.x);
        assert!((predicted.y - 100.0).abs() < 1e-3);
        let (vx, vy, _) = sp.velocity();
        assert!((vx - 5.0).abs() < 0.5);
        assert!(vy.abs() < 1e-3);
    }

    #[test]
    fn test_size_is_not_extrapolated() {
        let reference = State::new(100.0, 100.0, 80.0, 40.0, 1.5);
        let mut sp = StatePredictor::new(reference);
        let mut last_h = 80.0;
        for i in 0..40 {
            last_h = 80.0 + 2.0 * i as f32;
            let predicted = sp.predict(State::new(100.0, 100.0, last_h, 40.0, 1.5));
            // 高度只被平滑, 不会超前于观测
            assert!(predicted.h <= last_h + 1e-3);
        }
        assert!(last_h > 150.0);
    }

    #[test]
    fn test_independent_instances() {
        let a = State::new(0.0, 0.0, 10.0, 10.0, 0.0);
        let mut sp1 = StatePredictor::new(a);
        let mut sp2 = StatePredictor::new(a);
        for i in 0..10 {
            sp1.predict(State::new(i as f32 * 3.0, 0.0, 10.0, 10.0, 0.0));
        }
        assert_eq!(sp2.predict(a), a);
    }
}
