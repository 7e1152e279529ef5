//! 目标状态量
//! State of a tracked object at one instant: (x, y, h, w, angle)

use std::ops::{Add, Sub};

use ndarray::Array1;

/// 观测状态维度
pub const STATE_LEN: usize = 5;

/// 状态量 (质心位置, 外接矩形高宽, 主轴角度)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct State {
    pub x: f32,
    pub y: f32,
    pub h: f32,
    pub w: f32,
    pub angle: f32,
}

impl State {
    pub fn new(x: f32, y: f32, h: f32, w: f32, angle: f32) -> Self {
        Self { x, y, h, w, angle }
    }

    /// 外接矩形面积
    pub fn area(&self) -> f32 {
        self.h * self.w
    }

    /// 与另一状态质心距离的平方
    pub fn dist_square_from(&self, other: &State) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// `other` 的质心是否严格落在本状态的外接矩形内
    pub fn contains(&self, other: &State) -> bool {
        let half_w = self.w / 2.0;
        let half_h = self.h / 2.0;
        (self.x - half_w) < other.x
            && other.x < (self.x + half_w)
            && (self.y - half_h) < other.y
            && other.y < (self.y + half_h)
    }

    pub fn to_array(&self) -> Array1<f32> {
        Array1::from_vec(vec![self.x, self.y, self.h, self.w, self.angle])
    }

    /// 取向量前5个分量 (卡尔曼状态向量同样以观测量开头)
    pub fn from_array(values: &Array1<f32>) -> Self {
        Self {
            x: values[0],
            y: values[1],
            h: values[2],
            w: values[3],
            angle: values[4],
        }
    }

    /// 按字段读取, 用于逐变量统计
    pub fn field(&self, var: StateVar) -> f32 {
        match var {
            StateVar::X => self.x,
            StateVar::Y => self.y,
            StateVar::H => self.h,
            StateVar::W => self.w,
            StateVar::Angle => self.angle,
        }
    }
}

/// 状态变量名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateVar {
    X,
    Y,
    H,
    W,
    Angle,
}

impl StateVar {
    pub const ALL: [StateVar; STATE_LEN] = [
        StateVar::X,
        StateVar::Y,
        StateVar::H,
        StateVar::W,
        StateVar::Angle,
    ];
}

impl Add for State {
    type Output = State;

    fn add(self, other: State) -> State {
        State::new(
            self.x + other.x,
            self.y + other.y,
            self.h + other.h,
            self.w + other.w,
            self.angle + other.angle,
        )
    }
}

impl Sub for State {
    type Output = State;

    fn sub(self, other: State) -> State {
        State::new(
            self.x - other.x,
            self.y - other.y,
            self.h - other.h,
            self.w - other.w,
            self.angle - other.angle,
        )
    }
}
