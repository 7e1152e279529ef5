//! 单帧检测目标
//! A single frame's candidate object (contour + derived state + region)

use std::sync::Arc;

use image::RgbImage;
use imageproc::point::Point;

use super::geometry::{bounding_rect, contour_area, fit_ellipse, merged_hull};
use super::state::State;
use super::types::{Rect, Region};
use crate::error::{Error, Result};

/// 检测目标 (前景轮廓)
#[derive(Clone, Debug)]
pub struct Detection {
    /// 轮廓点
    pub contour: Vec<Point<i32>>,
    /// 轮廓面积 (像素)
    pub area: f32,
    /// 紧致外接矩形
    pub bounds: Rect,
    /// 外扩ROI
    pub region: Region,
    /// 观测状态
    state: State,
}

impl Detection {
    /// 由轮廓构造检测目标
    ///
    /// # 参数
    /// - `contour`: 轮廓点
    /// - `padding`: ROI四周外扩像素
    /// - `frame_size`: 画面尺寸 (width, height)
    /// - `frame`: 可选的画面像素 (人形分类器需要)
    pub fn from_contour(
        contour: Vec<Point<i32>>,
        padding: u32,
        frame_size: (u32, u32),
        frame: Option<Arc<RgbImage>>,
    ) -> Self {
        let bounds = bounding_rect(&contour);
        let region = Region::new(bounds, padding, frame_size, frame);
        Self::with_region(contour, region)
    }

    fn with_region(contour: Vec<Point<i32>>, region: Region) -> Self {
        let bounds = bounding_rect(&contour);
        let area = contour_area(&contour);
        let state = measure_state(&contour, &bounds);

        Self {
            contour,
            area,
            bounds,
            region,
            state,
        }
    }

    pub fn with_label(mut self, label: Option<bool>) -> Self {
        self.region = self.region.with_label(label);
        self
    }

    /// 观测状态 (质心、外接矩形高宽、主轴角度)
    pub fn state(&self) -> State {
        self.state
    }

    /// 合并多个检测目标: 轮廓拼接后取凸包
    ///
    /// 空列表是调用方违反契约, 返回 [`Error::EmptyMerge`]
    pub fn merge(objects: &[&Detection]) -> Result<Detection> {
        let first = objects.first().ok_or(Error::EmptyMerge)?;

        let contours: Vec<&[Point<i32>]> = objects.iter().map(|o| o.contour.as_slice()).collect();
        let hull = merged_hull(&contours);
        let region = first.region.rebuild(bounding_rect(&hull));

        let label = objects
            .iter()
            .filter_map(|o| o.region.label)
            .reduce(|a, b| a || b);

        Ok(Detection::with_region(hull, region.with_label(label)))
    }
}

/// 由轮廓计算观测状态
///
/// 无法拟合椭圆时 (点数不足5或轮廓退化), 质心回退为外接矩形中心, 角度为0
fn measure_state(contour: &[Point<i32>], bounds: &Rect) -> State {
    let (x, y, angle) = match fit_ellipse(contour) {
        Some(ellipse) => (ellipse.cx, ellipse.cy, ellipse.state_angle()),
        None => {
            let (cx, cy) = bounds.center();
            (cx, cy, 0.0)
        }
    };
    State::new(x, y, bounds.height as f32, bounds.width as f32, angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn box_contour(x: i32, y: i32, w: i32, h: i32) -> Vec<Point<i32>> {
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
    fn test_state_from_contour() {
        let det = Detection::from_contour(box_contour(100, 100, 40, 100), 30, (640, 480), None);
        let state = det.state();
        assert!((state.x - 120.0).abs() < 1e-3);
        assert!((state.y - 150.0).abs() < 1e-3);
        assert_eq!(state.h, 101.0);
        assert_eq!(state.w, 41.0);
        assert!((state.angle - FRAC_PI_2).abs() < 1e-3);
        assert!((det.area - 4000.0).abs() < 1e-2);
        assert_eq!(det.region.rect, Rect::new(70, 70, 101, 161));
    }

    #[test]
    fn test_fallback_when_ellipse_cannot_be_fit() {
        let contour = vec![Point::new(10, 10), Point::new(30, 10), Point::new(30, 50)];
        let det = Detection::from_contour(contour, 0, (640, 480), None);
        let state = det.state();
        assert_eq!(state.angle, 0.0);
        assert!((state.x - 20.5).abs() < 1e-3);
        assert!((state.y - 30.5).abs() < 1e-3);
        assert!(state.h > 0.0 && state.w > 0.0);
    }

    #[test]
    fn test_merge_empty_is_rejected() {
        match Detection::merge(&[]) {
            Err(Error::EmptyMerge) => {}
            other => panic!("Expected EmptyMerge, got {:?}", other.map(|d| d.bounds)),
        }
    }

    #[test]
    fn test_merge_takes_convex_hull() {
        let torso = Detection::from_contour(box_contour(100, 100, 40, 60), 10, (640, 480), None);
        let legs = Detection::from_contour(box_contour(105, 170, 30, 50), 10, (640, 480), None)
            .with_label(Some(true));
        let merged = Detection::merge(&[&torso, &legs]).unwrap();

        assert_eq!(merged.bounds, Rect::new(100, 100, 41, 121));
        assert_eq!(merged.region.rect, Rect::new(90, 90, 61, 141));
        assert_eq!(merged.region.label, Some(true));
        assert!(merged.area > torso.area + legs.area);
    }

    #[test]
    fn test_merge_label_is_or_reduced() {
        let a = Detection::from_contour(box_contour(0, 0, 10, 10), 0, (100, 100), None)
            .with_label(Some(false));
        let b = Detection::from_contour(box_contour(20, 0, 10, 10), 0, (100, 100), None)
            .with_label(Some(true));
        let c = Detection::from_contour(box_contour(40, 0, 10, 10), 0, (100, 100), None);
        assert_eq!(Detection::merge(&[&a, &b]).unwrap().region.label, Some(true));
        assert_eq!(Detection::merge(&[&a, &c]).unwrap().region.label, Some(false));
        assert_eq!(Detection::merge(&[&c]).unwrap().region.label, None);
    }
}
