//! 轮廓几何工具
//! Contour geometry: bounding rect, polygon moments, ellipse fit, convex hull

use imageproc::point::Point;

use super::types::Rect;

/// 拟合椭圆至少需要的轮廓点数
pub const MIN_ELLIPSE_POINTS: usize = 5;

/// 多边形面积小于该值视为退化 (无法拟合椭圆)
const DEGENERATE_AREA: f64 = 1e-6;

/// 拟合椭圆
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    /// 质心
    pub cx: f32,
    pub cy: f32,
    /// 长轴/短轴全长
    pub major: f32,
    pub minor: f32,
    /// 长轴与水平方向夹角 (弧度, (-π/2, π/2])
    pub orientation: f32,
}

impl Ellipse {
    /// 状态量使用的角度: 长轴方向的绝对值, 落在 [0, π/2]
    ///
    /// 与 `(90° − θ)·π/180` 取绝对值等价, 其中 θ 为旋转矩形约定下的椭圆角度
    pub fn state_angle(&self) -> f32 {
        self.orientation.abs()
    }
}

/// 多边形矩 (Green公式, 到二阶)
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    m00: f64,
    m10: f64,
    m01: f64,
    m20: f64,
    m11: f64,
    m02: f64,
}

fn polygon_moments(contour: &[Point<i32>]) -> Moments {
    let n = contour.len();
    let mut m = Moments::default();
    if n < 3 {
        return m;
    }

    for i in 0..n {
        let p0 = contour[i];
        let p1 = contour[(i + 1) % n];
        let (x0, y0) = (p0.x as f64, p0.y as f64);
        let (x1, y1) = (p1.x as f64, p1.y as f64);
        let cross = x0 * y1 - x1 * y0;

        m.m00 += cross;
        m.m10 += (x0 + x1) * cross;
        m.m01 += (y0 + y1) * cross;
        m.m20 += (x0 * x0 + x0 * x1 + x1 * x1) * cross;
        m.m02 += (y0 * y0 + y0 * y1 + y1 * y1) * cross;
        m.m11 += (x0 * y1 + 2.0 * x0 * y0 + 2.0 * x1 * y1 + x1 * y0) * cross;
    }

    m.m00 /= 2.0;
    m.m10 /= 6.0;
    m.m01 /= 6.0;
    m.m20 /= 12.0;
    m.m02 /= 12.0;
    m.m11 /= 24.0;
    m
}

/// 轮廓包围的面积 (像素)
pub fn contour_area(contour: &[Point<i32>]) -> f32 {
    polygon_moments(contour).m00.abs() as f32
}

/// 轮廓的外接矩形 (宽高至少为1)
pub fn bounding_rect(contour: &[Point<i32>]) -> Rect {
    if contour.is_empty() {
        return Rect::default();
    }

    let (mut x0, mut y0) = (i32::MAX, i32::MAX);
    let (mut x1, mut y1) = (i32::MIN, i32::MIN);
    for p in contour {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }

    Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
}

/// 基于多边形二阶中心矩拟合椭圆
///
/// 少于5个点或多边形退化(面积≈0)时返回 None, 由调用方回退到外接矩形中心
pub fn fit_ellipse(contour: &[Point<i32>]) -> Option<Ellipse> {
    if contour.len() < MIN_ELLIPSE_POINTS {
        return None;
    }

    let m = polygon_moments(contour);
    if m.m00.abs() < DEGENERATE_AREA {
        return None;
    }

    // 顺/逆时针方向的符号在除以 m00 时抵消
    let cx = m.m10 / m.m00;
    let cy = m.m01 / m.m00;
    let mu20 = m.m20 / m.m00 - cx * cx;
    let mu02 = m.m02 / m.m00 - cy * cy;
    let mu11 = m.m11 / m.m00 - cx * cy;

    let half_sum = (mu20 + mu02) / 2.0;
    let root = (((mu20 - mu02) / 2.0).powi(2) + mu11 * mu11).sqrt();
    let l1 = (half_sum + root).max(0.0);
    let l2 = (half_sum - root).max(0.0);

    let orientation = 0.5 * (2.0 * mu11).atan2(mu20 - mu02);

    Some(Ellipse {
        cx: cx as f32,
        cy: cy as f32,
        major: (4.0 * l1.sqrt()) as f32,
        minor: (4.0 * l2.sqrt()) as f32,
        orientation: orientation as f32,
    })
}

/// 多个轮廓拼接后的凸包
pub fn merged_hull(contours: &[&[Point<i32>]]) -> Vec<Point<i32>> {
    let points: Vec<Point<i32>> = contours.iter().flat_map(|c| c.iter().copied()).collect();
    if points.len() < 3 {
        return points;
    }
    imageproc::geometry::convex_hull(&points[..])
}
