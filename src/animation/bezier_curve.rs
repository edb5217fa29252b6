//! 贝塞尔曲线
//!
//! 用于 VMD 动画的非线性插值。端点固定为 (0,0) 与 (1,1)，
//! 通过 Newton 迭代由 X 反求参数 t，再返回 Y。

use glam::Vec2;

/// 收敛阈值
const EPSILON: f32 = 0.0005;

/// 默认 Newton 迭代上限
pub const DEFAULT_BEZIER_ITERATIONS: u8 = 12;

/// 曲线 trait
pub trait Curve {
    fn value(&self, v: f32) -> f32;
}

/// 给定 X 求三次贝塞尔曲线上的 Y
///
/// # 参数
/// - `x`: 归一化时间 [0, 1]
/// - `p1`, `p2`: 控制点（归一化到 0-1 范围）
/// - `iterations`: Newton 迭代上限
///
/// 控制点在对角线上时曲线为直线，直接返回 `x`。
/// 迭代未收敛时返回当前近似值，不会失败。
pub fn ease(x: f32, p1: Vec2, p2: Vec2, iterations: u8) -> f32 {
    if p1.x == p1.y && p2.x == p2.y {
        return x;
    }

    // X(t) = k0·t³ + k1·t² + k2·t
    let k0 = 1.0 + 3.0 * p1.x - 3.0 * p2.x;
    let k1 = 3.0 * p2.x - 6.0 * p1.x;
    let k2 = 3.0 * p1.x;

    let mut t = x.clamp(0.0, 1.0);
    for _ in 0..iterations {
        let ft = k0 * t * t * t + k1 * t * t + k2 * t - x;
        if (-EPSILON..=EPSILON).contains(&ft) {
            break;
        }
        let slope = 3.0 * k0 * t * t + 2.0 * k1 * t + k2;
        // 导数接近 0 时退化为半步修正
        let step = if slope.abs() > 1e-6 { ft / slope } else { ft * 0.5 };
        t = (t - step).clamp(0.0, 1.0);
    }

    let r = 1.0 - t;
    t * t * t + 3.0 * t * t * r * p2.y + 3.0 * t * r * r * p1.y
}

/// 三次贝塞尔曲线
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BezierCurve {
    /// 控制点1
    pub p1: Vec2,
    /// 控制点2
    pub p2: Vec2,
}

impl BezierCurve {
    /// 创建新的贝塞尔曲线
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self { p1, p2 }
    }

    /// 线性曲线（VMD 默认值 20,20,107,107）
    pub fn linear() -> Self {
        Self::from_parameters([20, 20, 107, 107])
    }

    /// 从 VMD 参数创建贝塞尔曲线
    ///
    /// VMD 使用 [0, 127] 范围的控制点参数，顺序为 x1, y1, x2, y2
    pub fn from_parameters(parameters: [u8; 4]) -> Self {
        Self {
            p1: Vec2::new(parameters[0] as f32 / 127.0, parameters[1] as f32 / 127.0),
            p2: Vec2::new(parameters[2] as f32 / 127.0, parameters[3] as f32 / 127.0),
        }
    }

    /// 导出为 VMD 参数格式
    pub fn to_parameters(&self) -> [u8; 4] {
        let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 127.0).round() as u8;
        [to_byte(self.p1.x), to_byte(self.p1.y), to_byte(self.p2.x), to_byte(self.p2.y)]
    }

    /// 是否为直线
    #[inline]
    pub fn is_linear(&self) -> bool {
        self.p1.x == self.p1.y && self.p2.x == self.p2.y
    }

    /// 带迭代上限的求值
    #[inline]
    pub fn evaluate(&self, x: f32, iterations: u8) -> f32 {
        ease(x, self.p1, self.p2, iterations)
    }
}

impl Default for BezierCurve {
    fn default() -> Self {
        Self::linear()
    }
}

impl Curve for BezierCurve {
    fn value(&self, v: f32) -> f32 {
        self.evaluate(v, DEFAULT_BEZIER_ITERATIONS)
    }
}
