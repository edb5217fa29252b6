//! 动画关键帧

use glam::{Quat, Vec3};

use super::BezierCurve;

/// 骨骼关键帧
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneKeyframe {
    /// 帧号
    pub frame_index: u32,
    /// 相对初始位置的平移偏移
    pub translation: Vec3,
    /// 旋转
    pub rotation: Quat,
    /// 进入本帧时使用的缓动曲线
    pub curve: BezierCurve,
}

impl BoneKeyframe {
    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            curve: BezierCurve::linear(),
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_curve(mut self, curve: BezierCurve) -> Self {
        self.curve = curve;
        self
    }
}
