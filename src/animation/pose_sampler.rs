//! 姿势采样
//!
//! 按帧号从动作中求出每根骨骼的本地矩阵：
//! `local = T(offset) · T(rest) · R · T(-rest)`，即绕骨骼初始位置旋转后再平移。
//! 没有轨道或尚未开始动画的骨骼保持单位矩阵。

use glam::{Mat4, Vec3};

use super::bezier_curve::DEFAULT_BEZIER_ITERATIONS;
use super::motion_track::{BoneFrameTransform, Motion};
use crate::skeleton::BoneSet;

/// 姿势采样器
#[derive(Clone, Copy, Debug)]
pub struct PoseSampler {
    /// 贝塞尔 Newton 迭代上限
    pub bezier_iterations: u8,
}

impl Default for PoseSampler {
    fn default() -> Self {
        Self {
            bezier_iterations: DEFAULT_BEZIER_ITERATIONS,
        }
    }
}

impl PoseSampler {
    pub fn new(bezier_iterations: u8) -> Self {
        Self { bezier_iterations }
    }

    /// 由帧变换构造本地矩阵
    #[inline]
    pub fn local_matrix(rest_position: Vec3, transform: &BoneFrameTransform) -> Mat4 {
        Mat4::from_translation(transform.translation + rest_position)
            * Mat4::from_quat(transform.orientation)
            * Mat4::from_translation(-rest_position)
    }

    /// 采样指定帧，写入 `locals`（长度等于骨骼数）
    ///
    /// 返回被动画驱动的骨骼数。
    pub fn sample(&self, motion: &Motion, bones: &BoneSet, frame: u32, locals: &mut [Mat4]) -> usize {
        debug_assert_eq!(locals.len(), bones.len());

        let mut animated = 0;
        for (local, bone) in locals.iter_mut().zip(bones.bones()) {
            let transform = motion
                .bone_track(&bone.name)
                .and_then(|track| track.seek(frame, self.bezier_iterations));
            *local = match transform {
                Some(transform) => {
                    animated += 1;
                    Self::local_matrix(bone.rest_position, &transform)
                }
                None => Mat4::IDENTITY,
            };
        }
        animated
    }

    /// 骨骼中找不到对应名称的轨道
    pub fn unmatched_tracks<'a>(motion: &'a Motion, bones: &BoneSet) -> Vec<&'a str> {
        let mut names: Vec<&str> = motion
            .bone_track_names()
            .filter(|name| bones.find_bone_by_name(name).is_none())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }
}
