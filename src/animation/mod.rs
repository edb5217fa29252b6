//! 动画系统
//!
//! - BezierCurve: VMD 缓动曲线
//! - BoneMotionTrack / Motion: 关键帧轨道
//! - IkEnableTrack: IK 开关轨道
//! - PoseSampler: 按帧采样本地矩阵

mod bezier_curve;
mod ik_enable;
mod keyframe;
mod motion_track;
mod pose_sampler;

pub use bezier_curve::{ease, BezierCurve, Curve, DEFAULT_BEZIER_ITERATIONS};
pub use ik_enable::{IkEnableFrame, IkEnableTrack};
pub use keyframe::BoneKeyframe;
pub use motion_track::{BoneFrameTransform, BoneMotionTrack, Motion};
pub use pose_sampler::PoseSampler;
