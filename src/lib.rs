//! MMD Animator - MMD 骨骼动画与 IK 运行时
//!
//! 每帧流程：
//! - 动画采样：VMD 关键帧 → 每骨骼本地矩阵
//! - 层级合成：本地矩阵沿父子链相乘
//! - IK 求解：LookAt / 两骨余弦定理 / CCD
//!
//! 模型、动作文件的读取与 GPU 上传不在本 crate 内，
//! 这里只处理已经解析好的记录（见 [`records`]）。

pub mod animation;
pub mod config;
pub mod instance;
pub mod records;
pub mod skeleton;

pub use animation::{BezierCurve, BoneKeyframe, IkEnableTrack, Motion, PoseSampler};
pub use config::AnimatorConfig;
pub use instance::{update_instances, SkeletonInstance};
pub use skeleton::{BoneLink, BoneSet, BoneType, HierarchyComposer, IkChain, IkOutcome, IkSolver};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnimatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record parse error: {0}")]
    RecordParse(String),

    #[error("Bone '{bone}' references missing parent {parent}")]
    MissingParent { bone: String, parent: usize },

    #[error("Duplicate bone name: {0}")]
    DuplicateBoneName(String),

    #[error("Bone hierarchy contains a cycle through '{0}'")]
    CyclicHierarchy(String),

    #[error("IK chain of bone '{0}' has no links")]
    EmptyIkChain(String),

    #[error("IK chain {chain} references bone index {index} out of range")]
    IkBoneOutOfRange { chain: usize, index: usize },
}

pub type Result<T> = std::result::Result<T, AnimatorError>;
