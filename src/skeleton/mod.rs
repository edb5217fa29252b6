//! 骨骼系统
//!
//! - BoneLink: 单个骨骼节点（静态数据）
//! - BoneSet: 骨骼层级（校验后不可变，可在实例间共享）
//! - HierarchyComposer: 本地矩阵 → 模型空间矩阵
//! - IkSolver: IK 求解器

mod bone_link;
mod bone_set;
mod composer;
mod ik_solver;

pub use bone_link::{BoneFlags, BoneLink, BoneType, IkChain};
pub use bone_set::BoneSet;
pub use composer::HierarchyComposer;
pub use ik_solver::{cosine_law_angles, look_at_rotation, look_basis, IkOutcome, IkSolver};
