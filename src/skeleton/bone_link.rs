//! 骨骼节点
//!
//! BoneLink 是骨骼层级中的一个节点，只保存静态数据。
//! 每帧变化的矩阵由 `SkeletonInstance` 按骨骼索引单独保存，
//! 同一套骨骼可以被多个实例共享。

use bitflags::bitflags;
use glam::Vec3;

// ============================================================================
// 骨骼类型
// ============================================================================

/// PMD 骨骼类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BoneType {
    /// 旋转
    #[default]
    Rotation,
    /// 旋转和移动
    RotationAndTranslation,
    /// IK
    Ik,
    /// 未定义
    Undefined,
    /// IK 影响下
    IkChild,
    /// 旋转影响下
    RotationChild,
    /// IK 接续目标
    IkDestination,
    /// 不可见
    Invisible,
}

impl BoneType {
    /// 从 PMD 类型码转换，未知类型码返回 `None`
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Rotation,
            1 => Self::RotationAndTranslation,
            2 => Self::Ik,
            3 => Self::Undefined,
            4 => Self::IkChild,
            5 => Self::RotationChild,
            6 => Self::IkDestination,
            7 => Self::Invisible,
            _ => return None,
        })
    }
}

// ============================================================================
// 骨骼标志
// ============================================================================

bitflags! {
    /// 骨骼标志位（层级构建时计算）
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoneFlags: u32 {
        /// 是某条 IK 链的 IK 骨骼
        const IK_ANCHOR = 1 << 0;
        /// 是某条 IK 链中的关节
        const IK_LINK = 1 << 1;
        /// 膝盖类关节（只绕 X 轴弯曲）
        const KNEE = 1 << 2;
    }
}

// ============================================================================
// 骨骼节点
// ============================================================================

/// 骨骼节点
#[derive(Clone, Debug)]
pub struct BoneLink {
    /// 骨骼名称（唯一）
    pub name: String,
    /// 骨骼索引
    pub(crate) index: usize,
    /// 骨骼类型
    pub bone_type: BoneType,
    /// 父骨骼索引
    pub parent: Option<usize>,
    /// IK 父骨骼索引
    pub ik_parent: Option<usize>,
    /// 初始位置（模型空间）
    pub rest_position: Vec3,
    /// 子骨骼索引（层级构建时填充）
    pub children: Vec<usize>,
    /// 骨骼标志
    pub flags: BoneFlags,
}

impl BoneLink {
    /// 创建新骨骼
    pub fn new(name: impl Into<String>, rest_position: Vec3) -> Self {
        Self {
            name: name.into(),
            index: 0,
            bone_type: BoneType::Rotation,
            parent: None,
            ik_parent: None,
            rest_position,
            children: Vec::new(),
            flags: BoneFlags::empty(),
        }
    }

    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_type(mut self, bone_type: BoneType) -> Self {
        self.bone_type = bone_type;
        self
    }

    /// 骨骼索引
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// 是否为根骨骼
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_ik_anchor(&self) -> bool {
        self.flags.contains(BoneFlags::IK_ANCHOR)
    }

    #[inline]
    pub fn is_ik_link(&self) -> bool {
        self.flags.contains(BoneFlags::IK_LINK)
    }

    #[inline]
    pub fn is_knee(&self) -> bool {
        self.flags.contains(BoneFlags::KNEE)
    }
}

// ============================================================================
// IK 链
// ============================================================================

/// IK 链配置
///
/// `links` 从靠近末端的关节开始排列，最后一个是链的根部。
/// 关节数决定求解方式：1 为 LookAt，2 为余弦定理，3 个以上为 CCD。
#[derive(Clone, Debug, PartialEq)]
pub struct IkChain {
    /// IK 骨骼索引（其动画位置即目标位置，也是 IK 开关的键）
    pub ik_bone: usize,
    /// 末端骨骼索引（需要被拉到目标位置的骨骼）
    pub target_bone: usize,
    /// 迭代次数
    pub iterations: u16,
    /// 单次迭代角度限制 (弧度)
    pub limit_angle: f32,
    /// IK 链关节索引
    pub links: Vec<usize>,
    /// 两骨链的初始段长 [根→中, 中→末端]
    pub(crate) rest_lengths: Option<[f32; 2]>,
}

impl IkChain {
    /// 创建 IK 链，`limit_fraction` 以 π 为单位
    pub fn new(ik_bone: usize, target_bone: usize, links: Vec<usize>, iterations: u16, limit_fraction: f32) -> Self {
        Self {
            ik_bone,
            target_bone,
            iterations,
            limit_angle: limit_fraction * std::f32::consts::PI,
            links,
            rest_lengths: None,
        }
    }

    /// 链的根部关节
    #[inline]
    pub fn root_link(&self) -> Option<usize> {
        self.links.last().copied()
    }

    /// 两骨链的初始段长
    #[inline]
    pub fn rest_lengths(&self) -> Option<[f32; 2]> {
        self.rest_lengths
    }
}
