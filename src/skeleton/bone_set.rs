//! 骨骼集合 - 骨骼层级的拥有者
//!
//! 所有骨骼存放在一个连续数组中，父子关系全部用索引表示，
//! 名称到索引的映射在构建时生成，之后不再修改。
//! 构建时完成全部结构校验：父骨骼缺失、重名、环、空 IK 链都会直接拒绝。

use std::collections::HashMap;

use glam::Vec3;

use super::bone_link::{BoneFlags, BoneLink, BoneType, IkChain};
use crate::config::AnimatorConfig;
use crate::records::{BoneRecord, IkRecord};
use crate::{AnimatorError, Result};

/// 骨骼集合（不可变拓扑）
#[derive(Clone, Debug)]
pub struct BoneSet {
    bones: Vec<BoneLink>,
    name_to_index: HashMap<String, usize>,
    /// 合成起点，指定根骨骼排在第一位
    roots: Vec<usize>,
    ik_chains: Vec<IkChain>,
}

impl BoneSet {
    /// 构建并校验骨骼层级
    pub fn new(mut bones: Vec<BoneLink>, mut ik_chains: Vec<IkChain>, config: &AnimatorConfig) -> Result<Self> {
        let count = bones.len();

        // 名称映射
        let mut name_to_index = HashMap::with_capacity(count);
        for (i, bone) in bones.iter_mut().enumerate() {
            bone.index = i;
            bone.children.clear();
            bone.flags = BoneFlags::empty();
            if name_to_index.insert(bone.name.clone(), i).is_some() {
                return Err(AnimatorError::DuplicateBoneName(bone.name.clone()));
            }
        }

        // 父骨骼校验
        for i in 0..count {
            if let Some(parent) = bones[i].parent {
                if parent >= count {
                    return Err(AnimatorError::MissingParent {
                        bone: bones[i].name.clone(),
                        parent,
                    });
                }
            }
            if let Some(ik_parent) = bones[i].ik_parent {
                if ik_parent >= count {
                    log::warn!("骨骼 '{}' 的 IK 父骨骼 {} 不存在，已忽略", bones[i].name, ik_parent);
                    bones[i].ik_parent = None;
                }
            }
        }
        Self::check_acyclic(&bones)?;

        // 子骨骼邻接表
        for i in 0..count {
            if let Some(parent) = bones[i].parent {
                bones[parent].children.push(i);
            }
        }

        // 膝盖
        for bone in bones.iter_mut() {
            if config.is_knee_name(&bone.name) {
                bone.flags |= BoneFlags::KNEE;
            }
        }

        // IK 链
        for (chain_idx, chain) in ik_chains.iter_mut().enumerate() {
            let out_of_range = std::iter::once(chain.ik_bone)
                .chain(std::iter::once(chain.target_bone))
                .chain(chain.links.iter().copied())
                .find(|&idx| idx >= count);
            if let Some(index) = out_of_range {
                return Err(AnimatorError::IkBoneOutOfRange { chain: chain_idx, index });
            }
            if chain.links.is_empty() {
                return Err(AnimatorError::EmptyIkChain(bones[chain.ik_bone].name.clone()));
            }

            bones[chain.ik_bone].flags |= BoneFlags::IK_ANCHOR;
            for &link in &chain.links {
                bones[link].flags |= BoneFlags::IK_LINK;
            }

            if let [mid, root] = chain.links[..] {
                let root_pos = bones[root].rest_position;
                let mid_pos = bones[mid].rest_position;
                let tip_pos = bones[chain.target_bone].rest_position;
                chain.rest_lengths = Some([(mid_pos - root_pos).length(), (tip_pos - mid_pos).length()]);
            }
        }

        // 合成起点
        let mut roots: Vec<usize> = (0..count).filter(|&i| bones[i].parent.is_none()).collect();
        match name_to_index.get(&config.root_bone_name) {
            Some(&root) if bones[root].parent.is_none() => {
                roots.retain(|&r| r != root);
                roots.insert(0, root);
            }
            Some(_) => {
                log::debug!("根骨骼 '{}' 有父骨骼，按普通骨骼合成", config.root_bone_name);
            }
            None if count > 0 => {
                log::warn!("未找到根骨骼 '{}'，从所有无父骨骼开始合成", config.root_bone_name);
            }
            None => {}
        }

        log::info!(
            "[骨骼] 层级构建完成: {} 个骨骼, {} 个根, {} 条 IK 链",
            count,
            roots.len(),
            ik_chains.len()
        );

        Ok(Self {
            bones,
            name_to_index,
            roots,
            ik_chains,
        })
    }

    /// 从 PMD 记录构建
    pub fn from_records(bone_records: &[BoneRecord], ik_records: &[IkRecord], config: &AnimatorConfig) -> Result<Self> {
        let bones = bone_records
            .iter()
            .map(|record| {
                let bone_type = BoneType::from_code(record.bone_type).unwrap_or_else(|| {
                    log::warn!("骨骼 '{}' 类型码 {} 未知，按未定义处理", record.name, record.bone_type);
                    BoneType::Undefined
                });
                let mut bone = BoneLink::new(record.name.clone(), Vec3::from_array(record.rest_position));
                bone.bone_type = bone_type;
                bone.parent = record.parent();
                bone.ik_parent = record.ik_parent();
                bone
            })
            .collect();

        let ik_chains = ik_records
            .iter()
            .map(|record| {
                IkChain::new(
                    record.ik_bone as usize,
                    record.target_bone as usize,
                    record.links.iter().map(|&l| l as usize).collect(),
                    record.iterations,
                    record.limit_fraction,
                )
            })
            .collect();

        Self::new(bones, ik_chains, config)
    }

    /// 沿父链向上，步数超过骨骼数即存在环
    fn check_acyclic(bones: &[BoneLink]) -> Result<()> {
        // 已确认可到达根的骨骼
        let mut resolved = vec![false; bones.len()];
        for start in 0..bones.len() {
            let mut path = Vec::new();
            let mut current = Some(start);
            while let Some(idx) = current {
                if resolved[idx] {
                    break;
                }
                if path.len() > bones.len() {
                    return Err(AnimatorError::CyclicHierarchy(bones[start].name.clone()));
                }
                path.push(idx);
                current = bones[idx].parent;
            }
            for idx in path {
                resolved[idx] = true;
            }
        }
        Ok(())
    }

    // ========================================
    // 访问器
    // ========================================

    /// 骨骼数量
    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    pub fn bones(&self) -> &[BoneLink] {
        &self.bones
    }

    #[inline]
    pub fn get_bone(&self, index: usize) -> Option<&BoneLink> {
        self.bones.get(index)
    }

    /// 通过名称查找骨骼
    #[inline]
    pub fn find_bone_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    #[inline]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.bones[index].parent
    }

    #[inline]
    pub fn children(&self, index: usize) -> &[usize] {
        &self.bones[index].children
    }

    #[inline]
    pub fn rest_position(&self, index: usize) -> Vec3 {
        self.bones[index].rest_position
    }

    /// 合成起点（指定根骨骼在前）
    #[inline]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    #[inline]
    pub fn ik_chains(&self) -> &[IkChain] {
        &self.ik_chains
    }
}
