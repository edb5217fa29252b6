//! 动画轨道
//!
//! 存储单个骨骼的所有关键帧，并提供查找和插值功能。
//! `Motion` 按骨骼名称汇总所有轨道以及 IK 开关轨道。

use std::collections::{BTreeMap, HashMap};

use glam::{Quat, Vec3};

use super::ik_enable::IkEnableTrack;
use super::keyframe::BoneKeyframe;
use crate::records::{BoneKeyframeRecord, IkEnableRecord};

/// 骨骼帧变换结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneFrameTransform {
    /// 平移偏移
    pub translation: Vec3,
    /// 旋转
    pub orientation: Quat,
}

impl Default for BoneFrameTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// 骨骼动画轨道
///
/// 同一帧号重复插入时后者覆盖前者，
/// 等价于稳定排序后取「最后一个 frame <= 目标」的关键帧。
#[derive(Debug, Clone, Default)]
pub struct BoneMotionTrack {
    /// 关键帧映射（帧索引 -> 关键帧）
    pub keyframes: BTreeMap<u32, BoneKeyframe>,
}

impl BoneMotionTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入关键帧，返回被覆盖的旧关键帧
    pub fn insert_keyframe(&mut self, keyframe: BoneKeyframe) -> Option<BoneKeyframe> {
        self.keyframes.insert(keyframe.frame_index, keyframe)
    }

    /// 移除关键帧
    pub fn remove_keyframe(&mut self, frame_index: u32) -> Option<BoneKeyframe> {
        self.keyframes.remove(&frame_index)
    }

    /// 查找精确帧
    pub fn find(&self, frame_index: u32) -> Option<&BoneKeyframe> {
        self.keyframes.get(&frame_index)
    }

    /// 查找最近的前后关键帧
    ///
    /// 前帧为最后一个 `frame_index <= target` 的关键帧，后帧为其之后的第一个。
    pub fn search_closest(&self, frame_index: u32) -> (Option<&BoneKeyframe>, Option<&BoneKeyframe>) {
        let prev = self.keyframes.range(..=frame_index).next_back().map(|(_, kf)| kf);
        let next = match frame_index.checked_add(1) {
            Some(after) => self.keyframes.range(after..).next().map(|(_, kf)| kf),
            None => None,
        };
        (prev, next)
    }

    /// 求值指定帧
    ///
    /// 所有关键帧都在目标帧之后时返回 `None`（骨骼尚未开始动画）。
    pub fn seek(&self, frame_index: u32, bezier_iterations: u8) -> Option<BoneFrameTransform> {
        // 精确匹配，避免边界处的插值漂移
        if let Some(kf) = self.find(frame_index) {
            return Some(BoneFrameTransform {
                translation: kf.translation,
                orientation: kf.rotation,
            });
        }

        match self.search_closest(frame_index) {
            (Some(prev), Some(next)) => {
                let span = (next.frame_index - prev.frame_index) as f32;
                let t = (frame_index - prev.frame_index) as f32 / span;
                let amount = next.curve.evaluate(t, bezier_iterations);
                Some(BoneFrameTransform {
                    translation: prev.translation.lerp(next.translation, amount),
                    orientation: prev.rotation.slerp(next.rotation, amount),
                })
            }
            // 只有前帧，使用前帧数据
            (Some(prev), None) => Some(BoneFrameTransform {
                translation: prev.translation,
                orientation: prev.rotation,
            }),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// 获取最大帧索引
    pub fn max_frame_index(&self) -> u32 {
        self.keyframes.keys().next_back().copied().unwrap_or(0)
    }
}

/// 动作数据：骨骼轨道 + IK 开关轨道
#[derive(Debug, Clone, Default)]
pub struct Motion {
    bone_tracks: HashMap<String, BoneMotionTrack>,
    /// IK 开关轨道
    pub ik_enable: IkEnableTrack,
}

impl Motion {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由 VMD 记录构建动作
    ///
    /// 记录顺序即插入顺序，同一骨骼同一帧号以最后一条为准。
    pub fn from_records(bone_records: &[BoneKeyframeRecord], ik_records: &[IkEnableRecord]) -> Self {
        let mut motion = Self::new();
        for record in bone_records {
            motion.insert_bone_keyframe(&record.bone_name, record.to_keyframe());
        }
        for record in ik_records {
            motion.ik_enable.insert(record.to_frame());
        }
        log::info!(
            "动作加载完成: {} 条骨骼轨道, {} 个 IK 开关帧, 长度 {} 帧",
            motion.bone_tracks.len(),
            motion.ik_enable.len(),
            motion.max_frame()
        );
        motion
    }

    /// 插入骨骼关键帧
    pub fn insert_bone_keyframe(&mut self, name: &str, keyframe: BoneKeyframe) {
        let track = self.bone_tracks.entry(name.to_string()).or_default();
        if track.insert_keyframe(keyframe).is_some() {
            log::debug!("骨骼 '{}' 第 {} 帧存在重复关键帧，后者覆盖前者", name, keyframe.frame_index);
        }
    }

    /// 获取骨骼轨道
    pub fn bone_track(&self, name: &str) -> Option<&BoneMotionTrack> {
        self.bone_tracks.get(name)
    }

    /// 遍历所有骨骼轨道
    pub fn bone_tracks(&self) -> impl Iterator<Item = (&String, &BoneMotionTrack)> {
        self.bone_tracks.iter()
    }

    /// 检查是否包含骨骼轨道
    pub fn contains_bone_track(&self, name: &str) -> bool {
        self.bone_tracks.contains_key(name)
    }

    /// 获取骨骼轨道名称
    pub fn bone_track_names(&self) -> impl Iterator<Item = &String> {
        self.bone_tracks.keys()
    }

    /// 动作长度（最大帧号）
    pub fn max_frame(&self) -> u32 {
        let bones = self.bone_tracks.values().map(|t| t.max_frame_index()).max().unwrap_or(0);
        bones.max(self.ik_enable.max_frame_index())
    }
}
