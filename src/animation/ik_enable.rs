//! IK 开关轨道
//!
//! VMD 中的 IK 关键帧：某一帧起，按 IK 骨骼名称开启或关闭对应 IK 链。

use std::collections::HashMap;

/// 单帧 IK 开关
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IkEnableFrame {
    /// 帧号
    pub frame_index: u32,
    /// IK 骨骼名称 -> 是否启用
    pub enabled: HashMap<String, bool>,
}

impl IkEnableFrame {
    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            enabled: HashMap::new(),
        }
    }

    pub fn with(mut self, ik_bone_name: &str, enabled: bool) -> Self {
        self.enabled.insert(ik_bone_name.to_string(), enabled);
        self
    }
}

/// IK 开关轨道（按帧号排序，同帧号保持插入顺序）
#[derive(Debug, Clone, Default)]
pub struct IkEnableTrack {
    frames: Vec<IkEnableFrame>,
}

impl IkEnableTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一帧，保持按帧号有序
    pub fn insert(&mut self, frame: IkEnableFrame) {
        let at = self.frames.partition_point(|f| f.frame_index <= frame.frame_index);
        self.frames.insert(at, frame);
    }

    /// 最后一个 `frame_index <= frame` 的开关帧
    pub fn active_frame(&self, frame: u32) -> Option<&IkEnableFrame> {
        let end = self.frames.partition_point(|f| f.frame_index <= frame);
        end.checked_sub(1).map(|i| &self.frames[i])
    }

    /// 指定 IK 骨骼在该帧是否启用
    ///
    /// 没有开关帧或没有显式条目时默认启用。
    pub fn is_enabled(&self, ik_bone_name: &str, frame: u32) -> bool {
        self.active_frame(frame)
            .and_then(|f| f.enabled.get(ik_bone_name).copied())
            .unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_frame_index(&self) -> u32 {
        self.frames.last().map(|f| f.frame_index).unwrap_or(0)
    }
}
