//! 骨骼实例
//!
//! 一个角色的姿势状态。骨骼层级和动作通过 `Arc` 在实例间只读共享，
//! 矩阵与工作缓冲区每个实例一份，加载时按骨骼数分配，之后逐帧覆盖。
//!
//! 每帧流程：采样 → 层级合成 → IK。

use std::sync::Arc;
use std::time::Duration;

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::animation::{Motion, PoseSampler};
use crate::config::AnimatorConfig;
use crate::skeleton::{BoneSet, HierarchyComposer, IkOutcome, IkSolver};

/// 骨骼实例
#[derive(Clone, Debug)]
pub struct SkeletonInstance {
    bones: Arc<BoneSet>,
    motion: Arc<Motion>,
    config: AnimatorConfig,
    sampler: PoseSampler,

    /// 本帧采样得到的本地矩阵
    locals: Vec<Mat4>,
    /// 输出骨骼矩阵
    matrices: Vec<Mat4>,
    /// 整个骨骼的世界矩阵（根偏移、整体旋转）
    world_matrix: Mat4,
    /// 最近一次更新的帧号
    current_frame: u32,

    // 上传用扁平缓存（每骨骼 16 个 f32，列主序）
    flat_cache: Vec<f32>,
    flat_dirty: bool,

    composer: HierarchyComposer,
    solver: IkSolver,
}

impl SkeletonInstance {
    /// 创建实例并绑定动作
    pub fn new(bones: Arc<BoneSet>, motion: Arc<Motion>, config: AnimatorConfig) -> Self {
        let count = bones.len();
        let mut instance = Self {
            sampler: PoseSampler::new(config.bezier_iterations),
            solver: IkSolver::new(config.ik_epsilon),
            composer: HierarchyComposer::new(),
            locals: vec![Mat4::IDENTITY; count],
            matrices: vec![Mat4::IDENTITY; count],
            world_matrix: Mat4::IDENTITY,
            current_frame: 0,
            flat_cache: vec![0.0; count * 16],
            flat_dirty: true,
            bones,
            motion: Arc::new(Motion::new()),
            config,
        };
        instance.set_motion(motion);
        instance
    }

    /// 更换动作
    pub fn set_motion(&mut self, motion: Arc<Motion>) {
        let unmatched = PoseSampler::unmatched_tracks(&motion, &self.bones);
        if !unmatched.is_empty() {
            log::warn!("动作中 {} 条轨道没有对应骨骼，已忽略: {:?}", unmatched.len(), unmatched);
        }
        log::info!(
            "绑定动作: {} 根骨骼, {} 条 IK 链, 动作长度 {} 帧",
            self.bones.len(),
            self.bones.ik_chains().len(),
            motion.max_frame()
        );
        self.motion = motion;
    }

    /// 更新到指定帧
    pub fn update(&mut self, frame: u32) {
        let animated = self.sampler.sample(&self.motion, &self.bones, frame, &mut self.locals);
        self.composer.compose(&self.bones, &self.locals, &mut self.matrices);
        self.solver
            .solve_all(&self.bones, &self.motion.ik_enable, frame, &self.locals, &mut self.matrices);

        self.current_frame = frame;
        self.flat_dirty = true;

        if self.config.debug_log {
            log::debug!(
                "第 {} 帧: {} 根骨骼有动画, IK 结果 {:?}",
                frame,
                animated,
                self.solver.last_outcomes()
            );
        }
    }

    /// 按经过时间更新，返回实际使用的帧号
    ///
    /// 开启循环播放时帧号在 `0..=max_frame` 内循环。
    pub fn update_elapsed(&mut self, elapsed: Duration) -> u32 {
        let frame = self.frame_at(elapsed);
        self.update(frame);
        frame
    }

    /// 经过时间对应的帧号
    pub fn frame_at(&self, elapsed: Duration) -> u32 {
        let frame = (elapsed.as_secs_f64() * f64::from(self.config.frames_per_second)).floor() as u32;
        let max_frame = self.motion.max_frame();
        if self.config.loop_playback && max_frame > 0 {
            // 最后一帧为 u32::MAX 时一个循环覆盖全部帧号
            max_frame.checked_add(1).map_or(frame, |len| frame % len)
        } else {
            frame
        }
    }

    // ========== 查询 ==========

    pub fn bones(&self) -> &Arc<BoneSet> {
        &self.bones
    }

    pub fn motion(&self) -> &Arc<Motion> {
        &self.motion
    }

    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// 骨骼矩阵（按骨骼索引）
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    /// 最近一帧各 IK 链的求解结果
    pub fn ik_outcomes(&self) -> &[IkOutcome] {
        self.solver.last_outcomes()
    }

    /// 骨骼当前位置（模型空间，不含世界矩阵）
    pub fn bone_position(&self, index: usize) -> Option<Vec3> {
        let bone = self.bones.get_bone(index)?;
        Some(self.matrices[index].transform_point3(bone.rest_position))
    }

    /// 按名称查询骨骼当前位置
    pub fn bone_position_by_name(&self, name: &str) -> Option<Vec3> {
        self.bone_position(self.bones.find_bone_by_name(name)?)
    }

    // ========== 世界矩阵 ==========

    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn set_world_matrix(&mut self, world_matrix: Mat4) {
        self.world_matrix = world_matrix;
    }

    /// 整体绕自身 Y 轴旋转（弧度）
    pub fn rotate_world_y(&mut self, angle: f32) {
        self.world_matrix *= Mat4::from_rotation_y(angle);
    }

    // ========== 上传 ==========

    /// 扁平化的骨骼矩阵，每骨骼 16 个 f32（列主序）
    ///
    /// 两次更新之间重复调用不会重新填充。
    pub fn flat_matrices(&mut self) -> &[f32] {
        if self.flat_dirty {
            for (chunk, matrix) in self.flat_cache.chunks_exact_mut(16).zip(&self.matrices) {
                chunk.copy_from_slice(&matrix.to_cols_array());
            }
            self.flat_dirty = false;
        }
        &self.flat_cache
    }
}

/// 并行更新多个实例到同一帧
///
/// 每个实例仍只由一个线程更新。
pub fn update_instances(instances: &mut [SkeletonInstance], frame: u32) {
    instances.par_iter_mut().for_each(|instance| instance.update(frame));
}
