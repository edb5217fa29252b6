//! 层级合成
//!
//! `matrices[bone] = matrices[parent] * locals[bone]`，从根骨骼开始深度优先。
//! 使用显式栈代替递归，栈缓冲区在多帧之间复用。

use glam::Mat4;

use super::bone_set::BoneSet;

/// 层级合成器
#[derive(Clone, Debug, Default)]
pub struct HierarchyComposer {
    stack: Vec<(usize, Mat4)>,
}

impl HierarchyComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合成全部骨骼
    ///
    /// 先把每个矩阵设为本地矩阵，再从每个根向下相乘。
    pub fn compose(&mut self, bones: &BoneSet, locals: &[Mat4], matrices: &mut [Mat4]) {
        debug_assert_eq!(locals.len(), bones.len());
        debug_assert_eq!(matrices.len(), bones.len());

        matrices.copy_from_slice(locals);
        for &root in bones.roots() {
            self.compose_subtree(bones, locals, matrices, root, Mat4::IDENTITY, &[]);
        }
    }

    /// 重新合成一棵子树
    ///
    /// `pinned` 中的骨骼保持当前矩阵不变，但其子骨骼仍以它为父继续合成。
    pub fn compose_subtree(
        &mut self,
        bones: &BoneSet,
        locals: &[Mat4],
        matrices: &mut [Mat4],
        start: usize,
        parent_world: Mat4,
        pinned: &[usize],
    ) {
        self.stack.clear();
        self.stack.push((start, parent_world));

        while let Some((idx, parent)) = self.stack.pop() {
            if !pinned.contains(&idx) {
                matrices[idx] = parent * locals[idx];
            }
            let world = matrices[idx];
            for &child in bones.children(idx).iter().rev() {
                self.stack.push((child, world));
            }
        }
    }

    /// 以骨骼当前父矩阵为起点重新合成其子树
    pub fn recompose_from(
        &mut self,
        bones: &BoneSet,
        locals: &[Mat4],
        matrices: &mut [Mat4],
        start: usize,
        pinned: &[usize],
    ) {
        let parent_world = bones.parent(start).map(|p| matrices[p]).unwrap_or(Mat4::IDENTITY);
        self.compose_subtree(bones, locals, matrices, start, parent_world, pinned);
    }
}
