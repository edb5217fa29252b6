//! IK 求解器
//!
//! 在层级合成之后逐条处理 IK 链，直接改写骨骼矩阵：
//! - 1 个关节：LookAt，让关节朝向 IK 骨骼
//! - 2 个关节：余弦定理解析求解（膝盖、手肘）
//! - 3 个以上：CCD 迭代求解
//!
//! 求解永远不会失败：目标不可达时收敛到最接近的姿势，
//! 退化情况（零长度向量、平行向量）跳过该骨骼本帧的修正。

use std::f32::consts::PI;

use glam::{Mat3, Mat4, Quat, Vec3};

use super::bone_link::IkChain;
use super::bone_set::BoneSet;
use super::composer::HierarchyComposer;
use crate::animation::IkEnableTrack;

/// 叉积 / 长度判定阈值
const DEGENERATE: f32 = 1.0e-12;

// ============================================================================
// 求解结果
// ============================================================================

/// 单条 IK 链的求解结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IkOutcome {
    /// 被 IK 开关轨道关闭
    Disabled,
    /// 数据退化，未修改任何矩阵
    Skipped,
    /// 末端已在目标处，未修改任何矩阵
    Unchanged,
    /// 已改写矩阵
    Solved {
        /// 实际执行的迭代次数
        iterations: u32,
        /// 求解后末端到目标的距离
        residual: f32,
    },
}

// ============================================================================
// 几何工具
// ============================================================================

/// 绕 `pivot` 旋转的矩阵：T(p) · R · T(-p)
#[inline]
fn pivot_rotation(pivot: Vec3, rotation: Quat) -> Mat4 {
    Mat4::from_translation(pivot) * Mat4::from_quat(rotation) * Mat4::from_translation(-pivot)
}

/// 两向量夹角，任一向量为零时返回 0
#[inline]
fn safe_angle(u: Vec3, v: Vec3) -> f32 {
    let denom = (u.length_squared() * v.length_squared()).sqrt();
    if denom < DEGENERATE {
        return 0.0;
    }
    (u.dot(v) / denom).clamp(-1.0, 1.0).acos()
}

/// 绕 `axis` 从 `u` 转到 `v` 的带符号夹角，任一向量为零时返回 0
#[inline]
fn signed_angle(u: Vec3, v: Vec3, axis: Vec3) -> f32 {
    axis.dot(u.cross(v)).atan2(u.dot(v))
}

/// 由视线方向构造正交基（列为 x, y, z）
///
/// 上方向提示为 (0,1,0)；视线与之平行时改用右方向提示 (1,0,0)。
pub fn look_basis(dir: Vec3) -> Mat3 {
    let z = dir;
    let (x, y) = if Vec3::Y.dot(z).abs() >= 1.0 - 1.0e-6 {
        let y = z.cross(Vec3::X).normalize();
        (y.cross(z).normalize(), y)
    } else {
        let x = Vec3::Y.cross(z).normalize();
        (x, z.cross(x).normalize())
    };
    Mat3::from_cols(x, y, z)
}

/// 把单位向量 `origin` 转到单位向量 `target` 的基变换旋转
pub fn look_at_rotation(origin: Vec3, target: Vec3) -> Mat3 {
    look_basis(target) * look_basis(origin).transpose()
}

/// 余弦定理求两骨链角度
///
/// # 参数
/// - `root_mid`: 根→中间关节长度
/// - `mid_tip`: 中间关节→末端长度
/// - `distance`: 根→目标距离（会被限制在可达范围内）
///
/// # 返回
/// (根关节处 根→中 与 根→末端 的夹角, 中间关节弯曲角)，伸直时两者都为 0
pub fn cosine_law_angles(root_mid: f32, mid_tip: f32, distance: f32) -> (f32, f32) {
    if root_mid <= f32::EPSILON || mid_tip <= f32::EPSILON {
        return (0.0, 0.0);
    }
    let a = distance
        .clamp((root_mid - mid_tip).abs(), root_mid + mid_tip)
        .max(f32::EPSILON);
    let (b, c) = (root_mid, mid_tip);

    let root_cos = (a * a + b * b - c * c) / (2.0 * a * b);
    let mid_cos = (b * b + c * c - a * a) / (2.0 * b * c);
    let root_angle = root_cos.clamp(-1.0, 1.0).acos();
    let interior = mid_cos.clamp(-1.0, 1.0).acos();
    (root_angle, PI - interior)
}

/// 把 `from` 转向 `to` 的旋转；已对齐返回 `None`，反向且无法确定轴时使用 `fallback_axis`
fn aim_rotation(from: Vec3, to: Vec3, fallback_axis: Vec3, epsilon: f32) -> Option<Quat> {
    let angle = safe_angle(from, to);
    if angle < epsilon {
        return None;
    }
    let cross = from.cross(to);
    let axis = if cross.length_squared() > DEGENERATE {
        cross.normalize()
    } else if angle > PI * 0.5 {
        fallback_axis
    } else {
        return None;
    };
    Some(Quat::from_axis_angle(axis, angle))
}

// ============================================================================
// IK 求解器
// ============================================================================

/// IK 求解器
///
/// 持有 CCD 的工作缓冲区和子树合成器，多帧之间复用。
#[derive(Clone, Debug)]
pub struct IkSolver {
    /// 收敛阈值
    pub epsilon: f32,
    /// CCD 关节位置
    positions: Vec<Vec3>,
    /// CCD 关节累积变换
    accumulated: Vec<Mat4>,
    composer: HierarchyComposer,
    /// 最近一次 `solve_all` 的结果，与 IK 链一一对应
    outcomes: Vec<IkOutcome>,
}

impl IkSolver {
    /// 创建新的 IK 求解器
    pub fn new(epsilon: f32) -> Self {
        Self {
            epsilon,
            positions: Vec::new(),
            accumulated: Vec::new(),
            composer: HierarchyComposer::new(),
            outcomes: Vec::new(),
        }
    }

    /// 最近一次 `solve_all` 的结果
    pub fn last_outcomes(&self) -> &[IkOutcome] {
        &self.outcomes
    }

    /// 按顺序求解全部 IK 链
    pub fn solve_all(
        &mut self,
        bones: &BoneSet,
        ik_enable: &IkEnableTrack,
        frame: u32,
        locals: &[Mat4],
        matrices: &mut [Mat4],
    ) {
        self.outcomes.clear();
        for chain in bones.ik_chains() {
            let name = &bones.bones()[chain.ik_bone].name;
            let outcome = if ik_enable.is_enabled(name, frame) {
                self.solve_chain(chain, bones, locals, matrices)
            } else {
                IkOutcome::Disabled
            };
            log::trace!("IK '{}' 第 {} 帧: {:?}", name, frame, outcome);
            self.outcomes.push(outcome);
        }
    }

    /// 按关节数分派求解
    pub fn solve_chain(&mut self, chain: &IkChain, bones: &BoneSet, locals: &[Mat4], matrices: &mut [Mat4]) -> IkOutcome {
        match chain.links.len() {
            // 构建时已拒绝
            0 => IkOutcome::Skipped,
            1 => self.solve_look_at(chain, bones, locals, matrices),
            2 => self.solve_two_bone(chain, bones, locals, matrices),
            _ => self.solve_ccd(chain, bones, locals, matrices),
        }
    }

    /// 目标（IK 骨骼）当前位置
    #[inline]
    fn goal_position(chain: &IkChain, bones: &BoneSet, matrices: &[Mat4]) -> Vec3 {
        matrices[chain.ik_bone].transform_point3(bones.rest_position(chain.ik_bone))
    }

    /// LookAt：单关节朝向目标
    ///
    /// 初始姿势下 关节→末端 的方向被旋转到当前 关节→目标 的方向，
    /// 关节位置保持合成后的结果。
    pub fn solve_look_at(&mut self, chain: &IkChain, bones: &BoneSet, locals: &[Mat4], matrices: &mut [Mat4]) -> IkOutcome {
        let root = chain.links[0];
        let rest_root = bones.rest_position(root);
        let posed_root = matrices[root].transform_point3(rest_root);
        let goal = Self::goal_position(chain, bones, matrices);

        let origin = bones.rest_position(chain.target_bone) - rest_root;
        let target = goal - posed_root;
        let (Some(origin), Some(target)) = (origin.try_normalize(), target.try_normalize()) else {
            return IkOutcome::Skipped;
        };

        let rotation = look_at_rotation(origin, target);
        matrices[root] =
            Mat4::from_translation(posed_root) * Mat4::from_mat3(rotation) * Mat4::from_translation(-rest_root);
        self.composer.recompose_from(bones, locals, matrices, root, &[root]);

        IkOutcome::Solved {
            iterations: 1,
            residual: (rotation * origin - target).length(),
        }
    }

    /// 两骨 IK（余弦定理）
    ///
    /// `links = [中间关节, 根关节]`。先按余弦定理弯曲中间关节，
    /// 再旋转根关节使末端指向目标。末端骨骼跟随中间关节。
    ///
    /// 膝盖绕大腿（根关节）当前姿势下的 X 轴弯曲，其他关节在当前弯曲平面内弯曲。
    /// 弯曲角按该轴带符号测量，保持动画已有的弯曲方向；伸直时向负方向弯曲。
    pub fn solve_two_bone(&mut self, chain: &IkChain, bones: &BoneSet, locals: &[Mat4], matrices: &mut [Mat4]) -> IkOutcome {
        let (mid, root, tip) = (chain.links[0], chain.links[1], chain.target_bone);
        let Some([root_mid, mid_tip]) = chain.rest_lengths() else {
            return IkOutcome::Skipped;
        };
        if root_mid < self.epsilon || mid_tip < self.epsilon {
            return IkOutcome::Skipped;
        }

        let a = matrices[root].transform_point3(bones.rest_position(root));
        let b = matrices[mid].transform_point3(bones.rest_position(mid));
        let c = matrices[tip].transform_point3(bones.rest_position(tip));
        let goal = Self::goal_position(chain, bones, matrices);

        if (c - goal).length() <= self.epsilon {
            return IkOutcome::Unchanged;
        }

        let axis = if bones.bones()[mid].is_knee() {
            // 膝盖固定绕根关节的 X 轴弯曲
            matrices[root].transform_vector3(Vec3::X).try_normalize().unwrap_or(Vec3::X)
        } else {
            let plane = (c - a).cross(b - a);
            let reach = (c - a).cross(goal - a);
            if plane.length_squared() > DEGENERATE {
                plane.normalize()
            } else if reach.length_squared() > DEGENERATE {
                reach.normalize()
            } else {
                Vec3::X
            }
        };

        let (_, bend_angle) = cosine_law_angles(root_mid, mid_tip, (goal - a).length());
        let current = signed_angle(b - a, c - b, axis);
        let desired = if current > self.epsilon { bend_angle } else { -bend_angle };
        let mid_fix = pivot_rotation(b, Quat::from_axis_angle(axis, desired - current));

        // 弯曲后再把末端对准目标
        let bent_tip = mid_fix.transform_point3(c);
        let root_fix = match aim_rotation(bent_tip - a, goal - a, axis, self.epsilon) {
            Some(aim) => pivot_rotation(a, aim),
            None => Mat4::IDENTITY,
        };

        matrices[root] = root_fix * matrices[root];
        matrices[mid] = root_fix * mid_fix * matrices[mid];
        matrices[tip] = matrices[mid];
        self.composer.recompose_from(bones, locals, matrices, root, &[root, mid, tip]);

        let reached = matrices[tip].transform_point3(bones.rest_position(tip));
        IkOutcome::Solved {
            iterations: 1,
            residual: (reached - goal).length(),
        }
    }

    /// CCD IK
    ///
    /// 在链根父骨骼的空间中，从初始姿势开始逐关节旋转，
    /// 每个关节每次迭代的旋转角受 `limit_angle` 限制。
    /// 结束后写回链上骨骼矩阵，并重新合成链根以下的子树。
    pub fn solve_ccd(&mut self, chain: &IkChain, bones: &BoneSet, locals: &[Mat4], matrices: &mut [Mat4]) -> IkOutcome {
        let Some(outer) = chain.root_link() else {
            return IkOutcome::Skipped;
        };
        let frame = bones.parent(outer).map(|p| matrices[p]).unwrap_or(Mat4::IDENTITY);
        if frame.determinant().abs() < DEGENERATE {
            return IkOutcome::Skipped;
        }
        let goal = frame.inverse().transform_point3(Self::goal_position(chain, bones, matrices));

        self.positions.clear();
        self.positions.extend(chain.links.iter().map(|&link| bones.rest_position(link)));
        self.accumulated.clear();
        self.accumulated.resize(chain.links.len(), Mat4::IDENTITY);
        let mut end = bones.rest_position(chain.target_bone);

        if (end - goal).length() <= self.epsilon {
            return IkOutcome::Unchanged;
        }

        let mut passes = 0;
        'iterations: for _ in 0..chain.iterations {
            if (end - goal).length() <= self.epsilon {
                break;
            }
            passes += 1;

            for k in 0..self.positions.len() {
                let pivot = self.positions[k];
                let (Some(to_end), Some(to_goal)) = ((end - pivot).try_normalize(), (goal - pivot).try_normalize())
                else {
                    continue;
                };

                let angle = safe_angle(to_end, to_goal);
                if angle < self.epsilon {
                    continue;
                }
                let cross = to_end.cross(to_goal);
                if cross.length_squared() < DEGENERATE {
                    continue;
                }

                let rotation = Quat::from_axis_angle(cross.normalize(), angle.min(chain.limit_angle));
                let fix = pivot_rotation(pivot, rotation);

                // 本关节及所有已处理的末端侧关节一起转动
                for acc in &mut self.accumulated[..=k] {
                    *acc = fix * *acc;
                }
                for pos in &mut self.positions[..k] {
                    *pos = fix.transform_point3(*pos);
                }
                end = fix.transform_point3(end);

                if (end - goal).length() <= self.epsilon {
                    break 'iterations;
                }
            }
        }

        for (&link, acc) in chain.links.iter().zip(&self.accumulated) {
            matrices[link] = frame * *acc;
        }
        self.composer.recompose_from(bones, locals, matrices, outer, &chain.links);

        IkOutcome::Solved {
            iterations: passes,
            residual: (end - goal).length(),
        }
    }
}

impl Default for IkSolver {
    fn default() -> Self {
        Self::new(0.0005)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnimatorConfig;
    use crate::skeleton::{BoneLink, BoneType};

    fn compose(bones: &BoneSet, locals: &[Mat4]) -> Vec<Mat4> {
        let mut matrices = vec![Mat4::IDENTITY; bones.len()];
        HierarchyComposer::new().compose(bones, locals, &mut matrices);
        matrices
    }

    fn posed(bones: &BoneSet, matrices: &[Mat4], idx: usize) -> Vec3 {
        matrices[idx].transform_point3(bones.rest_position(idx))
    }

    fn assert_rigid(m: Mat4) {
        let r = Mat3::from_mat4(m);
        assert!((r.x_axis.length() - 1.0).abs() < 1e-4);
        assert!((r.y_axis.length() - 1.0).abs() < 1e-4);
        assert!((r.z_axis.length() - 1.0).abs() < 1e-4);
        assert!(r.x_axis.dot(r.y_axis).abs() < 1e-4);
        assert!(r.y_axis.dot(r.z_axis).abs() < 1e-4);
        assert!((r.determinant() - 1.0).abs() < 1e-3);
        assert!(m.row(3).abs_diff_eq(glam::Vec4::W, 1e-6));
    }

    // ------------------------------------------------------------------
    // 几何工具
    // ------------------------------------------------------------------

    #[test]
    fn test_look_at_identical_vectors_is_identity() {
        for v in [Vec3::new(0.3, -0.2, 0.9), Vec3::Y, -Vec3::Y, Vec3::Z] {
            let v = v.normalize();
            let rotation = look_at_rotation(v, v);
            assert!(rotation.abs_diff_eq(Mat3::IDENTITY, 1e-5), "{:?}", v);
        }
    }

    #[test]
    fn test_look_at_maps_origin_to_target() {
        let origin = Vec3::new(0.0, -1.0, 0.0);
        let target = Vec3::new(1.0, 0.0, 1.0).normalize();
        let rotation = look_at_rotation(origin, target);
        assert!((rotation * origin).abs_diff_eq(target, 1e-5));
    }

    #[test]
    fn test_cosine_law_fully_extended() {
        let (root, bend) = cosine_law_angles(1.0, 1.0, 2.0);
        assert!(root.abs() < 1e-3);
        assert!(bend.abs() < 1e-3);

        // 超出可达范围同样被限制为伸直
        let (root, bend) = cosine_law_angles(3.0, 2.5, 100.0);
        assert!(!root.is_nan() && !bend.is_nan());
        assert!(bend.abs() < 1e-3);
    }

    #[test]
    fn test_cosine_law_equilateral() {
        let (root, bend) = cosine_law_angles(1.0, 1.0, 1.0);
        assert!((root - PI / 3.0).abs() < 1e-4);
        assert!((bend - 2.0 * PI / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_cosine_law_target_at_root() {
        let (root, bend) = cosine_law_angles(1.0, 1.0, 0.0);
        assert!(!root.is_nan() && !bend.is_nan());
        assert!((bend - PI).abs() < 1e-2);
    }

    // ------------------------------------------------------------------
    // LookAt
    // ------------------------------------------------------------------

    fn eye(goal: Vec3) -> BoneSet {
        let bones = vec![
            BoneLink::new("頭", Vec3::new(0.0, 10.0, 0.0)),
            BoneLink::new("目", Vec3::new(0.0, 10.0, -1.0)).with_parent(0),
            BoneLink::new("目IK", goal).with_type(BoneType::Ik),
        ];
        let chains = vec![IkChain::new(2, 1, vec![0], 1, 1.0)];
        BoneSet::new(bones, chains, &AnimatorConfig::default()).unwrap()
    }

    #[test]
    fn test_look_at_aligned_leaves_pose() {
        let bones = eye(Vec3::new(0.0, 10.0, -5.0));
        let locals = vec![Mat4::IDENTITY; 3];
        let mut matrices = compose(&bones, &locals);
        let chain = bones.ik_chains()[0].clone();

        IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
        assert!(matrices[0].abs_diff_eq(Mat4::IDENTITY, 1e-5));
        assert!(matrices[1].abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_look_at_turns_toward_goal() {
        let bones = eye(Vec3::new(5.0, 10.0, 0.0));
        let locals = vec![Mat4::IDENTITY; 3];
        let mut matrices = compose(&bones, &locals);
        let chain = bones.ik_chains()[0].clone();

        let outcome = IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
        assert!(matches!(outcome, IkOutcome::Solved { .. }));

        // 头的位置不变，目骨骼转到 +X 方向
        assert!(posed(&bones, &matrices, 0).abs_diff_eq(Vec3::new(0.0, 10.0, 0.0), 1e-5));
        assert!(posed(&bones, &matrices, 1).abs_diff_eq(Vec3::new(1.0, 10.0, 0.0), 1e-4));
        assert_rigid(matrices[0]);
    }

    // ------------------------------------------------------------------
    // 两骨
    // ------------------------------------------------------------------

    fn leg(goal: Vec3, knee_name: &str) -> BoneSet {
        let bones = vec![
            BoneLink::new("足", Vec3::new(0.0, 2.0, 0.0)),
            BoneLink::new(knee_name, Vec3::new(0.0, 1.0, 0.0)).with_parent(0),
            BoneLink::new("足首", Vec3::new(0.0, 0.0, 0.0)).with_parent(1),
            BoneLink::new("つま先", Vec3::new(0.0, 0.0, -0.5)).with_parent(2),
            BoneLink::new("足ＩＫ", goal).with_type(BoneType::Ik),
        ];
        let chains = vec![IkChain::new(4, 2, vec![1, 0], 1, 1.0)];
        BoneSet::new(bones, chains, &AnimatorConfig::default()).unwrap()
    }

    #[test]
    fn test_two_bone_reaches_goal() {
        let goal = Vec3::new(0.5, 0.8, 0.0);
        let bones = leg(goal, "中");
        let locals = vec![Mat4::IDENTITY; 5];
        let mut matrices = compose(&bones, &locals);
        let chain = bones.ik_chains()[0].clone();

        let outcome = IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
        match outcome {
            IkOutcome::Solved { residual, .. } => assert!(residual < 1e-3, "residual {}", residual),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(posed(&bones, &matrices, 2).abs_diff_eq(goal, 1e-3));
        // 根关节位置不变，段长保持
        let root = posed(&bones, &matrices, 0);
        let mid = posed(&bones, &matrices, 1);
        assert!(root.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
        assert!(((mid - root).length() - 1.0).abs() < 1e-4);
        assert_rigid(matrices[0]);
        assert_rigid(matrices[1]);
        // 末端骨骼跟随中间关节，脚尖随末端移动
        assert_eq!(matrices[2], matrices[1]);
        assert_eq!(matrices[3], matrices[2]);
    }

    #[test]
    fn test_two_bone_fully_extended_no_nan() {
        // 目标距离 = 两段长度之和
        let goal = Vec3::new(2.0, 2.0, 0.0);
        let bones = leg(goal, "中");
        let locals = vec![Mat4::IDENTITY; 5];
        let mut matrices = compose(&bones, &locals);
        let chain = bones.ik_chains()[0].clone();

        IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
        assert!(matrices.iter().all(|m| m.is_finite()));

        let root = posed(&bones, &matrices, 0);
        let mid = posed(&bones, &matrices, 1);
        let tip = posed(&bones, &matrices, 2);
        // 没有弯曲：三点共线
        assert!(safe_angle(mid - root, tip - mid) < 1e-3);
        assert!(tip.abs_diff_eq(goal, 1e-3));
    }

    #[test]
    fn test_two_bone_unreachable_goal_extends() {
        let goal = Vec3::new(0.0, 2.0, -10.0);
        let bones = leg(goal, "中");
        let locals = vec![Mat4::IDENTITY; 5];
        let mut matrices = compose(&bones, &locals);
        let chain = bones.ik_chains()[0].clone();

        IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
        assert!(matrices.iter().all(|m| m.is_finite()));
        let tip = posed(&bones, &matrices, 2);
        assert!(tip.abs_diff_eq(Vec3::new(0.0, 2.0, -2.0), 1e-3));
    }

    #[test]
    fn test_knee_bends_about_x() {
        // 目标在正下方，需要弯膝
        let goal = Vec3::new(0.0, 0.5, 0.0);
        let bones = leg(goal, "左ひざ");
        assert!(bones.get_bone(1).unwrap().is_knee());
        let locals = vec![Mat4::IDENTITY; 5];
        let mut matrices = compose(&bones, &locals);
        let chain = bones.ik_chains()[0].clone();

        IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
        let mid = posed(&bones, &matrices, 1);
        let tip = posed(&bones, &matrices, 2);
        // 绕 X 轴弯曲，膝盖保持在 YZ 平面内
        assert!(mid.x.abs() < 1e-4);
        assert!(mid.z.abs() > 0.1);
        assert!(tip.abs_diff_eq(goal, 1e-3));
    }

    #[test]
    fn test_bent_knee_reaches_goal_and_keeps_side() {
        let goals = [
            Vec3::new(0.0, 1.2, 0.0),
            Vec3::new(0.0, 0.6, -0.3),
            Vec3::new(0.0, 0.5, 0.4),
            Vec3::new(0.0, 1.0, 0.5),
        ];
        for angle in [0.3f32, -0.3, 1.0, -1.0] {
            for goal in goals {
                let bones = leg(goal, "左ひざ");
                let mut locals = vec![Mat4::IDENTITY; 5];
                // 动画已让膝盖绕 X 轴弯曲
                locals[1] = pivot_rotation(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_x(angle));
                let mut matrices = compose(&bones, &locals);
                let chain = bones.ik_chains()[0].clone();

                IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
                let root = posed(&bones, &matrices, 0);
                let mid = posed(&bones, &matrices, 1);
                let tip = posed(&bones, &matrices, 2);
                assert!(
                    tip.abs_diff_eq(goal, 1e-3),
                    "angle {} goal {:?}: tip {:?}",
                    angle,
                    goal,
                    tip
                );
                let bend = signed_angle(mid - root, tip - mid, Vec3::X);
                assert_eq!(bend.signum(), angle.signum(), "angle {} goal {:?}: knee flipped", angle, goal);
            }
        }
    }

    #[test]
    fn test_two_bone_already_at_goal_unchanged() {
        let bones = leg(Vec3::ZERO, "中");
        let locals = vec![Mat4::IDENTITY; 5];
        let mut matrices = compose(&bones, &locals);
        let before = matrices.clone();
        let chain = bones.ik_chains()[0].clone();

        let outcome = IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
        assert_eq!(outcome, IkOutcome::Unchanged);
        assert_eq!(matrices, before);
    }

    // ------------------------------------------------------------------
    // CCD
    // ------------------------------------------------------------------

    fn arm(goal: Vec3, limit_fraction: f32, iterations: u16) -> BoneSet {
        let bones = vec![
            BoneLink::new("肩", Vec3::new(0.0, 0.0, 0.0)),
            BoneLink::new("腕", Vec3::new(0.0, -1.0, 0.0)).with_parent(0),
            BoneLink::new("ひじ下", Vec3::new(0.0, -2.0, 0.0)).with_parent(1),
            BoneLink::new("手首", Vec3::new(0.0, -3.0, 0.0)).with_parent(2),
            BoneLink::new("指", Vec3::new(0.0, -3.5, 0.0)).with_parent(3),
            BoneLink::new("手ＩＫ", goal).with_type(BoneType::Ik),
        ];
        let chains = vec![IkChain::new(5, 3, vec![2, 1, 0], iterations, limit_fraction)];
        BoneSet::new(bones, chains, &AnimatorConfig::default()).unwrap()
    }

    fn run_ccd(bones: &BoneSet) -> (Vec<Mat4>, IkOutcome) {
        let locals = vec![Mat4::IDENTITY; bones.len()];
        let mut matrices = compose(bones, &locals);
        let chain = bones.ik_chains()[0].clone();
        let outcome = IkSolver::default().solve_chain(&chain, bones, &locals, &mut matrices);
        (matrices, outcome)
    }

    fn residual(outcome: IkOutcome) -> f32 {
        match outcome {
            IkOutcome::Solved { residual, .. } => residual,
            IkOutcome::Unchanged => 0.0,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_ccd_converges() {
        let goal = Vec3::new(1.2, -1.5, 0.6);
        let bones = arm(goal, 1.0, 200);
        let (matrices, outcome) = run_ccd(&bones);

        assert!(residual(outcome) < 2e-3, "residual {:?}", outcome);
        assert!(posed(&bones, &matrices, 3).abs_diff_eq(goal, 1e-3));
        for link in 0..3 {
            assert_rigid(matrices[link]);
        }
        // 末端之后的骨骼被重新合成
        assert!(((posed(&bones, &matrices, 4) - posed(&bones, &matrices, 3)).length() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_ccd_distance_non_increasing() {
        let goal = Vec3::new(1.0, -1.0, 0.8);
        let mut previous = f32::MAX;
        for iterations in 1..8 {
            let bones = arm(goal, 1.0, iterations);
            let (_, outcome) = run_ccd(&bones);
            let current = residual(outcome);
            assert!(current <= previous + 1e-5, "iteration {}: {} > {}", iterations, current, previous);
            previous = current;
        }
    }

    #[test]
    fn test_ccd_early_exit_modifies_nothing() {
        // 目标就在末端初始位置
        let bones = arm(Vec3::new(0.0, -3.0, 0.0), 1.0, 10);
        let locals = vec![Mat4::IDENTITY; bones.len()];
        let mut matrices = compose(&bones, &locals);
        let before = matrices.clone();
        let chain = bones.ik_chains()[0].clone();

        let outcome = IkSolver::default().solve_chain(&chain, &bones, &locals, &mut matrices);
        assert_eq!(outcome, IkOutcome::Unchanged);
        assert_eq!(matrices, before);
    }

    #[test]
    fn test_ccd_angle_limit_slows_convergence() {
        let goal = Vec3::new(2.0, -1.0, 0.0);
        let (_, free) = run_ccd(&arm(goal, 1.0, 1));
        let (_, limited) = run_ccd(&arm(goal, 0.01, 1));
        assert!(residual(limited) > residual(free));
    }

    #[test]
    fn test_ccd_unreachable_goal_stays_finite() {
        let goal = Vec3::new(0.0, 10.0, 0.0);
        let bones = arm(goal, 1.0, 20);
        let (matrices, outcome) = run_ccd(&bones);
        assert!(matrices.iter().all(|m| m.is_finite()));
        assert!(residual(outcome).is_finite());
    }

    #[test]
    fn test_disabled_chain_is_skipped() {
        use crate::animation::IkEnableFrame;

        let bones = arm(Vec3::new(1.0, -1.0, 0.0), 1.0, 10);
        let locals = vec![Mat4::IDENTITY; bones.len()];
        let mut matrices = compose(&bones, &locals);
        let before = matrices.clone();

        let mut track = IkEnableTrack::new();
        track.insert(IkEnableFrame::new(0).with("手ＩＫ", false));

        let mut solver = IkSolver::default();
        solver.solve_all(&bones, &track, 5, &locals, &mut matrices);
        assert_eq!(solver.last_outcomes(), &[IkOutcome::Disabled]);
        assert_eq!(matrices, before);

        solver.solve_all(&bones, &IkEnableTrack::new(), 5, &locals, &mut matrices);
        assert!(matches!(solver.last_outcomes()[0], IkOutcome::Solved { .. }));
    }
}
