//! 动画配置
//!
//! 所有参数扁平化，按值持有（每个实例一份，无全局状态）。

use crate::animation::DEFAULT_BEZIER_ITERATIONS;

/// 动画运行时配置
#[derive(Debug, Clone)]
pub struct AnimatorConfig {
    // ========== 时间 ==========
    /// 动作帧率，默认 30.0（VMD 标准）
    pub frames_per_second: f32,
    /// 超过动作长度后是否从头循环，默认 true
    pub loop_playback: bool,

    // ========== 插值 ==========
    /// 贝塞尔曲线 Newton 迭代上限，默认 12
    pub bezier_iterations: u8,

    // ========== IK ==========
    /// IK 收敛阈值（模型单位），默认 0.0005
    pub ik_epsilon: f32,
    /// 层级合成的起点骨骼名称，默认 "センター"
    pub root_bone_name: String,
    /// 名称中包含这些片段的骨骼视为膝盖类关节
    pub knee_name_patterns: Vec<String>,

    // ========== 调试 ==========
    /// 是否输出逐帧调试日志，默认 false
    pub debug_log: bool,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 30.0,
            loop_playback: true,

            bezier_iterations: DEFAULT_BEZIER_ITERATIONS,

            ik_epsilon: 0.0005,
            root_bone_name: "センター".to_string(),
            // 膝盖只允许绕 X 轴弯曲
            knee_name_patterns: vec!["ひざ".to_string(), "knee".to_string()],

            debug_log: false,
        }
    }
}

impl AnimatorConfig {
    /// 骨骼名称是否匹配膝盖规则
    pub fn is_knee_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.knee_name_patterns
            .iter()
            .any(|pattern| lower.contains(&pattern.to_lowercase()))
    }
}
