//! 记录解码 - PMD 骨骼 / IK 表与 VMD 骨骼帧 / IK 帧
//!
//! 只负责单条定长记录的解码，文件头、计数和文件打开由外部加载器处理。
//! 所有数值均为小端序，名称为以 NUL 填充的 Shift-JIS 定长字符串。

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use glam::{Quat, Vec3};

use crate::animation::{BezierCurve, BoneKeyframe, IkEnableFrame};
use crate::{AnimatorError, Result};

/// PMD 中表示「无父骨骼」的索引
pub const NO_PARENT: u16 = 0xFFFF;

/// PMD 骨骼名称长度
const PMD_NAME_LEN: usize = 20;
/// VMD 骨骼名称长度
const VMD_BONE_NAME_LEN: usize = 15;
/// VMD IK 名称长度
const VMD_IK_NAME_LEN: usize = 20;

fn parse_err(what: &'static str) -> impl Fn(std::io::Error) -> AnimatorError {
    move |e| AnimatorError::RecordParse(format!("Failed to read {}: {}", what, e))
}

fn read_vec3<R: Read>(reader: &mut R, what: &'static str) -> Result<[f32; 3]> {
    let mut v = [0.0f32; 3];
    reader.read_f32_into::<LittleEndian>(&mut v).map_err(parse_err(what))?;
    Ok(v)
}

fn read_name<R: Read, const N: usize>(reader: &mut R, what: &'static str) -> Result<String> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes).map_err(parse_err(what))?;
    Ok(decode_shift_jis(&bytes))
}

/// 解码 Shift-JIS 字符串
pub fn decode_shift_jis(bytes: &[u8]) -> String {
    // 找到第一个 null 字节
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (decoded, _, _) = encoding_rs::SHIFT_JIS.decode(&bytes[..end]);
    decoded.into_owned()
}

// ============================================================================
// PMD 骨骼
// ============================================================================

/// PMD 骨骼记录
#[derive(Debug, Clone, PartialEq)]
pub struct BoneRecord {
    pub name: String,
    /// 父骨骼索引，`NO_PARENT` 表示根骨骼
    pub parent_index: u16,
    /// 尾端 / 下一骨骼索引（不使用）
    pub tail_index: u16,
    /// 骨骼类型码
    pub bone_type: u8,
    /// IK 父骨骼索引，0 表示无
    pub ik_parent_index: u16,
    pub rest_position: [f32; 3],
}

impl BoneRecord {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let name = read_name::<R, PMD_NAME_LEN>(reader, "bone name")?;
        let parent_index = reader.read_u16::<LittleEndian>().map_err(parse_err("parent index"))?;
        let tail_index = reader.read_u16::<LittleEndian>().map_err(parse_err("tail index"))?;
        let bone_type = reader.read_u8().map_err(parse_err("bone type"))?;
        let ik_parent_index = reader.read_u16::<LittleEndian>().map_err(parse_err("ik parent index"))?;
        let rest_position = read_vec3(reader, "bone position")?;

        Ok(Self {
            name,
            parent_index,
            tail_index,
            bone_type,
            ik_parent_index,
            rest_position,
        })
    }

    /// 连续读取 `count` 条骨骼记录
    pub fn read_many<R: Read>(reader: &mut R, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::read_from(reader)).collect()
    }

    /// 父骨骼索引
    pub fn parent(&self) -> Option<usize> {
        (self.parent_index != NO_PARENT).then_some(self.parent_index as usize)
    }

    /// IK 父骨骼索引
    pub fn ik_parent(&self) -> Option<usize> {
        (self.ik_parent_index != 0).then_some(self.ik_parent_index as usize)
    }
}

// ============================================================================
// PMD IK
// ============================================================================

/// PMD IK 链记录
#[derive(Debug, Clone, PartialEq)]
pub struct IkRecord {
    /// IK 骨骼索引
    pub ik_bone: u16,
    /// 末端骨骼索引
    pub target_bone: u16,
    pub iterations: u16,
    /// 单次迭代角度限制（以 π 为单位）
    pub limit_fraction: f32,
    /// 链关节索引，从末端侧开始
    pub links: Vec<u16>,
}

impl IkRecord {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let ik_bone = reader.read_u16::<LittleEndian>().map_err(parse_err("ik bone index"))?;
        let target_bone = reader.read_u16::<LittleEndian>().map_err(parse_err("ik target index"))?;
        let chain_length = reader.read_u8().map_err(parse_err("ik chain length"))?;
        let iterations = reader.read_u16::<LittleEndian>().map_err(parse_err("ik iterations"))?;
        let limit_fraction = reader.read_f32::<LittleEndian>().map_err(parse_err("ik angle limit"))?;

        let mut links = vec![0u16; chain_length as usize];
        reader.read_u16_into::<LittleEndian>(&mut links).map_err(parse_err("ik chain links"))?;

        Ok(Self {
            ik_bone,
            target_bone,
            iterations,
            limit_fraction,
            links,
        })
    }

    pub fn read_many<R: Read>(reader: &mut R, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::read_from(reader)).collect()
    }
}

// ============================================================================
// VMD 骨骼关键帧
// ============================================================================

/// VMD 骨骼关键帧记录
#[derive(Debug, Clone, PartialEq)]
pub struct BoneKeyframeRecord {
    pub bone_name: String,
    pub frame_index: u32,
    pub translation: [f32; 3],
    /// 四元数 x, y, z, w
    pub rotation: [f32; 4],
    /// 插值参数 (64 字节)
    pub interpolation: [u8; 64],
}

impl BoneKeyframeRecord {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let bone_name = read_name::<R, VMD_BONE_NAME_LEN>(reader, "bone name")?;
        let frame_index = reader.read_u32::<LittleEndian>().map_err(parse_err("frame index"))?;
        let translation = read_vec3(reader, "translation")?;

        let mut rotation = [0.0f32; 4];
        reader.read_f32_into::<LittleEndian>(&mut rotation).map_err(parse_err("rotation"))?;

        let mut interpolation = [0u8; 64];
        reader.read_exact(&mut interpolation).map_err(parse_err("interpolation"))?;

        Ok(Self {
            bone_name,
            frame_index,
            translation,
            rotation,
            interpolation,
        })
    }

    pub fn read_many<R: Read>(reader: &mut R, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::read_from(reader)).collect()
    }

    /// 旋转插值曲线
    ///
    /// 每行 16 字节：X_x1, Y_x1, Z_x1, R_x1, X_y1, ... 旋转通道位于偏移 3, 7, 11, 15
    pub fn curve(&self) -> BezierCurve {
        let i = &self.interpolation;
        BezierCurve::from_parameters([i[3], i[7], i[11], i[15]])
    }

    /// 转换为运行时关键帧
    pub fn to_keyframe(&self) -> BoneKeyframe {
        let [x, y, z, w] = self.rotation;
        let rotation = Quat::from_xyzw(x, y, z, w);
        // 全零四元数视为无旋转
        let rotation = if rotation.length_squared() > 1e-12 {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };

        BoneKeyframe {
            frame_index: self.frame_index,
            translation: Vec3::from_array(self.translation),
            rotation,
            curve: self.curve(),
        }
    }
}

// ============================================================================
// VMD IK 开关帧
// ============================================================================

/// VMD IK 开关帧记录
#[derive(Debug, Clone, PartialEq)]
pub struct IkEnableRecord {
    pub frame_index: u32,
    /// 模型显示开关（不使用）
    pub visible: bool,
    /// (IK 骨骼名称, 是否启用)
    pub entries: Vec<(String, bool)>,
}

impl IkEnableRecord {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let frame_index = reader.read_u32::<LittleEndian>().map_err(parse_err("ik frame index"))?;
        let visible = reader.read_u8().map_err(parse_err("visibility"))? != 0;
        let count = reader.read_u32::<LittleEndian>().map_err(parse_err("ik entry count"))?;

        let mut entries = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let name = read_name::<R, VMD_IK_NAME_LEN>(reader, "ik name")?;
            let enabled = reader.read_u8().map_err(parse_err("ik enable flag"))? != 0;
            entries.push((name, enabled));
        }

        Ok(Self {
            frame_index,
            visible,
            entries,
        })
    }

    pub fn read_many<R: Read>(reader: &mut R, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::read_from(reader)).collect()
    }

    pub fn to_frame(&self) -> IkEnableFrame {
        let mut frame = IkEnableFrame::new(self.frame_index);
        for (name, enabled) in &self.entries {
            frame.enabled.insert(name.clone(), *enabled);
        }
        frame
    }
}
