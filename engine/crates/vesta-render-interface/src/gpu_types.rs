//! shader 可见的数据结构
//!
//! 字段顺序与大小必须和 shader 中的声明保持一致

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// mesh 在 push constant 中的描述，shader 通过它从 bindless 地址表读取顶点
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMesh {
    /// 顶点 buffer 在地址表中的槽位
    pub vertex_buffer_handle: u32,
    pub vertex_count: u32,
    pub mesh_flags: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuPushConstant {
    pub trs: Mat4,
    pub material_block_index: u32,
    pub mesh: GpuMesh,
}

/// 材质数据块，正好占据材质池中的一个 64 字节 block
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuPbrMaterialData {
    pub base_color_texture: u32,
    pub normal_texture: u32,
    pub base_color_mul: Vec3,
    pub padding: [u32; 11],
}

/// per-frame uniform buffer 的内容
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuFrameConst {
    pub view: Mat4,
    pub proj: Mat4,
    pub camera_pos: Vec4,
    pub camera_dir: Vec4,
    pub time: f32,
    pub debug_index: f32,
    /// 材质池 buffer 在地址表中的槽位，由 renderer 在写入时填充
    pub material_buffer_slot: u32,
    pub _padding: u32,
}

const _: () = assert!(size_of::<GpuMesh>() == 12);
const _: () = assert!(size_of::<GpuPushConstant>() == 80);
const _: () = assert!(size_of::<GpuPbrMaterialData>() == 64);
const _: () = assert!(size_of::<GpuFrameConst>() == 176);

/// 固定 256 字节的 push constant 块，未使用的尾部填 0
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PushConstantBlock {
    bytes: [u8; Self::SIZE],
}
impl PushConstantBlock {
    pub const SIZE: usize = 256;

    pub fn encode(push_constant: &GpuPushConstant) -> Self {
        let mut bytes = [0u8; Self::SIZE];
        let src = bytemuck::bytes_of(push_constant);
        bytes[..src.len()].copy_from_slice(src);
        Self { bytes }
    }

    pub fn decode(&self) -> GpuPushConstant {
        bytemuck::pod_read_unaligned(&self.bytes[..size_of::<GpuPushConstant>()])
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
impl std::fmt::Debug for PushConstantBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PushConstantBlock").field(&self.decode()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_push_constant_round_trip() {
        let push_constant = GpuPushConstant {
            trs: Mat4::from_scale_rotation_translation(
                Vec3::new(1.5, 2.0, 0.25),
                Quat::from_rotation_y(0.3),
                Vec3::new(-4.0, 0.125, 9.0),
            ),
            material_block_index: 42,
            mesh: GpuMesh {
                vertex_buffer_handle: 7,
                vertex_count: 3600,
                mesh_flags: 0b101,
            },
        };

        let block = PushConstantBlock::encode(&push_constant);
        assert_eq!(block.as_bytes().len(), 256);

        let decoded = block.decode();
        assert_eq!(decoded.trs.to_cols_array(), push_constant.trs.to_cols_array());
        assert_eq!(decoded.material_block_index, 42);
        assert_eq!(decoded.mesh, push_constant.mesh);
    }

    #[test]
    fn test_push_constant_layout() {
        let push_constant = GpuPushConstant {
            trs: Mat4::IDENTITY,
            material_block_index: 0x0102_0304,
            mesh: GpuMesh {
                vertex_buffer_handle: 5,
                vertex_count: 6,
                mesh_flags: 7,
            },
        };
        let bytes = PushConstantBlock::encode(&push_constant);
        let bytes = bytes.as_bytes();

        // mat4 列主序，第一个元素是 1.0
        assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
        assert_eq!(&bytes[64..68], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(&bytes[68..72], &5u32.to_ne_bytes());
        assert_eq!(&bytes[72..76], &6u32.to_ne_bytes());
        assert_eq!(&bytes[76..80], &7u32.to_ne_bytes());
        assert!(bytes[80..].iter().all(|b| *b == 0));
    }
}
