use anyhow::Context;
use ash::vk;
use vesta_render_interface::{
    gpu_resources::GfxBufferHandle,
    gpu_types::GpuMesh,
    mesh_layout::{MeshData, MeshFlags, MeshLayout},
};

use crate::render_context::RenderContext;

/// GPU 上的 mesh
///
/// 顶点数据按属性分段放在一个 storage buffer 中，shader 通过地址表读取；
/// index buffer 直接绑定
///
/// # Destroy
/// 需要手动调用 [`RenderContext::destroy_mesh`]
pub struct Mesh {
    vertex_buffer: GfxBufferHandle,
    index_buffer: GfxBufferHandle,
    vertex_count: u32,
    index_count: u32,
    flags: MeshFlags,
    name: String,
}
// getters
impl Mesh {
    /// 写入 push constant 的 mesh 描述
    #[inline]
    pub fn gpu_mesh(&self) -> GpuMesh {
        GpuMesh {
            vertex_buffer_handle: self.vertex_buffer.index(),
            vertex_count: self.vertex_count,
            mesh_flags: self.flags.bits(),
        }
    }

    #[inline]
    pub fn index_buffer(&self) -> GfxBufferHandle {
        self.index_buffer
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl RenderContext {
    pub fn create_mesh(&mut self, mut data: MeshData, name: &str) -> anyhow::Result<Mesh> {
        let _span = tracy_client::span!("RenderContext::create_mesh");

        data.validate().map_err(anyhow::Error::msg).with_context(|| format!("invalid mesh <{}>", name))?;
        anyhow::ensure!(!data.indices.is_empty(), "mesh <{}> has no triangles", name);
        data.ensure_tangents();

        let layout = MeshLayout::new(data.vertex_count());
        let vertex_bytes = data.pack_vertex_data();
        debug_assert_eq!(vertex_bytes.len() as u64, layout.total_size());
        let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);

        let vertex_buffer = self
            .create_storage_buffer(layout.total_size(), vk::BufferUsageFlags::empty(), &format!("{}-vertex", name))
            .with_context(|| format!("create vertex buffer of mesh <{}>", name))?;
        let index_buffer = match self.create_plain_buffer(
            index_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &format!("{}-index", name),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.destroy_storage_buffer(vertex_buffer)?;
                return Err(e).with_context(|| format!("create index buffer of mesh <{}>", name));
            }
        };

        let mesh = Mesh {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertex_count(),
            index_count: data.indices.len() as u32,
            flags: data.flags(),
            name: name.to_string(),
        };

        let uploaded =
            self.upload_buffer(vertex_buffer, &vertex_bytes).and_then(|_| self.upload_buffer(index_buffer, index_bytes));
        if let Err(e) = uploaded {
            self.destroy_mesh(mesh)?;
            return Err(e).with_context(|| format!("upload mesh <{}>", name));
        }

        log::info!(
            "mesh <{}>: {} vertices, {} indices, vertex buffer slot {}",
            name,
            mesh.vertex_count,
            mesh.index_count,
            vertex_buffer.index()
        );
        Ok(mesh)
    }

    /// 调用方需要保证 GPU 不再使用该 mesh
    pub fn destroy_mesh(&mut self, mesh: Mesh) -> anyhow::Result<()> {
        self.destroy_plain_buffer(mesh.index_buffer);
        self.destroy_storage_buffer(mesh.vertex_buffer)
            .with_context(|| format!("destroy vertex buffer of mesh <{}>", mesh.name))
    }
}
