use ash::vk;
use vesta_gfx::{GfxContext, GfxError, GfxResult, resources::buffer::GfxBuffer};
use vesta_utils::PoolError;

use crate::{
    gpu_resources::{GfxBufferHandle, GpuResources, insert_or_destroy},
    gpu_types::GpuPbrMaterialData,
    resource_registrar::ResourceRegistrar,
};

/// 固定容量的块分配器，只记录编号
///
/// 优先复用最近释放的块，否则取下一个从未使用过的块
#[derive(Debug)]
pub struct BlockAllocator {
    capacity: u32,
    /// 从未分配过的第一个块
    counter: u32,
    free_list: Vec<u32>,
}
impl BlockAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            counter: 0,
            free_list: Vec::new(),
        }
    }

    /// 所有块都在使用时返回 None
    pub fn alloc(&mut self) -> Option<u32> {
        if let Some(block) = self.free_list.pop() {
            return Some(block);
        }
        if self.counter >= self.capacity {
            return None;
        }
        let block = self.counter;
        self.counter += 1;
        Some(block)
    }

    /// 重复释放或释放越界的块会返回 false
    pub fn free(&mut self, block: u32) -> bool {
        if block >= self.counter || self.free_list.contains(&block) {
            return false;
        }
        self.free_list.push(block);
        true
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn used_count(&self) -> u32 {
        self.counter - self.free_list.len() as u32
    }
}

/// 所有材质参数所在的 storage buffer
///
/// 每个材质占一个 [`MaterialDataPool::BLOCK_SIZE`] 字节的块，shader 通过
/// push constant 中的块编号以及地址表中的 buffer 槽位读取材质参数。
///
/// # Destroy
/// 需要手动调用 [`MaterialDataPool::destroy`]
pub struct MaterialDataPool {
    blocks: BlockAllocator,
    buffer: GfxBufferHandle,
}
// new & init
impl MaterialDataPool {
    pub const BLOCK_SIZE: u64 = size_of::<GpuPbrMaterialData>() as u64;

    pub fn new(
        ctx: &GfxContext,
        resources: &mut GpuResources,
        registrar: &ResourceRegistrar,
        block_count: u32,
    ) -> GfxResult<Self> {
        let buffer = GfxBuffer::new(
            ctx,
            Self::BLOCK_SIZE * block_count as u64,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            None,
            true,
            "material-data",
        )?;
        let buffer = insert_or_destroy(&mut resources.buffers, ctx, buffer)?;

        let registered = buffer
            .get(&resources.buffers)
            .map_err(GfxError::from)
            .and_then(|b| registrar.register_storage_buffer(ctx, buffer.index(), b));
        if let Err(e) = registered {
            if let Err(pool_err) = buffer.destroy_handle(&mut resources.buffers, ctx) {
                log::error!("failed to release material buffer: {}", pool_err);
            }
            return Err(e);
        }

        log::info!("material data pool: {} blocks at buffer slot {}", block_count, buffer.index());
        Ok(Self {
            blocks: BlockAllocator::new(block_count),
            buffer,
        })
    }
}
// destroy
impl MaterialDataPool {
    pub fn destroy(self, ctx: &GfxContext, resources: &mut GpuResources, registrar: &ResourceRegistrar) {
        if let Err(e) = registrar.clear_storage_buffer(ctx, self.buffer.index()) {
            log::error!("failed to clear material buffer slot: {}", e);
        }
        if let Err(e) = self.buffer.destroy_handle(&mut resources.buffers, ctx) {
            log::error!("failed to release material buffer: {}", e);
            debug_assert!(false, "material buffer released twice");
        }
    }
}
// getters
impl MaterialDataPool {
    /// 材质 buffer 在地址表中的槽位
    #[inline]
    pub fn buffer_slot(&self) -> u32 {
        self.buffer.index()
    }

    #[inline]
    pub fn used_block_count(&self) -> u32 {
        self.blocks.used_count()
    }
}
// blocks
impl MaterialDataPool {
    pub fn alloc_block(&mut self) -> GfxResult<u32> {
        self.blocks.alloc().ok_or_else(|| {
            log::error!("material data pool exhausted, capacity: {}", self.blocks.capacity());
            GfxError::Pool(PoolError::Exhausted {
                capacity: self.blocks.capacity(),
            })
        })
    }

    pub fn free_block(&mut self, block: u32) {
        if !self.blocks.free(block) {
            log::error!("material block {} freed twice or never allocated", block);
            debug_assert!(false, "invalid material block free");
        }
    }

    pub fn write_material(
        &self,
        ctx: &GfxContext,
        resources: &GpuResources,
        block: u32,
        data: &GpuPbrMaterialData,
    ) -> GfxResult<()> {
        let buffer = self.buffer.get(&resources.buffers)?;
        buffer.write_bytes(ctx, block as u64 * Self::BLOCK_SIZE, bytemuck::bytes_of(data))
    }

    pub fn read_material(&self, resources: &GpuResources, block: u32) -> GfxResult<GpuPbrMaterialData> {
        let buffer = self.buffer.get(&resources.buffers)?;
        let bytes = buffer.read_bytes(block as u64 * Self::BLOCK_SIZE, Self::BLOCK_SIZE as usize)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_matches_material_layout() {
        assert_eq!(MaterialDataPool::BLOCK_SIZE, 64);
    }

    #[test]
    fn test_alloc_bumps_counter() {
        let mut blocks = BlockAllocator::new(3);
        assert_eq!(blocks.alloc(), Some(0));
        assert_eq!(blocks.alloc(), Some(1));
        assert_eq!(blocks.alloc(), Some(2));
        assert_eq!(blocks.alloc(), None);
        assert_eq!(blocks.used_count(), 3);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut blocks = BlockAllocator::new(8);
        for _ in 0..4 {
            blocks.alloc();
        }
        assert!(blocks.free(1));
        assert!(blocks.free(3));
        assert_eq!(blocks.alloc(), Some(3));
        assert_eq!(blocks.alloc(), Some(1));
        assert_eq!(blocks.alloc(), Some(4));
    }

    #[test]
    fn test_invalid_free_rejected() {
        let mut blocks = BlockAllocator::new(4);
        let block = blocks.alloc().unwrap();
        assert!(!blocks.free(2));
        assert!(blocks.free(block));
        assert!(!blocks.free(block));
        assert_eq!(blocks.used_count(), 0);
    }
}
