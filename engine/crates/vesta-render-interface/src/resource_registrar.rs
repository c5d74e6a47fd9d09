use ash::vk;
use vesta_gfx::{GfxContext, GfxError, GfxResult, resources::buffer::GfxBuffer};

use crate::{
    bindless_config::BindlessKind,
    bindless_table::{FrameSelection, GfxBindlessTable},
};

/// 每个地址占 8 字节
const ADDRESS_SIZE: u64 = size_of::<vk::DeviceAddress>() as u64;

/// 地址表中 `index` 号槽位的字节偏移
pub fn address_slot_offset(index: u32, capacity: u32) -> GfxResult<u64> {
    if index >= capacity {
        return Err(GfxError::BindlessSlotOutOfRange {
            kind: BindlessKind::StorageBuffer.name(),
            index,
            capacity,
        });
    }
    Ok(index as u64 * ADDRESS_SIZE)
}

/// 把 GPU 资源写入 bindless 表中的固定槽位
///
/// 槽位编号必须等于资源在对象池中的 handle index；这一点由调用方保证。
/// storage buffer 不直接进入 descriptor，而是把 device address 写入地址表，
/// shader 通过 `addresses[index]` 找到真正的 buffer。
///
/// # Destroy
/// 需要手动调用 [`ResourceRegistrar::destroy`]
pub struct ResourceRegistrar {
    address_table: GfxBuffer,
    capacity: u32,
    /// 资源释放后是否把槽位写回默认值
    scrub_freed_slots: bool,
}
// new & init
impl ResourceRegistrar {
    /// 创建地址表，并绑定到每一帧 set 的 storage buffer binding
    pub fn new(ctx: &GfxContext, table: &GfxBindlessTable, scrub_freed_slots: bool) -> GfxResult<Self> {
        let _span = tracy_client::span!("ResourceRegistrar::new");

        let capacity = table.config().capacity(BindlessKind::StorageBuffer);
        let table_size = capacity as u64 * ADDRESS_SIZE;
        let address_table = GfxBuffer::new(
            ctx,
            table_size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            None,
            true,
            "bindless-address-table",
        )?;
        let registrar = Self {
            address_table,
            capacity,
            scrub_freed_slots,
        };

        let init = registrar.address_table.write_bytes(ctx, 0, &vec![0u8; table_size as usize]).and_then(|_| {
            table.write_buffer(
                ctx,
                BindlessKind::StorageBuffer,
                0,
                vk::DescriptorBufferInfo::default()
                    .buffer(registrar.address_table.vk_buffer())
                    .offset(0)
                    .range(table_size),
                FrameSelection::AllFrames,
            )
        });
        if let Err(e) = init {
            registrar.destroy(ctx);
            return Err(e);
        }
        Ok(registrar)
    }
}
// destroy
impl ResourceRegistrar {
    pub fn destroy(self, ctx: &GfxContext) {
        self.address_table.destroy(ctx);
    }
}
// getters
impl ResourceRegistrar {
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn scrub_freed_slots(&self) -> bool {
        self.scrub_freed_slots
    }

    /// 读取地址表中的某个槽位
    pub fn storage_buffer_address(&self, index: u32) -> GfxResult<vk::DeviceAddress> {
        let offset = address_slot_offset(index, self.capacity)?;
        let bytes = self.address_table.read_bytes(offset, ADDRESS_SIZE as usize)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }
}
// storage buffer
impl ResourceRegistrar {
    /// 把 buffer 的 device address 写入地址表的 `index` 号槽位
    pub fn register_storage_buffer(&self, ctx: &GfxContext, index: u32, buffer: &GfxBuffer) -> GfxResult<()> {
        let address = buffer.device_address()?;
        self.write_address(ctx, index, address)
    }

    pub fn clear_storage_buffer(&self, ctx: &GfxContext, index: u32) -> GfxResult<()> {
        if !self.scrub_freed_slots {
            return Ok(());
        }
        self.write_address(ctx, index, 0)
    }

    fn write_address(&self, ctx: &GfxContext, index: u32, address: vk::DeviceAddress) -> GfxResult<()> {
        let offset = address_slot_offset(index, self.capacity)?;
        self.address_table.write_bytes(ctx, offset, bytemuck::bytes_of(&address))
    }
}
// image & sampler
impl ResourceRegistrar {
    /// 写入每一帧的 set
    pub fn write_sampled_image(
        &self,
        ctx: &GfxContext,
        table: &GfxBindlessTable,
        index: u32,
        image_view: vk::ImageView,
    ) -> GfxResult<()> {
        let image_info = vk::DescriptorImageInfo::default()
            .image_view(image_view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        table.write_image(ctx, BindlessKind::SampledImage, index, image_info, FrameSelection::AllFrames)
    }

    pub fn write_storage_image(
        &self,
        ctx: &GfxContext,
        table: &GfxBindlessTable,
        index: u32,
        image_view: vk::ImageView,
    ) -> GfxResult<()> {
        let image_info =
            vk::DescriptorImageInfo::default().image_view(image_view).image_layout(vk::ImageLayout::GENERAL);
        table.write_image(ctx, BindlessKind::StorageImage, index, image_info, FrameSelection::AllFrames)
    }

    pub fn write_sampler(
        &self,
        ctx: &GfxContext,
        table: &GfxBindlessTable,
        index: u32,
        sampler: vk::Sampler,
    ) -> GfxResult<()> {
        let image_info = vk::DescriptorImageInfo::default().sampler(sampler);
        table.write_image(ctx, BindlessKind::Sampler, index, image_info, FrameSelection::AllFrames)
    }

    /// 释放后的槽位指向默认纹理
    pub fn clear_sampled_image(
        &self,
        ctx: &GfxContext,
        table: &GfxBindlessTable,
        index: u32,
        fallback_view: vk::ImageView,
    ) -> GfxResult<()> {
        if !self.scrub_freed_slots {
            return Ok(());
        }
        self.write_sampled_image(ctx, table, index, fallback_view)
    }

    /// 释放后的槽位指向默认 sampler
    pub fn clear_sampler(
        &self,
        ctx: &GfxContext,
        table: &GfxBindlessTable,
        index: u32,
        fallback_sampler: vk::Sampler,
    ) -> GfxResult<()> {
        if !self.scrub_freed_slots {
            return Ok(());
        }
        self.write_sampler(ctx, table, index, fallback_sampler)
    }
}
// uniform buffer
impl ResourceRegistrar {
    /// 只写入 `frame` 对应的 set，每一帧各自持有一个 uniform buffer
    pub fn write_uniform_buffer(
        &self,
        ctx: &GfxContext,
        table: &GfxBindlessTable,
        index: u32,
        frame: usize,
        buffer: &GfxBuffer,
        range: vk::DeviceSize,
    ) -> GfxResult<()> {
        let buffer_info = vk::DescriptorBufferInfo::default().buffer(buffer.vk_buffer()).offset(0).range(range);
        table.write_buffer(ctx, BindlessKind::UniformBuffer, index, buffer_info, FrameSelection::Frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_slot_offset() {
        assert_eq!(address_slot_offset(0, 4096).unwrap(), 0);
        assert_eq!(address_slot_offset(1, 4096).unwrap(), 8);
        assert_eq!(address_slot_offset(4095, 4096).unwrap(), 4095 * 8);
    }

    #[test]
    fn test_address_slot_out_of_range() {
        assert!(matches!(
            address_slot_offset(4096, 4096),
            Err(GfxError::BindlessSlotOutOfRange {
                kind: "storage-buffer",
                index: 4096,
                capacity: 4096
            })
        ));
    }
}
