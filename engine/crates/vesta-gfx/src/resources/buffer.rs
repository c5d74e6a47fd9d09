use ash::vk;
use vesta_utils::PoolObject;
use std::ptr;

use vk_mem::Alloc;

use crate::{
    error::{GfxError, GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
};

/// 由 vma 分配的 buffer
///
/// # Destroy
/// 需要手动调用 [`GfxBuffer::destroy`]
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,
    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,

    debug_name: String,

    usage: vk::BufferUsageFlags,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// init & destroy
impl GfxBuffer {
    /// - align: 当 buffer 处于一个大的 memory block 中时，align 用来指定 buffer 的起始 offset,
    ///   其实地址的内存对齐，默认对齐到 8 字节
    /// - mem_map: 是否在创建时 map 到 host，map 的 buffer 会放在 host 可见的内存中
    /// - 优先使用 device memory
    pub fn new(
        ctx: &GfxContext,
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        align: Option<vk::DeviceSize>,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        check_buffer_usage(buffer_usage)?;

        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let allocator = ctx.allocator();
        let align = align.unwrap_or(8);
        let (buffer, mut alloc) = unsafe { allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, align) }
            .map_err(|result| GfxError::VmaAlloc {
                name: name.as_ref().to_string(),
                result,
            })?;

        let mut mapped_ptr = None;
        if mem_map {
            match unsafe { allocator.map_memory(&mut alloc) } {
                Ok(ptr) => mapped_ptr = Some(ptr),
                Err(e) => {
                    unsafe { allocator.destroy_buffer(buffer, &mut alloc) };
                    return Err(e).vk_check("vmaMapMemory");
                }
            }
        }

        let mut device_addr = None;
        if buffer_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            unsafe {
                device_addr = Some(
                    ctx.device().get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer)),
                );
            }
        }

        let buffer = Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            map_ptr: mapped_ptr,
            device_addr,

            debug_name: name.as_ref().to_string(),

            usage: buffer_usage,
        };
        ctx.device().set_debug_name(&buffer, name);
        Ok(buffer)
    }

    #[inline]
    pub fn new_stage_buffer(ctx: &GfxContext, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> GfxResult<Self> {
        Self::new(ctx, size, vk::BufferUsageFlags::TRANSFER_SRC, None, true, debug_name)
    }

    pub fn destroy(mut self, ctx: &GfxContext) {
        let allocator = ctx.allocator();
        unsafe {
            if self.map_ptr.is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }

            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
impl PoolObject for GfxBuffer {
    type Context = GfxContext;

    fn uninit(self, ctx: &GfxContext) {
        self.destroy(ctx);
    }
}
// getter
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    pub fn device_address(&self) -> GfxResult<vk::DeviceAddress> {
        self.device_addr.ok_or_else(|| GfxError::MissingDeviceAddress {
            name: self.debug_name.clone(),
        })
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.map_ptr.is_some()
    }
}
// tools
impl GfxBuffer {
    pub fn mapped_ptr(&self) -> GfxResult<*mut u8> {
        self.map_ptr.ok_or_else(|| GfxError::BufferNotMapped {
            name: self.debug_name.clone(),
        })
    }

    #[inline]
    pub fn flush(&self, ctx: &GfxContext, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()> {
        ctx.allocator().flush_allocation(&self.allocation, offset, size).vk_check("vmaFlushAllocation")
    }

    /// 通过 mem map 的方式将 bytes 写入 buffer 的 offset 处，并 flush
    pub fn write_bytes(&self, ctx: &GfxContext, offset: vk::DeviceSize, bytes: &[u8]) -> GfxResult<()> {
        check_write_range(&self.debug_name, self.size, offset, bytes.len() as vk::DeviceSize)?;
        let dst = self.mapped_ptr()?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), dst.add(offset as usize), bytes.len());
        }
        self.flush(ctx, offset, bytes.len() as vk::DeviceSize)
    }

    /// 从 mapped 内存中读取 bytes
    pub fn read_bytes(&self, offset: vk::DeviceSize, len: usize) -> GfxResult<Vec<u8>> {
        check_write_range(&self.debug_name, self.size, offset, len as vk::DeviceSize)?;
        let src = self.mapped_ptr()?;
        let mut bytes = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping(src.add(offset as usize), bytes.as_mut_ptr(), len);
        }
        Ok(bytes)
    }

    /// 通过 mem map 的方式将 data 传入到 buffer 中
    #[inline]
    pub fn transfer_data_by_mmap<T: bytemuck::Pod>(&self, ctx: &GfxContext, data: &[T]) -> GfxResult<()> {
        self.write_bytes(ctx, 0, bytemuck::cast_slice(data))
    }

    /// 创建一个临时的 stage buffer，先将数据放入 stage buffer，再 transfer 到 self
    ///
    /// 同步等待，会阻塞运行，适合初始化阶段传输大块数据
    pub fn transfer_data_sync<T: bytemuck::Pod>(&self, ctx: &GfxContext, data: &[T]) -> GfxResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Ok(());
        }
        check_write_range(&self.debug_name, self.size, 0, bytes.len() as vk::DeviceSize)?;

        let stage_buffer =
            Self::new_stage_buffer(ctx, bytes.len() as vk::DeviceSize, format!("{}-stage-buffer", self.debug_name))?;
        let stage_buffer = scopeguard::guard(stage_buffer, |buffer| buffer.destroy(ctx));

        stage_buffer.write_bytes(ctx, 0, bytes)?;

        let cmd_name = format!("{}-transfer-data", &self.debug_name);
        ctx.one_time_exec(
            |cmd| {
                cmd.cmd_copy_buffer(
                    stage_buffer.vk_buffer(),
                    self.handle,
                    &[vk::BufferCopy {
                        size: bytes.len() as vk::DeviceSize,
                        ..Default::default()
                    }],
                );
                Ok(())
            },
            &cmd_name,
        )
    }
}

/// 不允许 UNIFORM + DBA 的组合：uniform buffer 通过 descriptor 绑定，不进入地址表
fn check_buffer_usage(usage: vk::BufferUsageFlags) -> GfxResult<()> {
    if usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
        return Err(GfxError::InvalidBufferUsage {
            usage,
            reason: "UNIFORM_BUFFER + SHADER_DEVICE_ADDRESS",
        });
    }
    Ok(())
}

fn check_write_range(name: &str, size: vk::DeviceSize, offset: vk::DeviceSize, len: vk::DeviceSize) -> GfxResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(GfxError::BufferOverflow {
            name: name.to_string(),
            offset,
            len,
            size,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_with_device_address_rejected() {
        let usage = vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        assert!(matches!(check_buffer_usage(usage), Err(GfxError::InvalidBufferUsage { .. })));

        assert!(check_buffer_usage(vk::BufferUsageFlags::UNIFORM_BUFFER).is_ok());
        assert!(
            check_buffer_usage(vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
                .is_ok()
        );
    }

    #[test]
    fn test_write_range() {
        assert!(check_write_range("b", 64, 0, 64).is_ok());
        assert!(check_write_range("b", 64, 60, 4).is_ok());
        assert!(matches!(
            check_write_range("b", 64, 60, 8),
            Err(GfxError::BufferOverflow {
                offset: 60,
                len: 8,
                size: 64,
                ..
            })
        ));
        assert!(check_write_range("b", 64, u64::MAX, 2).is_err());
    }
}
