use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::rc::Rc;

use ash::vk;

use crate::{
    commands::{
        command_buffer::GfxCommandBuffer,
        command_pool::GfxCommandPool,
        command_queue::{GfxQueue, GfxQueueFamily},
        submit_info::GfxSubmitInfo,
    },
    error::{GfxResult, VkCheck},
    foundation::{
        debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance, physical_device::GfxPhysicalDevice,
    },
};

/// Vulkan 图形上下文
///
/// 持有 instance、device、queue、内存分配器等核心对象。
/// 启动时创建一次，以引用的形式传给需要它的对象，关闭时显式调用 [`GfxContext::destroy`]。
///
/// # 初始化流程
/// ```ignore
/// let ctx = GfxContext::new("MyApp", &extra_extensions)?;
/// let fence = GfxFence::new(&ctx, true, "frame-fence")?;
/// // 使用...
/// fence.destroy(&ctx);
/// ctx.destroy();
/// ```
pub struct GfxContext {
    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    vk_entry: ash::Entry,

    instance: GfxInstance,
    physical_device: GfxPhysicalDevice,

    /// queue 与 command buffer 也持有 device 函数指针
    device: Rc<GfxDevice>,

    debug_msger: GfxDebugMsger,

    gfx_queue: GfxQueue,

    /// vma 需要在 device 销毁之前销毁
    allocator: ManuallyDrop<vk_mem::Allocator>,

    /// 临时的 graphics command pool，主要用于一次性的上传命令
    temp_graphics_command_pool: GfxCommandPool,
}

// 创建与销毁
impl GfxContext {
    const ENGINE_NAME: &'static str = "Vesta";

    pub fn new(app_name: &str, instance_extra_exts: &[&'static CStr]) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxContext::new");

        let vk_entry = unsafe { ash::Entry::load() }?;
        let instance = GfxInstance::new(&vk_entry, app_name, Self::ENGINE_NAME, instance_extra_exts)?;
        let physical_device = GfxPhysicalDevice::new_descrete_physical_device(instance.ash_instance())?;
        log::info!("use gpu: {}", physical_device.device_name());

        // graphics, compute, transfer 都使用同一个 queue family
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family.queue_family_index)
            .queue_priorities(&[1.0])];

        let device =
            Rc::new(GfxDevice::new(instance.ash_instance(), physical_device.vk_handle, &queue_create_infos)?);
        let gfx_queue = GfxQueue {
            vk_queue: unsafe { device.get_device_queue(physical_device.gfx_queue_family.queue_family_index, 0) },
            queue_family: physical_device.gfx_queue_family.clone(),
            device: device.clone(),
        };
        log::info!("gfx queue's queue family:\n{:#?}", gfx_queue.queue_family);

        let debug_msger = GfxDebugMsger::new(&vk_entry, instance.ash_instance())?;

        let allocator = {
            let mut vma_ci =
                vk_mem::AllocatorCreateInfo::new(instance.ash_instance(), &device, physical_device.vk_handle);
            vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
            vma_ci.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;
            unsafe { vk_mem::Allocator::new(vma_ci) }.vk_check("vmaCreateAllocator")?
        };

        let temp_graphics_command_pool = GfxCommandPool::new_internal(
            &device,
            physical_device.gfx_queue_family.clone(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            "gfx-context-temp-graphics",
        )?;

        // 在 debug_utils 之前创建的 vk::Handle
        {
            device.set_object_debug_name(instance.vk_instance(), "GfxInstance");
            device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");
            device.set_object_debug_name(device.vk_handle(), "GfxDevice");
            device.set_object_debug_name(gfx_queue.vk_queue, "GfxQueue-gfx");
        }

        Ok(Self {
            vk_entry,
            instance,
            physical_device,
            device,
            debug_msger,
            gfx_queue,
            allocator: ManuallyDrop::new(allocator),
            temp_graphics_command_pool,
        })
    }

    /// 调用前需要确保 device 上的所有对象都已经销毁
    pub fn destroy(self) {
        let Self {
            vk_entry,
            instance,
            physical_device: _,
            device,
            debug_msger,
            gfx_queue,
            mut allocator,
            temp_graphics_command_pool,
        } = self;

        temp_graphics_command_pool.destroy_internal(&device);
        unsafe { ManuallyDrop::drop(&mut allocator) };
        drop(gfx_queue);
        device.destroy();
        debug_msger.destroy();
        instance.destroy();
        drop(vk_entry);
    }
}

// getter
impl GfxContext {
    #[inline]
    pub fn vk_entry(&self) -> &ash::Entry {
        &self.vk_entry
    }

    #[inline]
    pub fn instance(&self) -> &GfxInstance {
        &self.instance
    }

    #[inline]
    pub fn device(&self) -> &GfxDevice {
        &self.device
    }

    /// 需要长期持有 device 函数指针的对象（例如 command buffer）使用
    #[inline]
    pub fn device_rc(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn allocator(&self) -> &vk_mem::Allocator {
        &self.allocator
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> GfxQueueFamily {
        self.physical_device.gfx_queue_family.clone()
    }

    #[inline]
    pub fn gfx_queue(&self) -> &GfxQueue {
        &self.gfx_queue
    }
}

// tools
impl GfxContext {
    /// 根据给定的格式，返回第一个支持的格式
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|f| {
            let props = unsafe {
                self.instance.ash_instance().get_physical_device_format_properties(self.physical_device.vk_handle, *f)
            };
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
    }

    /// 同步执行一段命令：录制，提交，等待 queue idle
    ///
    /// 用于资源上传等初始化阶段的操作，不应在帧循环中使用
    pub fn one_time_exec<F, R>(&self, func: F, name: &str) -> GfxResult<R>
    where
        F: FnOnce(&GfxCommandBuffer) -> GfxResult<R>,
    {
        let command_buffer = GfxCommandBuffer::new(&self.device, &self.temp_graphics_command_pool, name)?;
        let command_buffer = scopeguard::guard(command_buffer, |cmd| {
            self.temp_graphics_command_pool.free_command_buffers(std::slice::from_ref(&cmd));
        });

        command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name)?;
        let result = func(&command_buffer)?;
        command_buffer.end()?;

        self.gfx_queue.submit(&[GfxSubmitInfo::new(std::slice::from_ref(&*command_buffer))], None)?;
        self.gfx_queue.wait_idle()?;

        Ok(result)
    }

    /// 找到深度格式，优先 32 位
    pub fn find_depth_format(&self) -> GfxResult<vk::Format> {
        self.find_supported_format(
            &[vk::Format::D32_SFLOAT, vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
        .ok_or(vk::Result::ERROR_FORMAT_NOT_SUPPORTED)
        .vk_check("vkGetPhysicalDeviceFormatProperties")
    }
}
