use vesta_gfx::{
    GfxContext, GfxResult, resources::buffer::GfxBuffer, resources::texture::GfxTexture, sampler::GfxSampler,
};
use vesta_utils::{Handle, Pool, PoolCapacity, PoolError, PoolObject};

use crate::bindless_config::{BindlessConfig, BindlessKind};

pub type GfxBufferHandle = Handle<GfxBuffer>;
pub type GfxTextureHandle = Handle<GfxTexture>;
pub type GfxSamplerHandle = Handle<GfxSampler>;

/// 所有 GPU 资源的对象池
///
/// 每个池的容量等于对应 bindless 槽位的数量，handle 的 index 可以直接作为 bindless 槽位
pub struct GpuResources {
    pub buffers: Pool<GfxBuffer>,
    pub textures: Pool<GfxTexture>,
    pub samplers: Pool<GfxSampler>,
}
impl GpuResources {
    pub fn new(config: &BindlessConfig) -> Self {
        Self {
            buffers: Pool::fixed("buffer", config.capacity(BindlessKind::StorageBuffer)),
            textures: Pool::fixed("texture", config.capacity(BindlessKind::SampledImage)),
            samplers: Pool::fixed("sampler", config.capacity(BindlessKind::Sampler)),
        }
    }

    pub fn insert_buffer(&mut self, ctx: &GfxContext, buffer: GfxBuffer) -> GfxResult<GfxBufferHandle> {
        insert_or_destroy(&mut self.buffers, ctx, buffer)
    }

    pub fn insert_texture(&mut self, ctx: &GfxContext, texture: GfxTexture) -> GfxResult<GfxTextureHandle> {
        insert_or_destroy(&mut self.textures, ctx, texture)
    }

    pub fn insert_sampler(&mut self, ctx: &GfxContext, sampler: GfxSampler) -> GfxResult<GfxSamplerHandle> {
        insert_or_destroy(&mut self.samplers, ctx, sampler)
    }

    /// 关闭阶段调用，销毁所有未被释放的对象，返回泄漏的数量
    pub fn destroy_leaked(&mut self, ctx: &GfxContext) -> usize {
        let _span = tracy_client::span!("GpuResources::destroy_leaked");
        let leaked =
            self.textures.drain_leaked(ctx) + self.samplers.drain_leaked(ctx) + self.buffers.drain_leaked(ctx);
        if leaked > 0 {
            log::error!("{} gpu resources were still alive at shutdown", leaked);
        }
        leaked
    }

    #[inline]
    pub fn used_slot_counts(&self) -> (usize, usize, usize) {
        (self.buffers.used_slot_count(), self.textures.used_slot_count(), self.samplers.used_slot_count())
    }
}

/// 池已满时销毁对象再返回错误，GPU 资源不会随错误一起丢失
pub fn insert_or_destroy<T, C>(pool: &mut Pool<T>, ctx: &C, object: T) -> GfxResult<Handle<T>>
where
    T: PoolObject<Context = C>,
    C: ?Sized,
{
    if pool.is_full() {
        let capacity = match pool.capacity() {
            PoolCapacity::Fixed(capacity) => capacity,
            PoolCapacity::Growable => u32::MAX,
        };
        object.uninit(ctx);
        return Err(PoolError::Exhausted { capacity }.into());
    }
    Ok(pool.allocate(object)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use vesta_gfx::GfxError;

    struct Counted;
    impl PoolObject for Counted {
        type Context = Cell<u32>;
        fn uninit(self, destroyed: &Cell<u32>) {
            destroyed.set(destroyed.get() + 1);
        }
    }

    #[test]
    fn test_insert_into_full_pool_destroys_object() {
        let destroyed = Cell::new(0);
        let mut pool = Pool::fixed("counted", 1);
        let first = insert_or_destroy(&mut pool, &destroyed, Counted).unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(destroyed.get(), 0);

        let err = insert_or_destroy(&mut pool, &destroyed, Counted).unwrap_err();
        assert!(matches!(err, GfxError::Pool(PoolError::Exhausted { capacity: 1 })));
        assert_eq!(destroyed.get(), 1);
        assert_eq!(pool.used_slot_count(), 1);
    }

    #[test]
    fn test_pool_capacity_follows_bindless_config() {
        let config = BindlessConfig {
            sampler_count: 8,
            sampled_image_count: 16,
            storage_buffer_count: 32,
            ..Default::default()
        };
        let resources = GpuResources::new(&config);
        assert_eq!(resources.buffers.capacity(), PoolCapacity::Fixed(32));
        assert_eq!(resources.textures.capacity(), PoolCapacity::Fixed(16));
        assert_eq!(resources.samplers.capacity(), PoolCapacity::Fixed(8));
        assert_eq!(resources.used_slot_counts(), (0, 0, 0));
    }
}
