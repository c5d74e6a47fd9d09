use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::PoolResult;
use crate::pool::{Pool, PoolObject};

/// 指向 [`Pool`] 中对象的 `(index, generation)`
///
/// Handle 可以随意 Copy，但是 Copy 本身不会增加引用计数：
/// - 需要共享所有权时使用 [`Handle::share`]，之后每一份都需要 [`Handle::destroy_handle`]
/// - [`Handle::alias`] 得到的是弱引用，只能在某个强引用存活期间使用
///
/// 对象被释放后 generation 递增，旧的 Handle 查询时会得到 `StaleHandle`
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _phantom: PhantomData,
        }
    }

    /// 在 pool 中分配一个 slot 存放 `object`，返回的 Handle 持有一个引用
    #[inline]
    pub fn create_handle(pool: &mut Pool<T>, object: T) -> PoolResult<Self> {
        pool.allocate(object)
    }

    #[inline]
    pub fn get<'a>(&self, pool: &'a Pool<T>) -> PoolResult<&'a T> {
        pool.get(self.index, self.generation)
    }

    #[inline]
    pub fn get_mut<'a>(&self, pool: &'a mut Pool<T>) -> PoolResult<&'a mut T> {
        pool.get_mut(self.index, self.generation)
    }

    /// 增加引用计数，返回一个新的强引用
    pub fn share(&self, pool: &mut Pool<T>) -> PoolResult<Self> {
        pool.get(self.index, self.generation)?;
        pool.increase_ref_count(self.index)?;
        Ok(*self)
    }

    /// 不增加引用计数的副本
    #[inline]
    pub fn alias(&self) -> Self {
        *self
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T: PoolObject> Handle<T> {
    /// 释放这个 Handle 持有的引用
    ///
    /// # 返回
    /// 对象是否在这次调用中被释放，为 true 时不能再访问该对象
    ///
    /// 已经失效的 Handle 会返回 `StaleHandle`，不会影响复用了该 slot 的新对象
    pub fn destroy_handle(self, pool: &mut Pool<T>, ctx: &T::Context) -> PoolResult<bool> {
        pool.get(self.index, self.generation)?;
        pool.decrease_ref_count(self.index, ctx)
    }
}

impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_name = std::any::type_name::<T>().rsplit("::").next().unwrap_or("?");
        write!(f, "Handle<{}>({}v{})", type_name, self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use std::cell::Cell;

    struct Texture {
        id: u32,
    }
    impl PoolObject for Texture {
        type Context = Cell<u32>;
        fn uninit(self, ctx: &Self::Context) {
            ctx.set(ctx.get() + 1);
        }
    }

    #[test]
    fn test_handle_scenario() {
        let freed = Cell::new(0);
        let mut pool = Pool::growable("texture");

        let old = Handle::create_handle(&mut pool, Texture { id: 1 }).unwrap();
        assert_eq!((old.index(), old.generation()), (0, 0));
        assert!(old.destroy_handle(&mut pool, &freed).unwrap());
        assert_eq!(freed.get(), 1);

        let new = Handle::create_handle(&mut pool, Texture { id: 2 }).unwrap();
        assert_eq!((new.index(), new.generation()), (0, 1));

        assert!(matches!(old.get(&pool), Err(PoolError::StaleHandle { .. })));
        assert_eq!(new.get(&pool).unwrap().id, 2);
    }

    #[test]
    fn test_share_keeps_object_alive() {
        let freed = Cell::new(0);
        let mut pool = Pool::growable("texture");

        let owner = Handle::create_handle(&mut pool, Texture { id: 1 }).unwrap();
        let shared = owner.share(&mut pool).unwrap();
        assert_eq!(owner, shared);

        assert!(!owner.destroy_handle(&mut pool, &freed).unwrap());
        assert_eq!(shared.get(&pool).unwrap().id, 1);
        assert!(shared.destroy_handle(&mut pool, &freed).unwrap());
        assert_eq!(freed.get(), 1);
    }

    #[test]
    fn test_alias_does_not_own() {
        let freed = Cell::new(0);
        let mut pool = Pool::growable("texture");

        let owner = Handle::create_handle(&mut pool, Texture { id: 1 }).unwrap();
        let weak = owner.alias();
        assert_eq!(pool.ref_count(owner.index()).unwrap(), 1);
        assert_eq!(weak.get(&pool).unwrap().id, 1);

        assert!(owner.destroy_handle(&mut pool, &freed).unwrap());
        assert!(weak.get(&pool).is_err());
    }

    #[test]
    fn test_stale_destroy_does_not_touch_new_object() {
        let freed = Cell::new(0);
        let mut pool = Pool::growable("texture");

        let old = Handle::create_handle(&mut pool, Texture { id: 1 }).unwrap();
        assert!(old.destroy_handle(&mut pool, &freed).unwrap());
        let new = Handle::create_handle(&mut pool, Texture { id: 2 }).unwrap();

        assert!(old.destroy_handle(&mut pool, &freed).is_err());
        assert!(old.share(&mut pool).is_err());
        assert_eq!(pool.ref_count(new.index()).unwrap(), 1);
        assert_eq!(freed.get(), 1);
    }

    #[test]
    fn test_get_mut() {
        let mut pool = Pool::growable("texture");
        let handle = Handle::create_handle(&mut pool, Texture { id: 1 }).unwrap();
        handle.get_mut(&mut pool).unwrap().id = 5;
        assert_eq!(handle.get(&pool).unwrap().id, 5);
    }

    #[test]
    fn test_debug_format() {
        let handle: Handle<Texture> = Handle::new(3, 2);
        assert_eq!(format!("{:?}", handle), "Handle<Texture>(3v2)");
    }
}
