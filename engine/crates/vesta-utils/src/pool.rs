use crate::error::{PoolError, PoolResult};
use crate::handle::Handle;

/// 放入 Pool 的对象在引用计数归零时需要释放的外部资源
///
/// `Context` 通常是持有 device / allocator 的上下文，纯 CPU 对象可以使用 `()`
pub trait PoolObject {
    type Context: ?Sized;

    fn uninit(self, ctx: &Self::Context);
}

/// Pool 的容量策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolCapacity {
    /// 没有上限，slot 数组按需增长
    Growable,
    /// 最多 n 个 slot，通常与 bindless table 中对应资源的槽位数一致
    Fixed(u32),
}

struct PoolSlot<T> {
    /// 引用计数为 0 时为 None
    object: Option<T>,
    ref_count: u32,
    generation: u32,
}

/// 分代对象池
///
/// - slot 按分配顺序连续存放，回收的 index 进入 free list，分配时优先复用（LIFO）
/// - 引用计数归零时调用 [`PoolObject::uninit`]，并将 generation 加一，
///   之前发出的所有 Handle 随之失效
/// - 单线程使用，跨线程共享需要外部同步
pub struct Pool<T> {
    name: &'static str,
    slots: Vec<PoolSlot<T>>,
    free_list: Vec<u32>,
    capacity: PoolCapacity,
}

// new & init
impl<T> Pool<T> {
    pub fn new(name: &'static str, capacity: PoolCapacity) -> Self {
        let reserve = match capacity {
            PoolCapacity::Growable => 0,
            PoolCapacity::Fixed(n) => n as usize,
        };
        Self {
            name,
            slots: Vec::with_capacity(reserve),
            free_list: Vec::new(),
            capacity,
        }
    }

    #[inline]
    pub fn growable(name: &'static str) -> Self {
        Self::new(name, PoolCapacity::Growable)
    }

    #[inline]
    pub fn fixed(name: &'static str, capacity: u32) -> Self {
        Self::new(name, PoolCapacity::Fixed(capacity))
    }
}

// getter
impl<T> Pool<T> {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn capacity(&self) -> PoolCapacity {
        self.capacity
    }

    /// 已经创建过的 slot 数量（包含 free list 中的）
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 正在使用的 slot 数量
    #[inline]
    pub fn used_slot_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// 再分配一次是否会返回 `Exhausted`
    ///
    /// 持有外部资源的对象应当在创建资源之前检查，避免对象随错误一起丢失
    pub fn is_full(&self) -> bool {
        match self.capacity {
            PoolCapacity::Growable => false,
            PoolCapacity::Fixed(capacity) => self.free_list.is_empty() && self.slots.len() >= capacity as usize,
        }
    }

    pub fn ref_count(&self, index: u32) -> PoolResult<u32> {
        Ok(self.slot(index)?.ref_count)
    }

    pub fn generation(&self, index: u32) -> PoolResult<u32> {
        Ok(self.slot(index)?.generation)
    }

    pub fn is_alive(&self, handle: Handle<T>) -> bool {
        self.get(handle.index(), handle.generation()).is_ok()
    }

    fn slot(&self, index: u32) -> PoolResult<&PoolSlot<T>> {
        self.slots.get(index as usize).ok_or(PoolError::InvalidIndex {
            index,
            len: self.slots.len() as u32,
        })
    }

    fn slot_mut(&mut self, index: u32) -> PoolResult<&mut PoolSlot<T>> {
        let len = self.slots.len() as u32;
        self.slots.get_mut(index as usize).ok_or(PoolError::InvalidIndex { index, len })
    }
}

// allocate & lookup
impl<T> Pool<T> {
    /// 分配一个 slot 存放 `object`，引用计数置为 1
    ///
    /// free list 非空时复用最近回收的 index，generation 保持回收时递增后的值；
    /// 否则追加一个 generation 为 0 的新 slot
    pub fn allocate(&mut self, object: T) -> PoolResult<Handle<T>> {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.object.is_none() && slot.ref_count == 0);
            slot.object = Some(object);
            slot.ref_count = 1;
            return Ok(Handle::new(index, slot.generation));
        }

        if let PoolCapacity::Fixed(capacity) = self.capacity {
            if self.slots.len() >= capacity as usize {
                log::error!("pool <{}> exhausted, capacity: {}", self.name, capacity);
                return Err(PoolError::Exhausted { capacity });
            }
        }

        let index = self.slots.len() as u32;
        self.slots.push(PoolSlot {
            object: Some(object),
            ref_count: 1,
            generation: 0,
        });
        Ok(Handle::new(index, 0))
    }

    /// 只有当 generation 一致时才返回对象
    pub fn get(&self, index: u32, generation: u32) -> PoolResult<&T> {
        let slot = self.slot(index)?;
        match &slot.object {
            Some(object) if slot.generation == generation => Ok(object),
            _ => Err(PoolError::StaleHandle {
                index,
                generation,
                current: slot.generation,
            }),
        }
    }

    pub fn get_mut(&mut self, index: u32, generation: u32) -> PoolResult<&mut T> {
        let slot = self.slot_mut(index)?;
        match &mut slot.object {
            Some(object) if slot.generation == generation => Ok(object),
            _ => Err(PoolError::StaleHandle {
                index,
                generation,
                current: slot.generation,
            }),
        }
    }

    /// 调用方需要保证自己持有该 slot 的一个有效引用
    pub fn increase_ref_count(&mut self, index: u32) -> PoolResult<()> {
        let slot = self.slot_mut(index)?;
        if slot.object.is_none() {
            return Err(PoolError::StaleHandle {
                index,
                generation: slot.generation,
                current: slot.generation,
            });
        }
        slot.ref_count += 1;
        Ok(())
    }

    /// 遍历所有存活的对象
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object.as_ref().map(|object| (Handle::new(index as u32, slot.generation), object))
        })
    }
}

impl<T: Default> Pool<T> {
    /// 分配一个默认构造的对象，之后通过 [`Pool::get_mut`] 就地初始化
    pub fn allocate_default(&mut self) -> PoolResult<Handle<T>> {
        self.allocate(T::default())
    }
}

// release
impl<T: PoolObject> Pool<T> {
    /// 引用计数减一；归零时释放对象，index 进入 free list，generation 加一
    ///
    /// # 返回
    /// 对象是否在这次调用中被释放
    ///
    /// 对空闲 slot 调用会返回 [`PoolError::RefCountUnderflow`]，slot 状态保持不变
    #[must_use = "reference count underflow must be reported"]
    pub fn decrease_ref_count(&mut self, index: u32, ctx: &T::Context) -> PoolResult<bool> {
        let name = self.name;
        let slot = self.slot_mut(index)?;
        if slot.ref_count == 0 {
            log::error!("pool <{}>: reference count underflow on slot {}", name, index);
            return Err(PoolError::RefCountUnderflow { index });
        }

        slot.ref_count -= 1;
        if slot.ref_count > 0 {
            return Ok(false);
        }

        let object = slot.object.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(index);
        if let Some(object) = object {
            object.uninit(ctx);
        }
        Ok(true)
    }

    /// 释放所有仍然存活的对象，用于关闭时清理泄漏的资源
    ///
    /// # 返回
    /// 泄漏的对象数量
    pub fn drain_leaked(&mut self, ctx: &T::Context) -> usize {
        let mut leaked = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(object) = slot.object.take() else {
                continue;
            };
            log::error!(
                "pool <{}>: leaked slot {} (generation {}, ref count {})",
                self.name,
                index,
                slot.generation,
                slot.ref_count
            );
            slot.ref_count = 0;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(index as u32);
            object.uninit(ctx);
            leaked += 1;
        }
        leaked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// 记录 uninit 调用顺序的测试对象
    struct Tracked(u32);
    impl PoolObject for Tracked {
        type Context = RefCell<Vec<u32>>;
        fn uninit(self, ctx: &Self::Context) {
            ctx.borrow_mut().push(self.0);
        }
    }

    #[test]
    fn test_allocate_then_free_then_reuse() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");

        let first = pool.allocate(Tracked(10)).unwrap();
        assert_eq!((first.index(), first.generation()), (0, 0));

        assert!(pool.decrease_ref_count(first.index(), &log).unwrap());
        assert_eq!(pool.generation(0).unwrap(), 1);
        assert_eq!(pool.used_slot_count(), 0);

        let second = pool.allocate(Tracked(20)).unwrap();
        assert_eq!((second.index(), second.generation()), (0, 1));

        assert_eq!(
            pool.get(0, 0).err(),
            Some(PoolError::StaleHandle {
                index: 0,
                generation: 0,
                current: 1
            })
        );
        assert_eq!(pool.get(0, 1).unwrap().0, 20);
        assert_eq!(*log.borrow(), vec![10]);
    }

    #[test]
    fn test_generation_increases_by_one_per_free() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");

        for expected_generation in 0..8 {
            let handle = pool.allocate(Tracked(expected_generation)).unwrap();
            assert_eq!(handle.index(), 0);
            assert_eq!(handle.generation(), expected_generation);
            assert!(pool.decrease_ref_count(0, &log).unwrap());
            assert_eq!(pool.generation(0).unwrap(), expected_generation + 1);
        }
        assert_eq!(pool.slot_count(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse_by_other_object() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");

        let a = pool.allocate(Tracked(1)).unwrap();
        let _b = pool.allocate(Tracked(2)).unwrap();
        assert!(pool.decrease_ref_count(a.index(), &log).unwrap());
        let c = pool.allocate(Tracked(3)).unwrap();

        assert_eq!(c.index(), a.index());
        assert!(pool.get(a.index(), a.generation()).is_err());
        assert!(pool.get_mut(a.index(), a.generation()).is_err());
        assert!(!pool.is_alive(a));
        assert!(pool.is_alive(c));
    }

    #[test]
    fn test_n_increase_n_plus_one_decrease() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");
        let handle = pool.allocate(Tracked(7)).unwrap();

        const N: u32 = 5;
        for _ in 0..N {
            pool.increase_ref_count(handle.index()).unwrap();
        }
        assert_eq!(pool.ref_count(handle.index()).unwrap(), N + 1);

        for _ in 0..N {
            assert!(!pool.decrease_ref_count(handle.index(), &log).unwrap());
            assert!(log.borrow().is_empty());
        }
        assert!(pool.decrease_ref_count(handle.index(), &log).unwrap());
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn test_lifo_reuse() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");
        let handles: Vec<_> = (0..4).map(|i| pool.allocate(Tracked(i)).unwrap()).collect();

        assert!(pool.decrease_ref_count(handles[1].index(), &log).unwrap());
        assert!(pool.decrease_ref_count(handles[3].index(), &log).unwrap());

        assert_eq!(pool.allocate(Tracked(30)).unwrap().index(), 3);
        assert_eq!(pool.allocate(Tracked(10)).unwrap().index(), 1);
        assert_eq!(pool.allocate(Tracked(40)).unwrap().index(), 4);
    }

    #[test]
    fn test_underflow_is_reported_and_slot_untouched() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");
        let handle = pool.allocate(Tracked(1)).unwrap();
        assert!(pool.decrease_ref_count(handle.index(), &log).unwrap());

        assert_eq!(
            pool.decrease_ref_count(handle.index(), &log),
            Err(PoolError::RefCountUnderflow { index: 0 })
        );
        assert_eq!(pool.generation(0).unwrap(), 1);
        assert_eq!(pool.ref_count(0).unwrap(), 0);
        assert_eq!(*log.borrow(), vec![1]);

        // free list 中只能有一份 index 0
        pool.allocate(Tracked(2)).unwrap();
        assert_eq!(pool.allocate(Tracked(3)).unwrap().index(), 1);
    }

    #[test]
    fn test_invalid_index() {
        let log = RefCell::new(Vec::new());
        let mut pool: Pool<Tracked> = Pool::growable("tracked");
        assert_eq!(pool.get(3, 0).err(), Some(PoolError::InvalidIndex { index: 3, len: 0 }));
        assert!(pool.increase_ref_count(3).is_err());
        assert!(pool.decrease_ref_count(3, &log).is_err());
    }

    #[test]
    fn test_increase_on_free_slot_is_rejected() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");
        let handle = pool.allocate(Tracked(1)).unwrap();
        assert!(pool.decrease_ref_count(handle.index(), &log).unwrap());
        assert!(pool.increase_ref_count(handle.index()).is_err());
        assert_eq!(pool.ref_count(handle.index()).unwrap(), 0);
    }

    #[test]
    fn test_fixed_capacity() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::fixed("tracked", 2);
        let a = pool.allocate(Tracked(1)).unwrap();
        assert!(!pool.is_full());
        pool.allocate(Tracked(2)).unwrap();
        assert!(pool.is_full());
        assert_eq!(pool.allocate(Tracked(3)).err(), Some(PoolError::Exhausted { capacity: 2 }));

        assert!(pool.decrease_ref_count(a.index(), &log).unwrap());
        assert!(!pool.is_full());
        assert_eq!(pool.allocate(Tracked(3)).unwrap().index(), 0);
    }

    #[test]
    fn test_drain_leaked() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");
        let a = pool.allocate(Tracked(1)).unwrap();
        pool.allocate(Tracked(2)).unwrap();
        pool.allocate(Tracked(3)).unwrap();
        assert!(pool.decrease_ref_count(a.index(), &log).unwrap());

        assert_eq!(pool.drain_leaked(&log), 2);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(pool.used_slot_count(), 0);
        assert_eq!(pool.drain_leaked(&log), 0);
    }

    #[test]
    fn test_iter_live_objects() {
        let log = RefCell::new(Vec::new());
        let mut pool = Pool::growable("tracked");
        let handles: Vec<_> = (0..3).map(|i| pool.allocate(Tracked(i)).unwrap()).collect();
        assert!(pool.decrease_ref_count(handles[1].index(), &log).unwrap());

        let live: Vec<_> = pool.iter().map(|(handle, object)| (handle.index(), object.0)).collect();
        assert_eq!(live, vec![(0, 0), (2, 2)]);
    }

    #[test]
    fn test_allocate_default() {
        let mut pool: Pool<u64> = Pool::growable("u64");
        let handle = pool.allocate_default().unwrap();
        *pool.get_mut(handle.index(), handle.generation()).unwrap() = 42;
        assert_eq!(*pool.get(handle.index(), handle.generation()).unwrap(), 42);
    }
}
