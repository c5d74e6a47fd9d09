//! 与 GPU 无关的基础设施
//!
//! - [`pool::Pool`]：带引用计数与分代计数的对象池
//! - [`handle::Handle`]：指向 Pool 中对象的 `(index, generation)`
//! - [`dispose_stack::DisposeStack`]：按 LIFO 顺序执行的销毁动作栈

pub mod dispose_stack;
pub mod error;
pub mod handle;
pub mod pool;

pub use dispose_stack::DisposeStack;
pub use error::{PoolError, PoolResult};
pub use handle::Handle;
pub use pool::{Pool, PoolCapacity, PoolObject};
