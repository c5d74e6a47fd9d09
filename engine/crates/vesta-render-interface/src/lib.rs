//! GPU 的边界
//!
//! CPU 侧注册与 GPU 侧 shader 之间的约定都在这里：
//! bindless descriptor 表的 binding 编号、push constant 的字节布局、
//! 材质数据块、mesh 的顶点数据分段，以及 frames in flight 的帧状态。

pub mod bindless_config;
pub mod bindless_table;
pub mod frame_counter;
pub mod gpu_resources;
pub mod gpu_types;
pub mod material_pool;
pub mod mesh_layout;
pub mod resource_registrar;
