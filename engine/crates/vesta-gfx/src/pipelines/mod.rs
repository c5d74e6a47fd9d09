pub mod graphics_pipeline;
pub mod pipeline_cache;
pub mod pipeline_layout;
pub mod shader;
