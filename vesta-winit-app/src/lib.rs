pub mod app;
pub mod demo_scene;
