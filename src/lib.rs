//! 播放器解码/输出管线
//!
//! - 视频：硬解优先，失败自动回退软解
//! - 音频：按顺序尝试输出后端，支持左右声道独立音量
//! - Surface：控制线程随时切换，渲染线程下次取帧时重新绑定

pub mod backend;
pub mod core;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use crate::core::{PipelineConfig, PipelineError, Result};
pub use crate::pipeline::{Backends, Pipeline, RenderEvent, RenderLoop, SurfaceHandle};
