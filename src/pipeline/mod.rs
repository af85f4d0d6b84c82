// 解码/输出管线核心

pub mod surface;
pub mod node;
pub mod factory;
pub mod fallback;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod render_loop;

pub use surface::{SurfaceGuard, SurfaceHandle, SurfaceRegistry, SurfaceSnapshot};
pub use node::{AudioNode, AudioOutputBackend, FramePull, VideoDecoderBackend, VideoNode};
pub use factory::{
    AudioOpenContext, AudioOutputFactory, CodecQuery, CodecSelector, VideoDecoderFactory,
    VideoOpenContext,
};
pub use fallback::{DecoderTier, FallbackPolicy, SelectedDecoder};
pub use pipeline::{Backends, Pipeline};
pub use render_loop::{RenderEvent, RenderLoop};
