use crate::backend::HWAccelType;
use crate::core::{AudioStreamInfo, BackendResult, CapabilityFlags, StereoVolume, VideoCodec, VideoStreamInfo};
use crate::pipeline::node::{AudioOutputBackend, VideoDecoderBackend};
use crate::pipeline::surface::SurfaceHandle;
use std::sync::Arc;

/// 交给编解码选择回调的查询
#[derive(Debug, Clone, Copy)]
pub struct CodecQuery {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub hwaccel: HWAccelType,
}

/// 硬件编解码选择回调：返回 false 表示拒绝该硬件路径
pub type CodecSelector = Arc<dyn Fn(&CodecQuery) -> bool + Send + Sync>;

/// 打开视频解码器时的上下文（配置与 Surface 快照）
pub struct VideoOpenContext<'a> {
    pub stream: &'a VideoStreamInfo,
    pub flags: CapabilityFlags,
    pub surface: Option<SurfaceHandle>,
    pub preferred_hwaccel: Option<HWAccelType>,
    pub codec_selector: Option<CodecSelector>,
}

/// 打开音频输出时的上下文
pub struct AudioOpenContext<'a> {
    pub stream: &'a AudioStreamInfo,
    pub volume: StereoVolume,
}

/// 视频解码器工厂
///
/// 实现必须保证：返回 Err 时不残留任何已分配的资源。
pub trait VideoDecoderFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self, ctx: &VideoOpenContext<'_>) -> BackendResult<Box<dyn VideoDecoderBackend>>;
}

/// 音频输出工厂
pub trait AudioOutputFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self, ctx: &AudioOpenContext<'_>) -> BackendResult<Box<dyn AudioOutputBackend>>;
}
