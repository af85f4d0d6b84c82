use crate::core::{
    BackendError, BackendResult, CompressedPacket, PixelFormat, VideoCodec, VideoFrame,
    VideoStreamInfo,
};
use crate::pipeline::{VideoDecoderBackend, VideoDecoderFactory, VideoOpenContext};
use log::{debug, info};
use std::collections::VecDeque;

/// 软件解码工厂（可靠性基线）
///
/// RAW 流直接透传；其他编码需要启用 `ffmpeg` 特性。
pub struct SoftwareVideoFactory;

impl SoftwareVideoFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SoftwareVideoFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoderFactory for SoftwareVideoFactory {
    fn name(&self) -> &str {
        "软件解码"
    }

    fn create(&self, ctx: &VideoOpenContext<'_>) -> BackendResult<Box<dyn VideoDecoderBackend>> {
        let stream = ctx.stream;
        if stream.codec == VideoCodec::Raw {
            return Ok(Box::new(RawVideoDecoder::new(stream)?));
        }

        #[cfg(feature = "ffmpeg")]
        {
            let decoder = crate::backend::ffmpeg_video::FfmpegVideoDecoder::open_software(stream)?;
            Ok(Box::new(decoder))
        }
        #[cfg(not(feature = "ffmpeg"))]
        {
            Err(BackendError::Unsupported(format!(
                "{} 软解需要启用 ffmpeg 特性",
                stream.codec.name()
            )))
        }
    }
}

/// RAW 透传解码器：每个包就是一帧 RGBA 数据
pub struct RawVideoDecoder {
    width: u32,
    height: u32,
    time_base: f64,
    queue: VecDeque<CompressedPacket>,
}

impl RawVideoDecoder {
    pub fn new(stream: &VideoStreamInfo) -> BackendResult<Self> {
        if stream.width == 0 || stream.height == 0 {
            return Err(BackendError::Unsupported(format!(
                "无效的 RAW 尺寸 {}x{}",
                stream.width, stream.height
            )));
        }
        info!("创建 RAW 软件解码器: {}x{}", stream.width, stream.height);
        Ok(Self {
            width: stream.width,
            height: stream.height,
            time_base: stream.time_base,
            queue: VecDeque::new(),
        })
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl VideoDecoderBackend for RawVideoDecoder {
    fn name(&self) -> &str {
        "RAW软解"
    }

    fn feed(&mut self, packet: CompressedPacket) -> BackendResult<()> {
        if packet.data.len() != self.frame_size() {
            return Err(BackendError::Platform(format!(
                "RAW 包大小 {} 与帧大小 {} 不一致",
                packet.data.len(),
                self.frame_size()
            )));
        }
        self.queue.push_back(packet);
        Ok(())
    }

    fn pull(&mut self) -> BackendResult<Option<VideoFrame>> {
        Ok(self.queue.pop_front().map(|packet| VideoFrame {
            pts: (packet.pts as f64 * self.time_base * 1000.0).round() as i64,
            duration: 0,
            width: self.width,
            height: self.height,
            format: PixelFormat::RGBA,
            data: packet.data,
            surface: None,
        }))
    }

    fn stop(&mut self) {
        debug!("RAW 解码器停止，丢弃 {} 个未取出的包", self.queue.len());
        self.queue.clear();
    }
}
