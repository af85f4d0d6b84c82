use crate::core::{AudioFrame, BackendError, BackendResult, StereoVolume};
use crate::pipeline::{AudioOpenContext, AudioOutputBackend, AudioOutputFactory};
use crossbeam::queue::SegQueue;
use log::{debug, info};
use std::sync::Arc;

/// 缓冲音频输出的取样端（由宿主在自己的音频回调里拉取）
#[derive(Clone, Default)]
pub struct AudioSink {
    buffer: Arc<SegQueue<f32>>,
}

impl AudioSink {
    /// 取出最多 `max` 个交错采样
    pub fn pop_samples(&self, max: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(max.min(self.buffer.len()));
        while out.len() < max {
            match self.buffer.pop() {
                Some(sample) => out.push(sample),
                None => break,
            }
        }
        out
    }

    /// 获取缓冲区大小（采样数）
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 清空缓冲区
    pub fn clear(&self) {
        while self.buffer.pop().is_some() {}
    }
}

/// 无设备的缓冲音频输出：应用左右声道增益后写入无锁队列
pub struct BufferedAudioOutput {
    sink: AudioSink,
    volume: StereoVolume,
    channels: u16,
    running: bool,
}

impl BufferedAudioOutput {
    pub fn new(sink: AudioSink, channels: u16) -> Self {
        Self {
            sink,
            volume: StereoVolume::default(),
            channels,
            running: false,
        }
    }

    pub fn volume(&self) -> StereoVolume {
        self.volume
    }
}

impl AudioOutputBackend for BufferedAudioOutput {
    fn name(&self) -> &str {
        "缓冲音频输出"
    }

    fn start(&mut self) -> BackendResult<()> {
        self.running = true;
        info!("音频输出已启动（缓冲模式，{} 声道）", self.channels);
        Ok(())
    }

    fn write(&mut self, frame: &AudioFrame) -> BackendResult<()> {
        if !self.running {
            return Err(BackendError::Platform("音频输出未启动".to_string()));
        }
        let channels = frame.channels.max(1) as usize;
        for (i, sample) in frame.data.iter().enumerate() {
            let gain = if channels == 1 {
                // 单声道取左右平均
                (self.volume.left + self.volume.right) * 0.5
            } else {
                self.volume.gain_for_channel(i % channels)
            };
            self.sink.buffer.push(*sample * gain);
        }
        Ok(())
    }

    fn set_stereo_volume(&mut self, volume: StereoVolume) {
        self.volume = volume;
    }

    fn stop(&mut self) {
        self.running = false;
        info!("音频输出已停止");
    }

    fn destroy(&mut self) {
        debug!("缓冲音频输出销毁，丢弃 {} 个采样", self.sink.len());
        self.sink.clear();
    }
}

/// 缓冲音频输出工厂；创建出的输出共享同一个取样端
#[derive(Default)]
pub struct BufferedAudioFactory {
    sink: AudioSink,
}

impl BufferedAudioFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> AudioSink {
        self.sink.clone()
    }
}

impl AudioOutputFactory for BufferedAudioFactory {
    fn name(&self) -> &str {
        "缓冲音频输出"
    }

    fn create(&self, ctx: &AudioOpenContext<'_>) -> BackendResult<Box<dyn AudioOutputBackend>> {
        if ctx.stream.channels == 0 {
            return Err(BackendError::Unsupported("声道数为 0".to_string()));
        }
        Ok(Box::new(BufferedAudioOutput::new(self.sink(), ctx.stream.channels)))
    }
}
