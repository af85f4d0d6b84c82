use crate::core::{AudioFrame, BackendError, BackendResult, StereoVolume};
use crate::pipeline::{AudioOpenContext, AudioOutputBackend, AudioOutputFactory};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::SegQueue;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 设备不支持请求的声道数时依次尝试（采样率保持不变，不做重采样）
const FALLBACK_CHANNELS: [u16; 2] = [2, 1];

/// 把交错采样从 `src` 声道重排为 `dst` 声道
///
/// 下混到单声道取平均；其他情况按声道位置取模复制。
fn remap_channels(data: &[f32], src: usize, dst: usize) -> Vec<f32> {
    if src == dst || src == 0 || dst == 0 {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len() / src * dst);
    for group in data.chunks_exact(src) {
        if dst == 1 {
            out.push(group.iter().sum::<f32>() / src as f32);
        } else {
            out.extend((0..dst).map(|c| group[c % src]));
        }
    }
    out
}

/// 系统音频输出 - 使用 cpal 播放，回调中按声道应用左右音量
pub struct CpalAudioOutput {
    device: Device,
    config: StreamConfig,
    /// 流的声道数（写入时按设备声道数重排）
    source_channels: u16,
    stream: Option<Stream>,
    buffer: Arc<SegQueue<f32>>,
    volume: Arc<Mutex<StereoVolume>>,
}

// cpal::Stream 不是 Send；节点锁保证同一时刻只有一个线程访问
unsafe impl Send for CpalAudioOutput {}

impl CpalAudioOutput {
    /// 打开默认输出设备
    ///
    /// 声道数不受支持时回退到同采样率的立体声/单声道；采样率不受支持时
    /// 返回 Unsupported，由下一个音频工厂接手。
    pub fn new(sample_rate: u32, channels: u16) -> BackendResult<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BackendError::Platform("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let requested = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let config = if Self::is_supported(&device, &requested)? {
            requested
        } else {
            warn!("⚠️  音频设备不支持 {} Hz, {} 声道配置，尝试其他声道数", sample_rate, channels);
            Self::find_fallback(&device, sample_rate, channels)?.ok_or_else(|| {
                BackendError::Unsupported(format!(
                    "音频设备不支持 {} Hz（原请求 {} 声道）",
                    sample_rate, channels
                ))
            })?
        };

        Ok(Self {
            device,
            config,
            source_channels: channels,
            stream: None,
            buffer: Arc::new(SegQueue::new()),
            volume: Arc::new(Mutex::new(StereoVolume::default())),
        })
    }

    fn is_supported(device: &Device, config: &StreamConfig) -> BackendResult<bool> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| BackendError::Platform(format!("无法获取支持的音频配置: {}", e)))?;
        Ok(supported
            .into_iter()
            .any(|range| Self::is_config_compatible(config, &range)))
    }

    fn find_fallback(
        device: &Device,
        sample_rate: u32,
        requested_channels: u16,
    ) -> BackendResult<Option<StreamConfig>> {
        for channels in FALLBACK_CHANNELS {
            if channels == requested_channels {
                continue;
            }
            let candidate = StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            if Self::is_supported(device, &candidate)? {
                info!("✅ 使用回退配置: {} Hz, {} 声道（写入时重排声道）", sample_rate, channels);
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;
        rate_in_range && config.channels == supported.channels()
    }

    /// 获取实际使用的音频配置
    pub fn get_config(&self) -> (u32, u16) {
        (self.config.sample_rate.0, self.config.channels)
    }

    fn clear_buffer(&self) {
        while self.buffer.pop().is_some() {}
    }
}

impl AudioOutputBackend for CpalAudioOutput {
    fn name(&self) -> &str {
        "cpal系统音频"
    }

    fn start(&mut self) -> BackendResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = self.buffer.clone();
        let volume = self.volume.clone();
        let channels = self.config.channels.max(1) as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let gains = *volume.lock();
                    for (i, sample) in data.iter_mut().enumerate() {
                        let gain = gains.gain_for_channel(i % channels);
                        *sample = buffer.pop().map(|value| value * gain).unwrap_or(0.0);
                    }
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| BackendError::Platform(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| BackendError::Platform(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");
        Ok(())
    }

    fn write(&mut self, frame: &AudioFrame) -> BackendResult<()> {
        if self.stream.is_none() {
            return Err(BackendError::Platform("音频输出未启动".to_string()));
        }
        if frame.sample_rate != self.config.sample_rate.0 {
            return Err(BackendError::Unsupported(format!(
                "帧采样率 {} Hz 与输出 {} Hz 不一致",
                frame.sample_rate, self.config.sample_rate.0
            )));
        }
        let src = if frame.channels == 0 { self.source_channels } else { frame.channels };
        for sample in remap_channels(&frame.data, src as usize, self.config.channels as usize) {
            self.buffer.push(sample);
        }
        Ok(())
    }

    fn set_stereo_volume(&mut self, volume: StereoVolume) {
        *self.volume.lock() = volume;
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }

    fn destroy(&mut self) {
        self.stop();
        self.clear_buffer();
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// cpal 音频输出工厂
#[derive(Default)]
pub struct CpalAudioFactory;

impl CpalAudioFactory {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutputFactory for CpalAudioFactory {
    fn name(&self) -> &str {
        "cpal系统音频"
    }

    fn create(&self, ctx: &AudioOpenContext<'_>) -> BackendResult<Box<dyn AudioOutputBackend>> {
        let output = CpalAudioOutput::new(ctx.stream.sample_rate, ctx.stream.channels)?;
        let (rate, channels) = output.get_config();
        debug!("cpal 输出配置: {} Hz, {} 声道", rate, channels);
        Ok(Box::new(output))
    }
}
