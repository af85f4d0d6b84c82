use crate::backend::{BufferedAudioFactory, HardwareVideoFactory, SoftwareVideoFactory};
use crate::core::{
    AudioStreamInfo, PipelineConfig, PipelineError, Result, StereoVolume, VideoStreamInfo,
};
use crate::pipeline::factory::{
    AudioOpenContext, AudioOutputFactory, CodecQuery, CodecSelector, VideoOpenContext,
};
use crate::pipeline::fallback::FallbackPolicy;
use crate::pipeline::node::{AudioNode, VideoNode};
use crate::pipeline::surface::{SurfaceGuard, SurfaceHandle, SurfaceRegistry};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 管线可用的后端集合
pub struct Backends {
    pub video: FallbackPolicy,
    pub audio: Vec<Box<dyn AudioOutputFactory>>,
}

impl Backends {
    /// 平台默认后端：探测到的硬解 API + 软解 + 系统音频（若启用）+ 缓冲音频
    pub fn platform_default() -> Self {
        let mut video = FallbackPolicy::new(Box::new(SoftwareVideoFactory::new()));
        for factory in HardwareVideoFactory::detected() {
            video = video.with_hardware(Box::new(factory));
        }

        let mut audio: Vec<Box<dyn AudioOutputFactory>> = Vec::new();
        #[cfg(feature = "cpal-output")]
        audio.push(Box::new(crate::backend::CpalAudioFactory::new()));
        audio.push(Box::new(BufferedAudioFactory::new()));

        Self { video, audio }
    }
}

/// 解码/输出管线
///
/// - 至多一个视频节点、一个音频节点；重新打开时先销毁旧节点
/// - Surface 与重配置标志由 [`SurfaceRegistry`] 持锁保护
/// - 所有方法都接收 `&self`，可放入 `Arc` 供控制线程与播放引擎共享
pub struct Pipeline {
    config: PipelineConfig,
    video_policy: FallbackPolicy,
    audio_factories: Vec<Box<dyn AudioOutputFactory>>,
    surface: Arc<SurfaceRegistry>,
    video_node: Mutex<Option<VideoNode>>,
    audio_node: Mutex<Option<AudioNode>>,
    volume: Mutex<StereoVolume>,
    codec_selector: RwLock<Option<CodecSelector>>,
    destroyed: AtomicBool,
}

impl Pipeline {
    /// 创建管线；节点在首次请求时才创建
    pub fn create(config: PipelineConfig, backends: Backends) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::ConstructionFailed(e.to_string()))?;

        info!(
            "{} 🎮 创建管线: 硬解层级 {}，音频后端 {}，硬解开关 {:?}",
            log_ctx(),
            backends.video.hardware_tiers(),
            backends.audio.len(),
            config.hw_codecs
        );

        Ok(Self {
            volume: Mutex::new(config.volume),
            config,
            video_policy: backends.video,
            audio_factories: backends.audio,
            surface: Arc::new(SurfaceRegistry::new()),
            video_node: Mutex::new(None),
            audio_node: Mutex::new(None),
            codec_selector: RwLock::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(PipelineError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// 安装硬件编解码选择回调
    pub fn set_codec_selector<F>(&self, selector: F)
    where
        F: Fn(&CodecQuery) -> bool + Send + Sync + 'static,
    {
        *self.codec_selector.write() = Some(Arc::new(selector));
    }

    /// 打开视频解码器（硬解优先，失败回退软解）
    ///
    /// 已有的视频节点会先被销毁。失败时管线不保留任何节点。
    pub fn open_video_decoder(&self, stream: &VideoStreamInfo) -> Result<VideoNode> {
        let mut slot = self.video_node.lock();
        self.ensure_alive()?;

        if let Some(previous) = slot.take() {
            info!("{} 重新打开视频解码器，销毁旧节点: {}", log_ctx(), previous.name());
            previous.destroy();
        }

        let snapshot = self.surface.snapshot();
        let ctx = VideoOpenContext {
            stream,
            flags: self.config.hw_codecs,
            surface: snapshot.handle,
            preferred_hwaccel: self.config.preferred_hwaccel,
            codec_selector: self.codec_selector.read().clone(),
        };

        let selected = self.video_policy.select(&ctx)?;
        let node = VideoNode::attach(
            selected.backend,
            Arc::downgrade(&self.surface),
            snapshot.generation,
        );
        *slot = Some(node.clone());

        info!(
            "{} ✅ 视频解码器就绪: {} ({:?}, {}x{})",
            log_ctx(),
            node.name(),
            selected.tier,
            stream.width,
            stream.height
        );
        Ok(node)
    }

    /// 打开音频输出，并立即应用当前保存的音量
    pub fn open_audio_output(&self, stream: &AudioStreamInfo) -> Result<AudioNode> {
        let mut slot = self.audio_node.lock();
        self.ensure_alive()?;

        if let Some(previous) = slot.take() {
            info!("{} 重新打开音频输出，销毁旧节点: {}", log_ctx(), previous.name());
            previous.destroy();
        }

        let volume = *self.volume.lock();
        let ctx = AudioOpenContext { stream, volume };

        for factory in &self.audio_factories {
            match factory.create(&ctx) {
                Ok(backend) => {
                    let node = AudioNode::attach(backend, volume);
                    info!(
                        "{} 🔊 音频输出就绪: {}，音量 左:{} 右:{}",
                        log_ctx(),
                        node.name(),
                        volume.left,
                        volume.right
                    );
                    *slot = Some(node.clone());
                    return Ok(node);
                }
                Err(e) => {
                    warn!("{} 音频后端 {} 不可用: {}", log_ctx(), factory.name(), e);
                }
            }
        }

        error!("{} ❌ 没有可用的音频输出", log_ctx());
        Err(PipelineError::NoOutputAvailable)
    }

    /// 设置渲染目标；同一原生窗口重复设置为空操作
    ///
    /// 与 `destroy` 并发时，注册表在释放后拒绝写入，句柄不会被滞留。
    pub fn set_surface(&self, handle: Option<SurfaceHandle>) {
        if self.destroyed.load(Ordering::SeqCst) {
            debug!("管线已销毁，忽略 set_surface");
            return;
        }
        let (changed, unused) = self.surface.set(handle);
        // 被替换（或被拒绝）的句柄在锁外释放
        drop(unused);
        if changed {
            info!("{} 🖼 Surface 已切换，等待渲染线程重新绑定", log_ctx());
        } else {
            debug!("Surface 未变化，无需重新配置");
        }
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.surface.current()
    }

    pub fn is_surface_reconfigure_needed(&self) -> bool {
        self.surface.is_reconfigure_needed()
    }

    /// 清除重配置标志
    ///
    /// 视频节点按切换序号判断是否需要重新绑定，清除标志不会让节点漏掉切换。
    pub fn clear_surface_reconfigure_needed(&self) {
        self.surface.clear_reconfigure_needed();
    }

    /// 显式持有 Surface 锁
    pub fn lock_surface(&self) -> SurfaceGuard<'_> {
        self.surface.lock()
    }

    /// 设置左右声道音量；已打开的音频节点立即生效，否则在打开时应用
    pub fn set_volume(&self, left: f32, right: f32) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        *self.volume.lock() = StereoVolume::new(left, right);
        debug!("{} 音量设置 左:{} 右:{}", log_ctx(), left, right);

        let slot = self.audio_node.lock();
        if let Some(node) = slot.as_ref() {
            // 重新读取，保证最后一次写入生效
            node.set_volume(*self.volume.lock());
        }
    }

    pub fn volume(&self) -> StereoVolume {
        *self.volume.lock()
    }

    pub fn video_node(&self) -> Option<VideoNode> {
        self.video_node.lock().clone()
    }

    pub fn audio_node(&self) -> Option<AudioNode> {
        self.audio_node.lock().clone()
    }

    pub fn has_video_node(&self) -> bool {
        self.video_node.lock().is_some()
    }

    pub fn has_audio_node(&self) -> bool {
        self.audio_node.lock().is_some()
    }

    /// 关闭视频节点（会话结束），音频不受影响
    pub fn close_video_decoder(&self) {
        if let Some(node) = self.video_node.lock().take() {
            node.destroy();
        }
    }

    /// 关闭音频节点，视频不受影响
    pub fn close_audio_output(&self) {
        if let Some(node) = self.audio_node.lock().take() {
            node.destroy();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// 停止并销毁所有节点，释放 Surface 引用（幂等）
    ///
    /// 可与渲染线程并发调用：销毁节点时会等待正在进行的取帧结束，
    /// 但不会持有 Surface 锁等待。
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("{} 🛑 销毁管线", log_ctx());

        let video = self.video_node.lock().take();
        if let Some(node) = video {
            node.destroy();
        }
        let audio = self.audio_node.lock().take();
        if let Some(node) = audio {
            node.destroy();
        }
        drop(self.surface.release());

        info!("{} ✅ 管线已销毁", log_ctx());
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}
