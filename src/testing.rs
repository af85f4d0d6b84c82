//! 单元测试共用的假后端与假窗口

use crate::backend::HWAccelType;
use crate::core::{
    AudioFrame, BackendError, BackendResult, CompressedPacket, PixelFormat, StereoVolume,
    VideoFrame,
};
use crate::pipeline::{
    AudioOpenContext, AudioOutputBackend, AudioOutputFactory, CodecQuery, SurfaceHandle,
    VideoDecoderBackend, VideoDecoderFactory, VideoOpenContext,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 以给定地址伪造一个原生窗口
pub fn fake_window(addr: usize) -> SurfaceHandle {
    SurfaceHandle::from_raw(NonNull::new(addr as *mut c_void).expect("non-null address"))
}

#[derive(Default)]
struct VideoState {
    queue: VecDeque<CompressedPacket>,
    stops: usize,
    destroys: usize,
    binds: Vec<Option<usize>>,
    fail_binds: bool,
}

/// 可观察的假视频后端
pub struct MockVideo {
    name: String,
    hardware: bool,
    state: Arc<Mutex<VideoState>>,
    live: Option<Arc<AtomicUsize>>,
}

#[derive(Clone)]
pub struct VideoStats {
    state: Arc<Mutex<VideoState>>,
}

impl VideoStats {
    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn destroys(&self) -> usize {
        self.state.lock().destroys
    }

    pub fn binds(&self) -> Vec<Option<usize>> {
        self.state.lock().binds.clone()
    }

    pub fn fail_binds(&self, fail: bool) {
        self.state.lock().fail_binds = fail;
    }
}

impl MockVideo {
    pub fn new(name: &str, hardware: bool) -> (Self, VideoStats) {
        let state = Arc::new(Mutex::new(VideoState::default()));
        (
            Self {
                name: name.to_string(),
                hardware,
                state: state.clone(),
                live: None,
            },
            VideoStats { state },
        )
    }
}

impl VideoDecoderBackend for MockVideo {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_hardware(&self) -> bool {
        self.hardware
    }

    fn feed(&mut self, packet: CompressedPacket) -> BackendResult<()> {
        self.state.lock().queue.push_back(packet);
        Ok(())
    }

    fn pull(&mut self) -> BackendResult<Option<VideoFrame>> {
        Ok(self.state.lock().queue.pop_front().map(|packet| VideoFrame {
            pts: packet.pts,
            duration: 0,
            width: 2,
            height: 2,
            format: PixelFormat::RGBA,
            data: packet.data,
            surface: None,
        }))
    }

    fn rebind_surface(&mut self, surface: Option<&SurfaceHandle>) -> BackendResult<()> {
        if !self.hardware {
            return Ok(());
        }
        let mut state = self.state.lock();
        if state.fail_binds {
            return Err(BackendError::SurfaceBind("scripted bind failure".to_string()));
        }
        state.binds.push(surface.map(|s| s.id().0));
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().stops += 1;
    }

    fn destroy(&mut self) {
        self.state.lock().destroys += 1;
        if let Some(live) = self.live.take() {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// 可观察的假音频后端
pub struct MockAudio {
    name: String,
    volume: Arc<Mutex<Option<StereoVolume>>>,
}

#[derive(Clone)]
pub struct AudioStats {
    volume: Arc<Mutex<Option<StereoVolume>>>,
}

impl AudioStats {
    pub fn volume(&self) -> Option<StereoVolume> {
        *self.volume.lock()
    }
}

impl MockAudio {
    pub fn new(name: &str) -> (Self, AudioStats) {
        let volume = Arc::new(Mutex::new(None));
        (
            Self {
                name: name.to_string(),
                volume: volume.clone(),
            },
            AudioStats { volume },
        )
    }
}

impl AudioOutputBackend for MockAudio {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn write(&mut self, _frame: &AudioFrame) -> BackendResult<()> {
        Ok(())
    }

    fn set_stereo_volume(&mut self, volume: StereoVolume) {
        *self.volume.lock() = Some(volume);
    }
}

#[derive(Default)]
struct FactoryState {
    attempts: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live_at_create: AtomicUsize,
    last_surface: Mutex<Option<usize>>,
}

/// 按脚本成功或失败的视频工厂
pub struct ScriptedVideoFactory {
    name: String,
    hardware: bool,
    working: bool,
    state: Arc<FactoryState>,
}

#[derive(Clone)]
pub struct FactoryStats {
    state: Arc<FactoryState>,
}

impl FactoryStats {
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn max_live_at_create(&self) -> usize {
        self.state.max_live_at_create.load(Ordering::SeqCst)
    }

    pub fn last_surface(&self) -> Option<usize> {
        *self.state.last_surface.lock()
    }
}

impl ScriptedVideoFactory {
    pub fn working(name: &str, hardware: bool) -> Self {
        Self {
            name: name.to_string(),
            hardware,
            working: true,
            state: Arc::new(FactoryState::default()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hardware: false,
            working: false,
            state: Arc::new(FactoryState::default()),
        }
    }

    pub fn stats(&self) -> FactoryStats {
        FactoryStats {
            state: self.state.clone(),
        }
    }
}

impl VideoDecoderFactory for ScriptedVideoFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, ctx: &VideoOpenContext<'_>) -> BackendResult<Box<dyn VideoDecoderBackend>> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.working {
            return Err(BackendError::Unsupported(format!("{} scripted failure", self.name)));
        }
        if self.hardware {
            if let Some(selector) = &ctx.codec_selector {
                let query = CodecQuery {
                    codec: ctx.stream.codec,
                    width: ctx.stream.width,
                    height: ctx.stream.height,
                    hwaccel: HWAccelType::VAAPI,
                };
                if !selector(&query) {
                    return Err(BackendError::Unsupported("selector rejected".to_string()));
                }
            }
        }

        let live_now = self.state.live.load(Ordering::SeqCst);
        self.state.max_live_at_create.fetch_max(live_now, Ordering::SeqCst);
        *self.state.last_surface.lock() = ctx.surface.as_ref().map(|s| s.id().0);
        self.state.live.fetch_add(1, Ordering::SeqCst);

        let (mut backend, _) = MockVideo::new(&self.name, self.hardware);
        backend.live = Some(self.state.live.clone());
        Ok(Box::new(backend))
    }
}

/// 按脚本成功或失败的音频工厂
pub struct ScriptedAudioFactory {
    name: String,
    working: bool,
    volume: Arc<Mutex<Option<StereoVolume>>>,
}

impl ScriptedAudioFactory {
    pub fn working(name: &str) -> Self {
        Self {
            name: name.to_string(),
            working: true,
            volume: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            working: false,
            volume: Arc::new(Mutex::new(None)),
        }
    }

    pub fn stats(&self) -> AudioStats {
        AudioStats {
            volume: self.volume.clone(),
        }
    }
}

impl AudioOutputFactory for ScriptedAudioFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _ctx: &AudioOpenContext<'_>) -> BackendResult<Box<dyn AudioOutputBackend>> {
        if !self.working {
            return Err(BackendError::Platform(format!("{} scripted failure", self.name)));
        }
        Ok(Box::new(MockAudio {
            name: self.name.clone(),
            volume: self.volume.clone(),
        }))
    }
}
