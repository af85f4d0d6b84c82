use crate::core::{
    AudioFrame, BackendResult, CompressedPacket, NodeRole, NodeState, PipelineError, Result,
    StereoVolume, VideoFrame,
};
use crate::pipeline::surface::{SurfaceHandle, SurfaceRegistry};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// 视频解码后端（硬解/软解实现此 trait）
pub trait VideoDecoderBackend: Send {
    /// 后端名称（用于日志）
    fn name(&self) -> &str;

    /// 是否直接输出到 Surface
    fn is_hardware(&self) -> bool {
        false
    }

    fn start(&mut self) -> BackendResult<()> {
        Ok(())
    }

    /// 送入一个压缩包
    fn feed(&mut self, packet: CompressedPacket) -> BackendResult<()>;

    /// 取出一帧，没有可用帧时返回 `Ok(None)`
    fn pull(&mut self) -> BackendResult<Option<VideoFrame>>;

    /// 把输出重新绑定到新的 Surface；软解不关心 Surface
    fn rebind_surface(&mut self, _surface: Option<&SurfaceHandle>) -> BackendResult<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    /// 释放后端持有的全部资源
    fn destroy(&mut self) {}
}

/// 音频输出后端
pub trait AudioOutputBackend: Send {
    fn name(&self) -> &str;

    fn start(&mut self) -> BackendResult<()>;

    fn write(&mut self, frame: &AudioFrame) -> BackendResult<()>;

    fn set_stereo_volume(&mut self, volume: StereoVolume);

    fn stop(&mut self) {}

    fn destroy(&mut self) {}
}

/// 节点生命周期状态机
#[derive(Debug)]
pub(crate) struct Lifecycle {
    role: NodeRole,
    state: NodeState,
}

impl Lifecycle {
    pub(crate) fn new(role: NodeRole) -> Self {
        Self {
            role,
            state: NodeState::Created,
        }
    }

    pub(crate) fn state(&self) -> NodeState {
        self.state
    }

    fn invalid(&self, action: &'static str) -> PipelineError {
        PipelineError::InvalidState {
            node: self.role,
            from: self.state,
            action,
        }
    }

    pub(crate) fn require_running(&self, action: &'static str) -> Result<()> {
        if self.state == NodeState::Running {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    pub(crate) fn begin_start(&self) -> Result<()> {
        if self.state == NodeState::Created {
            Ok(())
        } else {
            Err(self.invalid("start"))
        }
    }

    pub(crate) fn set(&mut self, state: NodeState) {
        self.state = state;
    }
}

/// 一次取帧的结果
#[derive(Debug)]
pub struct FramePull {
    pub frame: Option<VideoFrame>,
    /// Surface 重新绑定失败（[`PipelineError::RecoverableBindError`]）；
    /// 此时帧仍按旧绑定输出，切换保持挂起，下次取帧重试
    pub bind_error: Option<PipelineError>,
}

struct VideoNodeInner {
    backend: Box<dyn VideoDecoderBackend>,
    lifecycle: Lifecycle,
    /// 非拥有引用：注册表归管线所有
    surface: Weak<SurfaceRegistry>,
    bound_generation: u64,
    /// 最近一次绑定失败的切换
    failed_generation: Option<u64>,
}

impl VideoNodeInner {
    /// 渲染循环每次取帧前检查 Surface 是否需要重新绑定
    fn reconfigure_if_needed(&mut self) -> Result<()> {
        let Some(registry) = self.surface.upgrade() else {
            return Ok(());
        };
        let Some(pending) = registry.pending_for(self.bound_generation) else {
            return Ok(());
        };

        if pending.generation == self.bound_generation {
            registry.acknowledge(pending.generation);
            return Ok(());
        }

        // 在注册表锁外执行绑定
        match self.backend.rebind_surface(pending.handle.as_ref()) {
            Ok(()) => {
                self.bound_generation = pending.generation;
                self.failed_generation = None;
                if registry.acknowledge(pending.generation) {
                    info!(
                        "🔄 {} 已重新绑定 Surface: {:?}",
                        self.backend.name(),
                        pending.handle
                    );
                } else {
                    debug!("绑定期间 Surface 再次切换，下次取帧时继续处理");
                }
                Ok(())
            }
            Err(e) => {
                // bound_generation 不变，继续按旧绑定出帧
                if self.failed_generation == Some(pending.generation) {
                    debug!("{} 重新绑定 Surface 仍失败: {}", self.backend.name(), e);
                } else {
                    self.failed_generation = Some(pending.generation);
                    warn!("⚠️  {} 重新绑定 Surface 失败: {}", self.backend.name(), e);
                }
                Err(PipelineError::RecoverableBindError {
                    generation: pending.generation,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn shutdown(&mut self) {
        match self.lifecycle.state() {
            NodeState::Destroyed => return,
            NodeState::Running => {
                self.backend.stop();
                self.lifecycle.set(NodeState::Stopped);
            }
            _ => {}
        }
        self.backend.destroy();
        self.lifecycle.set(NodeState::Destroyed);
        info!("🗑 视频节点已销毁: {}", self.backend.name());
    }
}

/// 视频解码节点句柄（可克隆，交给播放引擎驱动）
#[derive(Clone)]
pub struct VideoNode {
    inner: Arc<Mutex<VideoNodeInner>>,
    name: Arc<str>,
    hardware: bool,
}

impl VideoNode {
    pub(crate) fn attach(
        backend: Box<dyn VideoDecoderBackend>,
        surface: Weak<SurfaceRegistry>,
        bound_generation: u64,
    ) -> Self {
        let name: Arc<str> = Arc::from(backend.name());
        let hardware = backend.is_hardware();
        Self {
            inner: Arc::new(Mutex::new(VideoNodeInner {
                backend,
                lifecycle: Lifecycle::new(NodeRole::VideoDecoder),
                surface,
                bound_generation,
                failed_generation: None,
            })),
            name,
            hardware,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_hardware(&self) -> bool {
        self.hardware
    }

    pub fn state(&self) -> NodeState {
        self.inner.lock().lifecycle.state()
    }

    /// Created → Running
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.lifecycle.begin_start()?;
        inner
            .backend
            .start()
            .map_err(|e| PipelineError::DecodeError(e.to_string()))?;
        inner.lifecycle.set(NodeState::Running);
        debug!("▶ 视频节点启动: {}", self.name);
        Ok(())
    }

    pub fn feed(&self, packet: CompressedPacket) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.lifecycle.require_running("feed")?;
        inner
            .backend
            .feed(packet)
            .map_err(|e| PipelineError::DecodeError(e.to_string()))
    }

    /// 取帧；取帧前先处理挂起的 Surface 切换
    ///
    /// 绑定失败不会阻塞取帧：错误随结果一起返回，解码队列照常消耗。
    pub fn pull_frame(&self) -> Result<FramePull> {
        let mut inner = self.inner.lock();
        inner.lifecycle.require_running("pull")?;
        let bind_error = inner.reconfigure_if_needed().err();
        let frame = inner
            .backend
            .pull()
            .map_err(|e| PipelineError::DecodeError(e.to_string()))?;
        Ok(FramePull { frame, bind_error })
    }

    /// Running → Stopped；Created/Stopped 状态下为空操作
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.lifecycle.state() {
            NodeState::Running => {
                inner.backend.stop();
                inner.lifecycle.set(NodeState::Stopped);
                debug!("⏹ 视频节点停止: {}", self.name);
                Ok(())
            }
            NodeState::Created | NodeState::Stopped => {
                inner.lifecycle.set(NodeState::Stopped);
                Ok(())
            }
            NodeState::Destroyed => Err(inner.lifecycle.invalid("stop")),
        }
    }

    /// 停止并销毁（幂等）
    ///
    /// 获取节点锁即等待正在进行的 pull/feed 结束。
    pub fn destroy(&self) {
        self.inner.lock().shutdown();
    }
}

struct AudioNodeInner {
    backend: Box<dyn AudioOutputBackend>,
    lifecycle: Lifecycle,
    volume: StereoVolume,
}

/// 音频输出节点句柄
#[derive(Clone)]
pub struct AudioNode {
    inner: Arc<Mutex<AudioNodeInner>>,
    name: Arc<str>,
}

impl AudioNode {
    /// 包装后端，并立即应用当前音量
    pub(crate) fn attach(mut backend: Box<dyn AudioOutputBackend>, volume: StereoVolume) -> Self {
        backend.set_stereo_volume(volume);
        let name: Arc<str> = Arc::from(backend.name());
        Self {
            inner: Arc::new(Mutex::new(AudioNodeInner {
                backend,
                lifecycle: Lifecycle::new(NodeRole::AudioOutput),
                volume,
            })),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> NodeState {
        self.inner.lock().lifecycle.state()
    }

    pub fn volume(&self) -> StereoVolume {
        self.inner.lock().volume
    }

    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.lifecycle.begin_start()?;
        inner
            .backend
            .start()
            .map_err(|e| PipelineError::AudioError(e.to_string()))?;
        inner.lifecycle.set(NodeState::Running);
        debug!("▶ 音频节点启动: {}", self.name);
        Ok(())
    }

    pub fn write(&self, frame: &AudioFrame) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.lifecycle.require_running("write")?;
        inner
            .backend
            .write(frame)
            .map_err(|e| PipelineError::AudioError(e.to_string()))
    }

    /// 设置音量；节点已销毁时忽略
    pub fn set_volume(&self, volume: StereoVolume) {
        let mut inner = self.inner.lock();
        if inner.lifecycle.state() == NodeState::Destroyed {
            return;
        }
        inner.volume = volume;
        inner.backend.set_stereo_volume(volume);
    }

    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.lifecycle.state() {
            NodeState::Running => {
                inner.backend.stop();
                inner.lifecycle.set(NodeState::Stopped);
                debug!("⏹ 音频节点停止: {}", self.name);
                Ok(())
            }
            NodeState::Created | NodeState::Stopped => {
                inner.lifecycle.set(NodeState::Stopped);
                Ok(())
            }
            NodeState::Destroyed => Err(inner.lifecycle.invalid("stop")),
        }
    }

    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        match inner.lifecycle.state() {
            NodeState::Destroyed => return,
            NodeState::Running => {
                inner.backend.stop();
                inner.lifecycle.set(NodeState::Stopped);
            }
            _ => {}
        }
        inner.backend.destroy();
        inner.lifecycle.set(NodeState::Destroyed);
        info!("🗑 音频节点已销毁: {}", self.name);
    }
}
