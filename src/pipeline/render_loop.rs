use crate::core::{PipelineError, VideoFrame};
use crate::pipeline::node::VideoNode;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use std::process;
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 渲染线程命令
pub enum RenderCommand {
    Stop,
}

/// 渲染线程事件
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// 第一帧已送出
    FirstFrame { pts: i64 },
    /// Surface 重新绑定失败，节点仍按旧绑定出帧（调用方可选择重新打开解码器）
    ///
    /// 同一次切换只报告一次。
    BindFailed(String),
    /// 解码错误（已跳过）
    DecodeError(String),
    /// 线程退出
    Stopped { frames: u64 },
}

/// 渲染线程管理器
/// - 循环从视频节点取帧并交给 sink，取帧前由节点自行处理 Surface 切换
/// - 没有帧时按轮询间隔等待命令，Stop 可以立即打断等待
/// - 节点被销毁后自动退出
pub struct RenderLoop {
    thread_handle: Option<JoinHandle<()>>,
    command_tx: Sender<RenderCommand>,
    events: Receiver<RenderEvent>,
}

impl RenderLoop {
    /// 事件通道容量；最后一格留给 Stopped，其余事件满了之后丢弃
    const EVENT_CAPACITY: usize = 64;

    pub fn start<F>(node: VideoNode, poll_interval: Duration, sink: F) -> Self
    where
        F: FnMut(VideoFrame) + Send + 'static,
    {
        let (command_tx, command_rx) = unbounded::<RenderCommand>();
        let (event_tx, event_rx) = bounded::<RenderEvent>(Self::EVENT_CAPACITY);

        let thread_handle = thread::spawn(move || {
            Self::render_loop(node, poll_interval, sink, command_rx, event_tx);
        });

        Self {
            thread_handle: Some(thread_handle),
            command_tx,
            events: event_rx,
        }
    }

    fn emit(event_tx: &Sender<RenderEvent>, event: RenderEvent) {
        if event_tx.len() + 1 >= Self::EVENT_CAPACITY {
            debug!("渲染事件通道已满，丢弃事件: {:?}", event);
            return;
        }
        let _ = event_tx.try_send(event);
    }

    fn render_loop<F>(
        node: VideoNode,
        poll_interval: Duration,
        mut sink: F,
        command_rx: Receiver<RenderCommand>,
        event_tx: Sender<RenderEvent>,
    ) where
        F: FnMut(VideoFrame),
    {
        info!("{} 🎬 渲染线程启动: {}", log_ctx(), node.name());

        let mut frames: u64 = 0;
        // 已报告过绑定失败的切换
        let mut reported_generation: Option<u64> = None;

        loop {
            if let Ok(RenderCommand::Stop) = command_rx.try_recv() {
                info!("{} ⏹ 渲染线程收到停止命令", log_ctx());
                break;
            }

            let idle = match node.pull_frame() {
                Ok(pull) => {
                    if let Some(PipelineError::RecoverableBindError { generation, reason }) =
                        pull.bind_error
                    {
                        if reported_generation != Some(generation) {
                            reported_generation = Some(generation);
                            Self::emit(&event_tx, RenderEvent::BindFailed(reason));
                        }
                    }
                    match pull.frame {
                        Some(frame) => {
                            if frames == 0 {
                                Self::emit(&event_tx, RenderEvent::FirstFrame { pts: frame.pts });
                            }
                            frames += 1;
                            sink(frame);
                            false
                        }
                        None => true,
                    }
                }
                Err(PipelineError::DecodeError(reason)) => {
                    warn!("{} 解码错误（已跳过）: {}", log_ctx(), reason);
                    Self::emit(&event_tx, RenderEvent::DecodeError(reason));
                    true
                }
                Err(PipelineError::InvalidState { from, .. }) => {
                    info!("{} 视频节点已不可用 ({:?})，渲染线程退出", log_ctx(), from);
                    break;
                }
                Err(e) => {
                    error!("{} ❌ 渲染线程异常退出: {}", log_ctx(), e);
                    break;
                }
            };

            if idle {
                // 不忙等：等待命令或轮询间隔
                match command_rx.recv_timeout(poll_interval) {
                    Ok(RenderCommand::Stop) | Err(RecvTimeoutError::Disconnected) => {
                        info!("{} ⏹ 渲染线程收到停止命令", log_ctx());
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        }

        info!("{} 🛑 渲染线程退出（共输出 {} 帧）", log_ctx(), frames);
        // emit 始终留出一格，这里不会因通道已满而丢失
        if let Err(TrySendError::Full(event)) = event_tx.try_send(RenderEvent::Stopped { frames }) {
            error!("{} 退出事件未能送达: {:?}", log_ctx(), event);
        }
    }

    pub fn events(&self) -> &Receiver<RenderEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// 停止线程并等待退出
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(RenderCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} 渲染线程 panic", log_ctx());
            }
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("{} ⚠ RenderLoop 被 drop，但可能未调用 stop()，正在尝试优雅停止", log_ctx());
            self.stop();
        }
    }
}
