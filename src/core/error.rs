use thiserror::Error;

use crate::core::{NodeRole, NodeState};

/// 管线对外错误（平台错误码在边界处被翻译为以下分类）
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("管线创建失败: {0}")]
    ConstructionFailed(String),

    #[error("没有可用的视频解码器（硬解与软解均失败）")]
    NoDecoderAvailable,

    #[error("没有可用的音频输出")]
    NoOutputAvailable,

    /// 节点继续按旧绑定出帧，下次取帧重试
    #[error("Surface 重新绑定失败（第 {generation} 次切换）: {reason}")]
    RecoverableBindError { generation: u64, reason: String },

    #[error("{node:?} 节点状态 {from:?} 不允许执行 {action}")]
    InvalidState {
        node: NodeRole,
        from: NodeState,
        action: &'static str,
    },

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("管线已销毁")]
    Destroyed,

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("配置解析错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// 后端（工厂/节点）内部错误，不会越过管线边界
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("不支持: {0}")]
    Unsupported(String),

    #[error("Surface 绑定失败: {0}")]
    SurfaceBind(String),

    #[error("资源不足: {0}")]
    ResourceExhausted(String),

    #[error("平台错误: {0}")]
    Platform(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for BackendError {
    fn from(e: ffmpeg_next::Error) -> Self {
        BackendError::Platform(format!("FFmpeg: {}", e))
    }
}
