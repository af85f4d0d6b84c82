use crate::backend::HWAccelType;
use crate::core::{CapabilityFlags, PipelineError, Result, StereoVolume};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 管线配置
///
/// 示例（JSON）：
/// ```json
/// {
///   "hw_codecs": { "avc": true, "hevc": true },
///   "volume": { "left": 1.0, "right": 0.8 },
///   "render_poll_interval_ms": 10
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 硬件解码开关
    pub hw_codecs: CapabilityFlags,
    /// 初始音量
    pub volume: StereoVolume,
    /// 渲染线程轮询间隔（毫秒），也是 Surface 切换的最大感知延迟
    pub render_poll_interval_ms: u64,
    /// 固定使用某种硬件加速（None = 自动探测）
    pub preferred_hwaccel: Option<HWAccelType>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            hw_codecs: CapabilityFlags::default(),
            volume: StereoVolume::default(),
            render_poll_interval_ms: 10,
            preferred_hwaccel: None,
        }
    }
}

impl PipelineConfig {
    /// 从 JSON 字符串解析
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        info!("已加载管线配置: {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.volume.is_finite() {
            return Err(PipelineError::Config(format!(
                "音量必须为有限值: {:?}",
                self.volume
            )));
        }
        if self.render_poll_interval_ms == 0 {
            return Err(PipelineError::Config(
                "render_poll_interval_ms 不能为 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn render_poll_interval(&self) -> Duration {
        Duration::from_millis(self.render_poll_interval_ms)
    }
}
