use crate::core::{BackendError, BackendResult};
use crate::pipeline::{CodecQuery, VideoDecoderBackend, VideoDecoderFactory, VideoOpenContext};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// 硬件解码器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HWAccelType {
    None,           // CPU 软解
    DXVA2,          // Windows DirectX Video Acceleration 2
    D3D11VA,        // Windows Direct3D 11 (推荐)
    VAAPI,          // Linux Video Acceleration API
    VideoToolbox,   // macOS VideoToolbox
    CUDA,           // NVIDIA CUDA
    QSV,            // Intel Quick Sync Video
}

impl HWAccelType {
    /// 获取硬件类型名称
    pub fn name(&self) -> &'static str {
        match self {
            HWAccelType::None => "CPU软解",
            HWAccelType::DXVA2 => "DXVA2",
            HWAccelType::D3D11VA => "D3D11VA",
            HWAccelType::VAAPI => "VAAPI",
            HWAccelType::VideoToolbox => "VideoToolbox",
            HWAccelType::CUDA => "CUDA",
            HWAccelType::QSV => "QSV",
        }
    }

    /// 检测系统支持的硬件加速类型（按优先级排序，不含 None）
    pub fn detect_available() -> Vec<HWAccelType> {
        let mut available = Vec::new();

        info!("开始检测硬件加速支持...");

        // Windows 平台：D3D11VA 优先，DXVA2 作为备选
        #[cfg(target_os = "windows")]
        {
            available.push(HWAccelType::D3D11VA);
            available.push(HWAccelType::DXVA2);
        }

        #[cfg(target_os = "macos")]
        available.push(HWAccelType::VideoToolbox);

        #[cfg(target_os = "linux")]
        available.push(HWAccelType::VAAPI);

        // 跨平台硬件加速
        #[cfg(feature = "hwaccel-cuda")]
        available.push(HWAccelType::CUDA);

        #[cfg(feature = "hwaccel-qsv")]
        available.push(HWAccelType::QSV);

        available.retain(|hw_type| Self::check_support(*hw_type));

        if available.is_empty() {
            warn!("未检测到硬件加速支持，将使用 CPU 软解");
        } else {
            info!("共检测到 {} 种硬件加速方式: {:?}", available.len(), available);
        }

        available
    }

    /// 检查 FFmpeg 是否编译了该硬件加速支持
    fn check_support(hw_type: HWAccelType) -> bool {
        #[cfg(feature = "ffmpeg")]
        {
            match hw_type.to_ffmpeg_type() {
                Some(ffmpeg_type) => {
                    debug!("检查硬件类型: {:?}", ffmpeg_type);
                    crate::backend::ffmpeg_video::is_device_type_compiled(ffmpeg_type)
                }
                None => false,
            }
        }
        #[cfg(not(feature = "ffmpeg"))]
        {
            debug!("未启用 ffmpeg，跳过 {}（只能由外部工厂提供）", hw_type.name());
            false
        }
    }

    /// 转换为 FFmpeg 硬件设备类型
    #[cfg(feature = "ffmpeg")]
    pub fn to_ffmpeg_type(&self) -> Option<ffmpeg_next::ffi::AVHWDeviceType> {
        use ffmpeg_next::ffi::AVHWDeviceType::*;
        match self {
            HWAccelType::None => None,
            HWAccelType::DXVA2 => Some(AV_HWDEVICE_TYPE_DXVA2),
            HWAccelType::D3D11VA => Some(AV_HWDEVICE_TYPE_D3D11VA),
            HWAccelType::VAAPI => Some(AV_HWDEVICE_TYPE_VAAPI),
            HWAccelType::VideoToolbox => Some(AV_HWDEVICE_TYPE_VIDEOTOOLBOX),
            HWAccelType::CUDA => Some(AV_HWDEVICE_TYPE_CUDA),
            HWAccelType::QSV => Some(AV_HWDEVICE_TYPE_QSV),
        }
    }
}

/// 硬件解码工厂（一个工厂对应一种硬件加速 API）
///
/// 创建前依次检查：硬解开关、固定的硬件类型、选择回调、Surface。
pub struct HardwareVideoFactory {
    hw_type: HWAccelType,
    name: String,
}

impl HardwareVideoFactory {
    pub fn new(hw_type: HWAccelType) -> Self {
        Self {
            hw_type,
            name: format!("硬解-{}", hw_type.name()),
        }
    }

    /// 为每种探测到的硬件 API 创建一个工厂
    pub fn detected() -> Vec<Self> {
        HWAccelType::detect_available()
            .into_iter()
            .map(Self::new)
            .collect()
    }

    pub fn hw_type(&self) -> HWAccelType {
        self.hw_type
    }

    fn precheck(&self, ctx: &VideoOpenContext<'_>) -> BackendResult<()> {
        let codec = ctx.stream.codec;
        if !ctx.flags.allows(codec) {
            return Err(BackendError::Unsupported(format!(
                "硬解开关未包含 {}",
                codec.name()
            )));
        }

        if let Some(preferred) = ctx.preferred_hwaccel {
            if preferred != self.hw_type {
                return Err(BackendError::Unsupported(format!(
                    "配置固定使用 {}",
                    preferred.name()
                )));
            }
        }

        if let Some(selector) = &ctx.codec_selector {
            let query = CodecQuery {
                codec,
                width: ctx.stream.width,
                height: ctx.stream.height,
                hwaccel: self.hw_type,
            };
            if !selector(&query) {
                return Err(BackendError::Unsupported("选择回调拒绝了该硬件路径".to_string()));
            }
        }

        if ctx.surface.is_none() {
            return Err(BackendError::SurfaceBind("尚未设置 Surface".to_string()));
        }

        Ok(())
    }
}

impl VideoDecoderFactory for HardwareVideoFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, ctx: &VideoOpenContext<'_>) -> BackendResult<Box<dyn VideoDecoderBackend>> {
        self.precheck(ctx)?;

        #[cfg(feature = "ffmpeg")]
        {
            let decoder = crate::backend::ffmpeg_video::FfmpegVideoDecoder::open_hardware(
                ctx.stream,
                self.hw_type,
                ctx.surface.as_ref(),
            )?;
            Ok(Box::new(decoder))
        }
        #[cfg(not(feature = "ffmpeg"))]
        {
            Err(BackendError::Unsupported(format!(
                "{} 需要启用 ffmpeg 特性",
                self.hw_type.name()
            )))
        }
    }
}
