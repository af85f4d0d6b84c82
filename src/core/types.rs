use serde::{Deserialize, Serialize};

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
}

/// 视频编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
    Mpeg2,
    Vp8,
    Vp9,
    Av1,
    /// 未压缩 RGBA 帧（每个包即一帧）
    Raw,
}

impl VideoCodec {
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264/AVC",
            VideoCodec::Hevc => "H.265/HEVC",
            VideoCodec::Mpeg2 => "MPEG-2",
            VideoCodec::Vp8 => "VP8",
            VideoCodec::Vp9 => "VP9",
            VideoCodec::Av1 => "AV1",
            VideoCodec::Raw => "RAW",
        }
    }
}

/// 视频流参数（由 demuxer 提供，打开解码器时传入）
#[derive(Debug, Clone)]
pub struct VideoStreamInfo {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    /// 时间基（秒/tick）
    pub time_base: f64,
    /// 编解码器私有数据（SPS/PPS 等）
    pub extradata: Vec<u8>,
}

impl VideoStreamInfo {
    pub fn new(codec: VideoCodec, width: u32, height: u32) -> Self {
        Self {
            codec,
            width,
            height,
            time_base: 1.0 / 1000.0,
            extradata: Vec::new(),
        }
    }
}

/// 音频流参数
#[derive(Debug, Clone, Copy)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioStreamInfo {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// 压缩数据包（送入视频解码节点）
#[derive(Debug, Clone)]
pub struct CompressedPacket {
    pub pts: i64,
    pub keyframe: bool,
    pub data: Vec<u8>,
}

/// Surface 标识（原生窗口指针地址，用于身份比较）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub usize);

/// 视频帧数据
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts: i64,           // 显示时间戳（毫秒）
    pub duration: i64,      // 帧持续时间（毫秒）
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,      // CPU 内存数据
    /// 硬件节点直接输出到的 Surface（软解帧为 None）
    pub surface: Option<SurfaceId>,
}

/// 音频帧数据
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub pts: i64,           // 显示时间戳（毫秒）
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub data: Vec<f32>,     // 统一使用 f32 格式
}

/// 左右声道音量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoVolume {
    pub left: f32,
    pub right: f32,
}

impl StereoVolume {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }

    /// 按声道位置取增益（偶数声道取左，奇数声道取右）
    pub fn gain_for_channel(&self, channel: usize) -> f32 {
        if channel % 2 == 0 {
            self.left
        } else {
            self.right
        }
    }
}

impl Default for StereoVolume {
    fn default() -> Self {
        Self {
            left: 1.0,
            right: 1.0,
        }
    }
}

/// 硬件解码开关（来自配置，会话开始后只读）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityFlags {
    pub all_videos: bool,
    pub avc: bool,
    pub hevc: bool,
    pub mpeg2: bool,
}

impl CapabilityFlags {
    /// 是否开启了任意硬解路径
    pub fn any(&self) -> bool {
        self.all_videos || self.avc || self.hevc || self.mpeg2
    }

    /// 指定编码是否允许走硬解
    pub fn allows(&self, codec: VideoCodec) -> bool {
        if self.all_videos {
            return true;
        }
        match codec {
            VideoCodec::H264 => self.avc,
            VideoCodec::Hevc => self.hevc,
            VideoCodec::Mpeg2 => self.mpeg2,
            _ => false,
        }
    }
}

/// 节点角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    VideoDecoder,
    AudioOutput,
}

/// 节点生命周期：Created → Running → Stopped → Destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Running,
    Stopped,
    Destroyed,
}
