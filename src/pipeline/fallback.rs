use crate::core::{PipelineError, Result};
use crate::pipeline::factory::{VideoDecoderFactory, VideoOpenContext};
use crate::pipeline::node::VideoDecoderBackend;
use log::{error, info, warn};

/// 解码层级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderTier {
    Hardware,
    Software,
}

/// 回退策略选出的解码后端
pub struct SelectedDecoder {
    pub backend: Box<dyn VideoDecoderBackend>,
    pub tier: DecoderTier,
}

/// 回退策略：按顺序尝试硬解工厂，全部失败后使用软解
///
/// 硬解失败只记录日志，不会返回给调用方；只有软解也失败时才返回
/// [`PipelineError::NoDecoderAvailable`]。
pub struct FallbackPolicy {
    hardware: Vec<Box<dyn VideoDecoderFactory>>,
    software: Box<dyn VideoDecoderFactory>,
}

impl FallbackPolicy {
    pub fn new(software: Box<dyn VideoDecoderFactory>) -> Self {
        Self {
            hardware: Vec::new(),
            software,
        }
    }

    /// 追加一个硬解层级（按追加顺序尝试）
    pub fn with_hardware(mut self, factory: Box<dyn VideoDecoderFactory>) -> Self {
        self.hardware.push(factory);
        self
    }

    pub fn hardware_tiers(&self) -> usize {
        self.hardware.len()
    }

    pub fn select(&self, ctx: &VideoOpenContext<'_>) -> Result<SelectedDecoder> {
        let codec = ctx.stream.codec;

        if ctx.flags.any() {
            for factory in &self.hardware {
                match factory.create(ctx) {
                    Ok(backend) => {
                        info!("✓ 使用硬件解码: {} ({})", factory.name(), codec.name());
                        return Ok(SelectedDecoder {
                            backend,
                            tier: DecoderTier::Hardware,
                        });
                    }
                    Err(e) => {
                        warn!("✗ 硬解 {} 不可用: {}，尝试下一层级", factory.name(), e);
                    }
                }
            }
        } else {
            info!("未开启硬解开关，直接使用软件解码");
        }

        match self.software.create(ctx) {
            Ok(backend) => {
                info!("✓ 使用软件解码: {} ({})", self.software.name(), codec.name());
                Ok(SelectedDecoder {
                    backend,
                    tier: DecoderTier::Software,
                })
            }
            Err(e) => {
                error!("❌ 软件解码器创建失败: {}", e);
                Err(PipelineError::NoDecoderAvailable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CapabilityFlags, VideoCodec, VideoStreamInfo};
    use crate::testing::ScriptedVideoFactory;

    fn ctx(stream: &VideoStreamInfo, flags: CapabilityFlags) -> VideoOpenContext<'_> {
        VideoOpenContext {
            stream,
            flags,
            surface: None,
            preferred_hwaccel: None,
            codec_selector: None,
        }
    }

    fn avc_flags() -> CapabilityFlags {
        CapabilityFlags {
            avc: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_hardware_failure_falls_back_silently() {
        let hw = ScriptedVideoFactory::failing("hw");
        let sw = ScriptedVideoFactory::working("sw", false);
        let (hw_stats, sw_stats) = (hw.stats(), sw.stats());
        let policy = FallbackPolicy::new(Box::new(sw)).with_hardware(Box::new(hw));

        let stream = VideoStreamInfo::new(VideoCodec::H264, 1280, 720);
        let selected = policy.select(&ctx(&stream, avc_flags())).unwrap();
        assert_eq!(selected.tier, DecoderTier::Software);
        assert_eq!(hw_stats.attempts(), 1);
        assert_eq!(sw_stats.attempts(), 1);
    }

    #[test]
    fn test_no_flags_skips_hardware() {
        let hw = ScriptedVideoFactory::working("hw", true);
        let hw_stats = hw.stats();
        let policy = FallbackPolicy::new(Box::new(ScriptedVideoFactory::working("sw", false)))
            .with_hardware(Box::new(hw));

        let stream = VideoStreamInfo::new(VideoCodec::H264, 1280, 720);
        let selected = policy.select(&ctx(&stream, CapabilityFlags::default())).unwrap();
        assert_eq!(selected.tier, DecoderTier::Software);
        assert_eq!(hw_stats.attempts(), 0);
    }

    #[test]
    fn test_hardware_tiers_tried_in_order() {
        let first = ScriptedVideoFactory::failing("hw-a");
        let second = ScriptedVideoFactory::working("hw-b", true);
        let sw = ScriptedVideoFactory::working("sw", false);
        let sw_stats = sw.stats();
        let policy = FallbackPolicy::new(Box::new(sw))
            .with_hardware(Box::new(first))
            .with_hardware(Box::new(second));

        let stream = VideoStreamInfo::new(VideoCodec::H264, 1920, 1080);
        let selected = policy.select(&ctx(&stream, avc_flags())).unwrap();
        assert_eq!(selected.tier, DecoderTier::Hardware);
        assert_eq!(selected.backend.name(), "hw-b");
        assert_eq!(sw_stats.attempts(), 0);
    }

    #[test]
    fn test_all_tiers_failing_is_no_decoder() {
        let policy = FallbackPolicy::new(Box::new(ScriptedVideoFactory::failing("sw")))
            .with_hardware(Box::new(ScriptedVideoFactory::failing("hw")));
        let stream = VideoStreamInfo::new(VideoCodec::Hevc, 1920, 1080);
        let result = policy.select(&ctx(&stream, CapabilityFlags { all_videos: true, ..Default::default() }));
        assert!(matches!(result, Err(PipelineError::NoDecoderAvailable)));
    }
}
