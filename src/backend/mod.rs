// 内置后端：硬解探测、软解、音频输出

pub mod hw_decoder;
pub mod software;
pub mod audio_output;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_video;
#[cfg(feature = "cpal-output")]
pub mod cpal_output;

pub use hw_decoder::{HWAccelType, HardwareVideoFactory};
pub use software::{RawVideoDecoder, SoftwareVideoFactory};
pub use audio_output::{AudioSink, BufferedAudioFactory, BufferedAudioOutput};
#[cfg(feature = "cpal-output")]
pub use cpal_output::{CpalAudioFactory, CpalAudioOutput};
