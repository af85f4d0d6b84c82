//! 基于 FFmpeg (ffmpeg-next) 的视频解码节点，软解与硬解共用。
//!
//! 需要启用 `ffmpeg` 特性，并在系统中安装 FFmpeg 开发库：
//! - **macOS**: `brew install ffmpeg`
//! - **Linux**: `apt install libavcodec-dev libavformat-dev libavutil-dev libswscale-dev`

use crate::backend::HWAccelType;
use crate::core::{
    BackendError, BackendResult, CompressedPacket, PixelFormat, SurfaceId, VideoCodec, VideoFrame,
    VideoStreamInfo,
};
use crate::pipeline::{SurfaceHandle, VideoDecoderBackend};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, ffi, software, util};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::ptr;

fn codec_id(codec: VideoCodec) -> codec::Id {
    match codec {
        VideoCodec::H264 => codec::Id::H264,
        VideoCodec::Hevc => codec::Id::HEVC,
        VideoCodec::Mpeg2 => codec::Id::MPEG2VIDEO,
        VideoCodec::Vp8 => codec::Id::VP8,
        VideoCodec::Vp9 => codec::Id::VP9,
        VideoCodec::Av1 => codec::Id::AV1,
        VideoCodec::Raw => codec::Id::RAWVIDEO,
    }
}

/// 检查 FFmpeg 是否编译了指定的硬件设备类型
pub(crate) fn is_device_type_compiled(wanted: ffi::AVHWDeviceType) -> bool {
    let mut current = ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;
    loop {
        current = unsafe { ffi::av_hwdevice_iterate_types(current) };
        if current == ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            return false;
        }
        if current == wanted {
            return true;
        }
    }
}

/// 硬件设备上下文（RAII）
struct HwDeviceCtx {
    ptr: *mut ffi::AVBufferRef,
}

impl HwDeviceCtx {
    fn new(hw_type: ffi::AVHWDeviceType) -> BackendResult<Self> {
        let mut hw_device_ctx: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(
                &mut hw_device_ctx,
                hw_type,
                ptr::null(),
                ptr::null_mut(),
                0,
            )
        };
        if ret < 0 || hw_device_ctx.is_null() {
            return Err(BackendError::ResourceExhausted(format!(
                "创建硬件设备上下文失败: {:?} ({})",
                hw_type, ret
            )));
        }
        Ok(Self { ptr: hw_device_ctx })
    }
}

impl Drop for HwDeviceCtx {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { ffi::av_buffer_unref(&mut self.ptr) };
        }
    }
}

/// FFmpeg 视频解码节点
pub struct FfmpegVideoDecoder {
    name: String,
    decoder: codec::decoder::Video,
    scaler: Option<software::scaling::Context>,
    time_base: f64,
    hw_device: Option<HwDeviceCtx>,
    surface: Option<SurfaceId>,
    pending: VecDeque<VideoFrame>,
}

// SwsContext / AVBufferRef 不是 Send，但节点只会被持有节点锁的单个线程访问
unsafe impl Send for FfmpegVideoDecoder {}

impl FfmpegVideoDecoder {
    /// 软件解码
    pub fn open_software(stream: &VideoStreamInfo) -> BackendResult<Self> {
        let decoder = Self::open_decoder(stream, None)?;
        debug!(
            "FFmpeg 软解: {} {}x{}",
            stream.codec.name(),
            stream.width,
            stream.height
        );
        Ok(Self {
            name: format!("FFmpeg软解-{}", stream.codec.name()),
            decoder,
            scaler: None,
            time_base: stream.time_base,
            hw_device: None,
            surface: None,
            pending: VecDeque::new(),
        })
    }

    /// 硬件解码，输出绑定到 `surface`
    ///
    /// 任一步失败都会在返回前释放已创建的设备上下文。
    pub fn open_hardware(
        stream: &VideoStreamInfo,
        hw_type: HWAccelType,
        surface: Option<&SurfaceHandle>,
    ) -> BackendResult<Self> {
        let surface = surface
            .map(|s| s.id())
            .ok_or_else(|| BackendError::SurfaceBind("尚未设置 Surface".to_string()))?;
        let device_type = hw_type
            .to_ffmpeg_type()
            .ok_or_else(|| BackendError::Unsupported(hw_type.name().to_string()))?;

        let hw_device = HwDeviceCtx::new(device_type)?;
        let decoder = Self::open_decoder(stream, Some(&hw_device))?;
        info!("✓ 硬件设备上下文创建成功: {}", hw_type.name());

        Ok(Self {
            name: format!("FFmpeg硬解-{}-{}", hw_type.name(), stream.codec.name()),
            decoder,
            scaler: None,
            time_base: stream.time_base,
            hw_device: Some(hw_device),
            surface: Some(surface),
            pending: VecDeque::new(),
        })
    }

    fn open_decoder(
        stream: &VideoStreamInfo,
        hw_device: Option<&HwDeviceCtx>,
    ) -> BackendResult<codec::decoder::Video> {
        ffmpeg::init()?;

        let codec = codec::decoder::find(codec_id(stream.codec)).ok_or_else(|| {
            BackendError::Unsupported(format!("FFmpeg 未编译 {} 解码器", stream.codec.name()))
        })?;
        let mut context = codec::context::Context::new_with_codec(codec);

        unsafe {
            let ctx = context.as_mut_ptr();
            (*ctx).width = stream.width as i32;
            (*ctx).height = stream.height as i32;

            if !stream.extradata.is_empty() {
                let size = stream.extradata.len();
                let padded = size + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
                let buf = ffi::av_mallocz(padded) as *mut u8;
                if buf.is_null() {
                    return Err(BackendError::ResourceExhausted("extradata 分配失败".to_string()));
                }
                ptr::copy_nonoverlapping(stream.extradata.as_ptr(), buf, size);
                (*ctx).extradata = buf;
                (*ctx).extradata_size = size as i32;
            }

            if let Some(hw_device) = hw_device {
                (*ctx).hw_device_ctx = ffi::av_buffer_ref(hw_device.ptr);
            }

            (*ctx).flags |= ffi::AV_CODEC_FLAG_LOW_DELAY as i32;
            (*ctx).thread_count = 4;
        }

        Ok(context.decoder().video()?)
    }

    fn is_hw_frame(frame: &util::frame::Video) -> bool {
        unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() }
    }

    /// 将硬件帧传输到 CPU 内存
    fn transfer_to_cpu(frame: &util::frame::Video) -> BackendResult<util::frame::Video> {
        let mut sw_frame = util::frame::Video::empty();
        let ret = unsafe { ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), frame.as_ptr(), 0) };
        if ret < 0 {
            return Err(BackendError::Platform(format!("硬件帧传输失败: {}", ret)));
        }
        sw_frame.set_pts(frame.pts());
        Ok(sw_frame)
    }

    /// 转换帧格式为 RGBA
    fn convert_frame(&mut self, frame: util::frame::Video) -> BackendResult<VideoFrame> {
        let width = frame.width();
        let height = frame.height();

        if self.scaler.is_none() {
            self.scaler = Some(software::scaling::Context::get(
                frame.format(),
                width,
                height,
                util::format::Pixel::RGBA,
                width,
                height,
                software::scaling::Flags::BILINEAR,
            )?);
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(BackendError::Platform("scaler 未初始化".to_string()));
        };

        let mut rgba_frame = util::frame::Video::empty();
        scaler.run(&frame, &mut rgba_frame)?;

        let pts = frame
            .timestamp()
            .map(|ts| (ts as f64 * self.time_base * 1000.0).round() as i64)
            .unwrap_or(0);

        // 复制数据到连续内存
        let row_size = width as usize * 4;
        let stride = rgba_frame.stride(0);
        let frame_data = rgba_frame.data(0);
        let mut data = Vec::with_capacity(row_size * height as usize);
        for y in 0..height as usize {
            let src_offset = y * stride;
            data.extend_from_slice(&frame_data[src_offset..src_offset + row_size]);
        }

        Ok(VideoFrame {
            pts,
            duration: 0,
            width,
            height,
            format: PixelFormat::RGBA,
            data,
            surface: self.surface,
        })
    }

    fn drain(&mut self) -> BackendResult<()> {
        loop {
            let mut decoded = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let cpu_frame = if Self::is_hw_frame(&decoded) {
                        match Self::transfer_to_cpu(&decoded) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!("{}，跳过该帧", e);
                                continue;
                            }
                        }
                    } else {
                        decoded
                    };
                    let frame = self.convert_frame(cpu_frame)?;
                    self.pending.push_back(frame);
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }
}

impl VideoDecoderBackend for FfmpegVideoDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_hardware(&self) -> bool {
        self.hw_device.is_some()
    }

    fn feed(&mut self, packet: CompressedPacket) -> BackendResult<()> {
        let mut av_packet = ffmpeg::Packet::copy(&packet.data);
        av_packet.set_pts(Some(packet.pts));
        if packet.keyframe {
            av_packet.set_flags(ffmpeg::packet::Flags::KEY);
        }

        match self.decoder.send_packet(&av_packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("解码器收到 EOF（send_packet），执行 flush 并忽略本次包");
                self.decoder.flush();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.drain()
    }

    fn pull(&mut self) -> BackendResult<Option<VideoFrame>> {
        Ok(self.pending.pop_front())
    }

    fn rebind_surface(&mut self, surface: Option<&SurfaceHandle>) -> BackendResult<()> {
        if self.hw_device.is_none() {
            return Ok(());
        }
        let surface = surface
            .ok_or_else(|| BackendError::SurfaceBind("新的 Surface 为空".to_string()))?;
        self.surface = Some(surface.id());
        Ok(())
    }

    fn stop(&mut self) {
        if self.decoder.send_eof().is_ok() {
            if let Err(e) = self.drain() {
                warn!("停止时刷新解码器失败: {}", e);
            }
        }
        self.decoder.flush();
    }

    fn destroy(&mut self) {
        self.pending.clear();
        self.scaler = None;
        self.hw_device = None;
    }
}
