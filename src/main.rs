use anyhow::Result;
use log::{info, warn};
use myy_pipeline::core::{AudioFrame, AudioStreamInfo, CompressedPacket, SampleFormat, VideoCodec, VideoStreamInfo};
use myy_pipeline::{Backends, Pipeline, PipelineConfig, RenderLoop, SurfaceHandle};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 分配一个假的原生窗口，最后一个引用释放时回收
fn demo_window() -> SurfaceHandle {
    let raw = NonNull::from(Box::leak(Box::new(0u8))).cast::<c_void>();
    SurfaceHandle::with_release(raw, |ptr| {
        // 由上面的 Box::leak 分配
        unsafe { drop(Box::from_raw(ptr.cast::<u8>().as_ptr())) };
    })
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("🎬 MYY Pipeline 演示启动");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("加载配置: {}", path);
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };
    let poll_interval = config.render_poll_interval();

    let pipeline = Pipeline::create(config, Backends::platform_default())?;
    pipeline.set_surface(Some(demo_window()));

    let stream = VideoStreamInfo::new(VideoCodec::Raw, 4, 4);
    let video = pipeline.open_video_decoder(&stream)?;
    video.start()?;

    let audio_stream = AudioStreamInfo::default();
    let audio = pipeline.open_audio_output(&audio_stream)?;
    audio.start()?;

    let rendered = Arc::new(AtomicU64::new(0));
    let counter = rendered.clone();
    let mut render = RenderLoop::start(video.clone(), poll_interval, move |frame| {
        counter.fetch_add(1, Ordering::Relaxed);
        log::debug!("渲染帧 pts={} ({}x{})", frame.pts, frame.width, frame.height);
    });

    let frame_size = (stream.width * stream.height * 4) as usize;
    for i in 0..30i64 {
        video.feed(CompressedPacket {
            pts: i * 40,
            keyframe: true,
            data: vec![i as u8; frame_size],
        })?;
        audio.write(&AudioFrame {
            pts: i * 40,
            sample_rate: audio_stream.sample_rate,
            channels: audio_stream.channels,
            format: SampleFormat::F32,
            data: vec![0.1; 1920],
        })?;

        if i == 10 {
            info!("切换 Surface");
            pipeline.set_surface(Some(demo_window()));
        }
        if i == 20 {
            pipeline.set_volume(0.5, 0.8);
        }
        thread::sleep(Duration::from_millis(5));
    }

    thread::sleep(poll_interval * 5);
    render.stop();

    for event in render.events().try_iter() {
        info!("渲染事件: {:?}", event);
    }
    if pipeline.is_surface_reconfigure_needed() {
        warn!("Surface 切换尚未被确认");
    }
    info!("共渲染 {} 帧", rendered.load(Ordering::Relaxed));

    pipeline.destroy();
    Ok(())
}
