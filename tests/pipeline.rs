use myy_pipeline::backend::{BufferedAudioFactory, SoftwareVideoFactory};
use myy_pipeline::core::{
    AudioFrame, AudioStreamInfo, BackendResult, CompressedPacket, SampleFormat, VideoCodec,
    VideoFrame, VideoStreamInfo,
};
use myy_pipeline::pipeline::{
    Backends, FallbackPolicy, Pipeline, RenderEvent, RenderLoop, SurfaceHandle,
    VideoDecoderBackend, VideoDecoderFactory, VideoOpenContext,
};
use myy_pipeline::PipelineConfig;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn window(addr: usize) -> SurfaceHandle {
    SurfaceHandle::from_raw(NonNull::new(addr as *mut c_void).unwrap())
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

/// 记录每次绑定到的 Surface 地址
struct RecordingBackend {
    binds: Arc<Mutex<Vec<Option<usize>>>>,
}

impl VideoDecoderBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording-hw"
    }

    fn is_hardware(&self) -> bool {
        true
    }

    fn feed(&mut self, _packet: CompressedPacket) -> BackendResult<()> {
        Ok(())
    }

    fn pull(&mut self) -> BackendResult<Option<VideoFrame>> {
        Ok(None)
    }

    fn rebind_surface(&mut self, surface: Option<&SurfaceHandle>) -> BackendResult<()> {
        self.binds.lock().push(surface.map(|s| s.id().0));
        Ok(())
    }
}

struct RecordingFactory {
    binds: Arc<Mutex<Vec<Option<usize>>>>,
}

impl VideoDecoderFactory for RecordingFactory {
    fn name(&self) -> &str {
        "recording-hw"
    }

    fn create(&self, _ctx: &VideoOpenContext<'_>) -> BackendResult<Box<dyn VideoDecoderBackend>> {
        Ok(Box::new(RecordingBackend {
            binds: self.binds.clone(),
        }))
    }
}

fn software_only(audio: BufferedAudioFactory) -> Backends {
    Backends {
        video: FallbackPolicy::new(Box::new(SoftwareVideoFactory::new())),
        audio: vec![Box::new(audio)],
    }
}

#[test]
fn test_concurrent_surface_swaps_are_never_torn() {
    init_logger();
    let binds = Arc::new(Mutex::new(Vec::new()));
    let mut config = PipelineConfig::default();
    config.hw_codecs.avc = true;
    config.render_poll_interval_ms = 1;

    let backends = Backends {
        video: FallbackPolicy::new(Box::new(SoftwareVideoFactory::new()))
            .with_hardware(Box::new(RecordingFactory { binds: binds.clone() })),
        audio: Vec::new(),
    };
    let pipeline = Arc::new(Pipeline::create(config, backends).unwrap());

    pipeline.set_surface(Some(window(0x1000)));
    let node = pipeline
        .open_video_decoder(&VideoStreamInfo::new(VideoCodec::H264, 1280, 720))
        .unwrap();
    assert!(node.is_hardware());
    node.start().unwrap();

    let mut render = RenderLoop::start(node, Duration::from_millis(1), |_| {});

    let control = {
        let pipeline = pipeline.clone();
        thread::spawn(move || {
            let candidates = [0x1000, 0x2000, 0x3000];
            for i in 0..500 {
                pipeline.set_surface(Some(window(candidates[i % candidates.len()])));
                if i % 50 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            pipeline.set_surface(Some(window(0x9000)));
        })
    };
    control.join().unwrap();

    // 最后一次切换必须被渲染线程消费
    assert!(wait_until(Duration::from_secs(5), || {
        !pipeline.is_surface_reconfigure_needed()
    }));
    render.stop();

    let binds = binds.lock().clone();
    assert!(!binds.is_empty());
    assert_eq!(binds.last().copied(), Some(Some(0x9000)));
    for bound in binds {
        assert!(matches!(
            bound,
            Some(0x1000) | Some(0x2000) | Some(0x3000) | Some(0x9000)
        ));
    }

    pipeline.destroy();
}

#[test]
fn test_raw_stream_end_to_end() {
    init_logger();
    let audio_factory = BufferedAudioFactory::new();
    let sink = audio_factory.sink();
    let pipeline = Pipeline::create(PipelineConfig::default(), software_only(audio_factory)).unwrap();

    let stream = VideoStreamInfo::new(VideoCodec::Raw, 2, 2);
    let video = pipeline.open_video_decoder(&stream).unwrap();
    assert!(!video.is_hardware());
    video.start().unwrap();

    let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
    let mut render = RenderLoop::start(video.clone(), Duration::from_millis(2), move |frame| {
        let _ = frame_tx.send(frame.pts);
    });

    for i in 0..3 {
        video
            .feed(CompressedPacket { pts: i * 40, keyframe: true, data: vec![0; 16] })
            .unwrap();
    }
    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(frame_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(received, vec![0, 40, 80]);

    render.stop();
    let events: Vec<RenderEvent> = render.events().try_iter().collect();
    assert_eq!(events.first(), Some(&RenderEvent::FirstFrame { pts: 0 }));
    assert_eq!(events.last(), Some(&RenderEvent::Stopped { frames: 3 }));

    // 音量在打开前后都能生效
    pipeline.set_volume(0.5, 0.25);
    let audio = pipeline.open_audio_output(&AudioStreamInfo::default()).unwrap();
    audio.start().unwrap();
    audio
        .write(&AudioFrame {
            pts: 0,
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::F32,
            data: vec![1.0, 1.0],
        })
        .unwrap();
    assert_eq!(sink.pop_samples(2), vec![0.5, 0.25]);

    pipeline.set_volume(1.0, 0.0);
    audio
        .write(&AudioFrame {
            pts: 40,
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::F32,
            data: vec![1.0, 1.0],
        })
        .unwrap();
    assert_eq!(sink.pop_samples(2), vec![1.0, 0.0]);

    pipeline.destroy();
}

#[test]
fn test_destroy_stops_running_render_loop() {
    init_logger();
    let pipeline =
        Pipeline::create(PipelineConfig::default(), software_only(BufferedAudioFactory::new()))
            .unwrap();
    let video = pipeline
        .open_video_decoder(&VideoStreamInfo::new(VideoCodec::Raw, 2, 2))
        .unwrap();
    video.start().unwrap();
    let mut render = RenderLoop::start(video, Duration::from_millis(1), |_| {});

    pipeline.destroy();
    assert!(wait_until(Duration::from_secs(5), || render.is_finished()));
    render.stop();

    let events: Vec<RenderEvent> = render.events().try_iter().collect();
    assert_eq!(events.last(), Some(&RenderEvent::Stopped { frames: 0 }));
    assert!(!pipeline.has_video_node());
}

#[test]
fn test_reconfigure_flag_visible_to_control_thread() {
    init_logger();
    let pipeline =
        Pipeline::create(PipelineConfig::default(), software_only(BufferedAudioFactory::new()))
            .unwrap();
    assert!(!pipeline.is_surface_reconfigure_needed());

    pipeline.set_surface(Some(window(0x1000)));
    assert!(pipeline.is_surface_reconfigure_needed());
    {
        let guard = pipeline.lock_surface();
        assert_eq!(guard.handle().map(|h| h.id().0), Some(0x1000));
        assert!(guard.needs_reconfigure());
    }
    pipeline.clear_surface_reconfigure_needed();
    assert!(!pipeline.is_surface_reconfigure_needed());

    // 同一窗口重复设置不会再次置位
    pipeline.set_surface(Some(window(0x1000)));
    assert!(!pipeline.is_surface_reconfigure_needed());

    pipeline.set_surface(None);
    assert!(pipeline.is_surface_reconfigure_needed());
    assert!(pipeline.surface().is_none());
}
