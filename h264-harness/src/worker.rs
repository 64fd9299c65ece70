use crate::config::HarnessConfig;
use anyhow::{Context, Result, bail};
use media_pipeline::{
    Alignment, AppSink, AppSrc, AppSrcConfig, Buffer, Caps, Format, Fraction, Message, Pipeline,
    State, StreamFormat, VideoConvert, X264Enc, X264EncSettings,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use video_encoder::{PixelFormat, Preset, Profile};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub preset: Preset,
    pub zero_latency: bool,
    pub key_int_max: u32,
    pub appsrc_max_buffers: usize,
}

impl PipelineSettings {
    pub fn new(width: u32, height: u32, config: &HarnessConfig) -> Result<Self> {
        Ok(Self {
            width,
            height,
            fps: config.fps,
            preset: config.encoder.preset()?,
            zero_latency: config.encoder.zero_latency,
            key_int_max: config.encoder.key_int_max,
            appsrc_max_buffers: config.appsrc_max_buffers,
        })
    }

    fn raw_caps(&self) -> Caps {
        Caps::raw_video(
            PixelFormat::Gray8,
            self.width,
            self.height,
            Fraction::new(self.fps, 1),
        )
    }

    fn encoder_settings(&self) -> X264EncSettings {
        // Baseline profile: no B-frames
        X264EncSettings::default()
            .with_preset(self.preset)
            .with_profile(Profile::Baseline)
            .with_zero_latency(self.zero_latency)
            .with_key_int_max(self.key_int_max)
            .with_byte_stream(true)
    }
}

/// Owns the pipeline on a background thread and runs its bus loop until
/// end-of-stream or an error.
pub struct PipelineWorker {
    appsrc: AppSrc,
    appsink: AppSink,
    started: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    pub fn start(settings: PipelineSettings) -> Result<Self> {
        let raw_caps = settings.raw_caps();
        let appsrc = AppSrc::new(
            "mysource",
            AppSrcConfig::new(raw_caps)
                .with_blocksize(PixelFormat::Gray8.frame_size(settings.width, settings.height))
                .with_max_buffers(settings.appsrc_max_buffers)
                .with_format(Format::Time),
        );
        let appsink = AppSink::new("mysink");

        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let handle = {
            let (appsrc, appsink) = (appsrc.clone(), appsink.clone());
            let (started, finished) = (started.clone(), finished.clone());

            thread::Builder::new()
                .name("pipeline".to_string())
                .spawn(move || pipeline_thread(settings, appsrc, appsink, started, finished))
                .context("spawn pipeline thread failed")?
        };

        Ok(Self {
            appsrc,
            appsink,
            started,
            finished,
            handle: Some(handle),
        })
    }

    /// Poll until the pipeline thread is up. Fails when it stopped during setup.
    pub fn wait_started(&self, interval: Duration) -> Result<()> {
        while !self.started.load(Ordering::Acquire) {
            if self.handle.as_ref().is_none_or(|handle| handle.is_finished()) {
                bail!("pipeline thread exited before it started, terminating");
            }

            thread::sleep(interval);
        }

        if self.finished.load(Ordering::Acquire) {
            bail!("pipeline thread could not start, terminating");
        }

        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Poll up to `tries` times for the pipeline thread to finish.
    pub fn wait_finished(&mut self, tries: u32, interval: Duration) -> bool {
        for _ in 0..tries {
            if self.is_finished() {
                if let Some(handle) = self.handle.take()
                    && let Err(e) = handle.join()
                {
                    log::warn!("join pipeline thread failed: {e:?}");
                }
                return true;
            }

            thread::sleep(interval);
        }

        log::warn!("pipeline thread did not finish");
        false
    }

    /// Push exactly one frame. `pts` and `dts` are both set to `pts_ns`.
    pub fn push_frame(&self, data: &[u8], pts_ns: u64) -> Result<()> {
        let buffer = Buffer::from_slice(data).with_pts(pts_ns).with_dts(pts_ns);
        self.appsrc
            .push_buffer(buffer)
            .with_context(|| format!("push buffer pts {pts_ns} failed"))
    }

    /// Wait up to `timeout` for the next encoded access unit.
    pub fn pull_frame(&self, timeout: Duration) -> Result<Vec<u8>> {
        pull_within(&self.appsink, timeout)
    }

    pub fn end_of_stream(&self) -> Result<()> {
        self.appsrc
            .end_of_stream()
            .context("push end of stream failed")
    }
}

fn pull_within(appsink: &AppSink, timeout: Duration) -> Result<Vec<u8>> {
    if let Some(sample) = appsink.try_pull_sample(timeout) {
        return Ok(sample.into_data());
    }

    log::warn!("pull sample returned nothing");
    if appsink.is_eos() {
        bail!("end of stream reached before the frame");
    }

    bail!(
        "no encoded frame within {} ms, the encoder holds more frames than were prefilled or the pipeline stopped",
        timeout.as_millis()
    )
}

fn build_pipeline(settings: &PipelineSettings, appsrc: AppSrc, appsink: AppSink) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new("mypipeline");

    pipeline.add_source(appsrc)?;
    pipeline.link_filtered(VideoConvert::new("myvideoconvert"), Some(settings.raw_caps()))?;
    pipeline.link(X264Enc::new("myx264enc", settings.encoder_settings()))?;
    pipeline.add_sink(
        appsink,
        Some(Caps::h264(StreamFormat::ByteStream, Alignment::Au)),
    )?;

    Ok(pipeline)
}

fn pipeline_thread(
    settings: PipelineSettings,
    appsrc: AppSrc,
    appsink: AppSink,
    started: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
) {
    let mut pipeline = match build_pipeline(&settings, appsrc, appsink) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            log::error!("Could not build pipeline, terminating: {e}");
            finished.store(true, Ordering::Release);
            started.store(true, Ordering::Release);
            return;
        }
    };

    log::info!("Setting pipeline to Playing");
    if let Err(e) = pipeline.set_state(State::Playing) {
        log::error!("Could not start pipeline, terminating: {e}");
        finished.store(true, Ordering::Release);
        started.store(true, Ordering::Release);
        return;
    }

    started.store(true, Ordering::Release);

    let bus = pipeline.bus();
    for message in bus.iter() {
        match message {
            Message::Eos => {
                log::info!("End of stream");
                break;
            }
            Message::Error { source, message } => {
                log::error!("Error from `{source}`: {message}");
                break;
            }
            Message::Warning { source, message } => {
                log::warn!("Warning from `{source}`: {message}");
            }
            Message::StateChanged { old, new } => {
                log::debug!("pipeline state changed {old:?} -> {new:?}");
            }
            Message::StreamStart => log::debug!("stream started"),
        }
    }

    log::info!("Bus loop returned, stopping playback");
    if let Err(e) = pipeline.set_state(State::Null) {
        log::warn!("Stop pipeline failed: {e}");
    }

    log::info!("Deleting pipeline");
    drop(pipeline);

    finished.store(true, Ordering::Release);
}
