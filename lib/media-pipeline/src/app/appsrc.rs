use crate::{
    Buffer, Caps, POLL_INTERVAL, PipelineError, Result, buffer::StreamItem,
};
use crossbeam::channel::{Receiver, SendTimeoutError, Sender, bounded};
use derive_setters::Setters;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

pub const APPSRC_DEFAULT_MAX_BUFFERS: usize = 32;

/// How the source treats buffer timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Buffers pass through untouched.
    Bytes,

    /// Buffers pushed without a pts are stamped from their position in the
    /// stream and the caps framerate.
    #[default]
    Time,
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct AppSrcConfig {
    #[setters(skip)]
    pub caps: Caps,

    /// Required size of every pushed buffer. Defaults to one frame of `caps`.
    #[setters(strip_option)]
    pub blocksize: Option<usize>,

    pub max_buffers: usize,
    pub format: Format,
}

impl AppSrcConfig {
    pub fn new(caps: Caps) -> Self {
        Self {
            caps,
            blocksize: None,
            max_buffers: APPSRC_DEFAULT_MAX_BUFFERS,
            format: Format::default(),
        }
    }
}

/// Application side entry point of a pipeline.
///
/// `push_buffer` blocks while the queue holds `max_buffers` items.
#[derive(Debug, Clone)]
pub struct AppSrc {
    name: String,
    config: AppSrcConfig,
    blocksize: Option<usize>,
    sender: Sender<StreamItem>,
    receiver: Receiver<StreamItem>,
    frame_duration: Option<u64>,
    pushed: Arc<AtomicU64>,
    eos: Arc<AtomicBool>,
    flushing: Arc<AtomicBool>,
}

impl AppSrc {
    pub fn new(name: impl Into<String>, config: AppSrcConfig) -> Self {
        assert!(config.max_buffers > 0);

        let (sender, receiver) = bounded(config.max_buffers);
        let blocksize = config.blocksize.or_else(|| config.caps.frame_size());
        let frame_duration = config.caps.framerate().and_then(|f| f.frame_duration_ns());

        Self {
            name: name.into(),
            config,
            blocksize,
            sender,
            receiver,
            frame_duration,
            pushed: Arc::new(AtomicU64::new(0)),
            eos: Arc::new(AtomicBool::new(false)),
            flushing: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn caps(&self) -> &Caps {
        &self.config.caps
    }

    pub fn config(&self) -> &AppSrcConfig {
        &self.config
    }

    pub fn blocksize(&self) -> Option<usize> {
        self.blocksize
    }

    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    pub fn push_buffer(&self, mut buffer: Buffer) -> Result<()> {
        if self.eos.load(Ordering::Acquire) {
            return Err(PipelineError::Eos);
        }

        if let Some(blocksize) = self.blocksize
            && buffer.len() != blocksize
        {
            return Err(PipelineError::InvalidBuffer(format!(
                "`{}` expects {blocksize} bytes per buffer, got {}",
                self.name,
                buffer.len()
            )));
        }

        let index = self.pushed.fetch_add(1, Ordering::AcqRel);
        if self.config.format == Format::Time
            && buffer.pts.is_none()
            && let Some(duration) = self.frame_duration
        {
            let pts = index * duration;
            log::debug!("`{}` stamped buffer[{index}] with pts {pts}", self.name);

            buffer.pts = Some(pts);
            buffer.dts = buffer.dts.or(Some(pts));
            buffer.duration = buffer.duration.or(Some(duration));
        }

        self.send(StreamItem::Buffer(buffer))
    }

    /// Queue end-of-stream. Later pushes fail with `Eos`.
    pub fn end_of_stream(&self) -> Result<()> {
        if self.eos.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::Eos);
        }

        log::info!("`{}` end of stream", self.name);
        self.send(StreamItem::Eos)
    }

    fn send(&self, mut item: StreamItem) -> Result<()> {
        loop {
            if self.flushing.load(Ordering::Acquire) {
                return Err(PipelineError::Flushing);
            }

            match self.sender.send_timeout(item, POLL_INTERVAL) {
                Ok(_) => return Ok(()),
                Err(SendTimeoutError::Timeout(v)) => item = v,
                Err(SendTimeoutError::Disconnected(_)) => return Err(PipelineError::Flushing),
            }
        }
    }

    pub(crate) fn receiver(&self) -> Receiver<StreamItem> {
        self.receiver.clone()
    }

    pub(crate) fn set_flushing(&self, flushing: bool) {
        self.flushing.store(flushing, Ordering::Release);
    }

    /// Drop stale items and accept data again.
    pub(crate) fn reset(&self) {
        while self.receiver.try_recv().is_ok() {}
        self.pushed.store(0, Ordering::Release);
        self.eos.store(false, Ordering::Release);
        self.flushing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fraction;
    use video_encoder::PixelFormat;

    fn gray_src() -> AppSrc {
        let caps = Caps::raw_video(PixelFormat::Gray8, 4, 2, Fraction::new(30, 1));
        let src = AppSrc::new("src", AppSrcConfig::new(caps).with_max_buffers(4));
        src.reset();
        src
    }

    #[test]
    fn test_blocksize_from_caps() {
        let src = gray_src();
        assert_eq!(src.blocksize(), Some(8));

        let err = src.push_buffer(Buffer::from_vec(vec![0; 7])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidBuffer(_)));

        src.push_buffer(Buffer::from_vec(vec![0; 8]).with_pts(0))
            .unwrap();
        assert_eq!(src.queued(), 1);
    }

    fn pts_of(item: StreamItem) -> Option<u64> {
        match item {
            StreamItem::Buffer(buffer) => buffer.pts,
            StreamItem::Eos => panic!("unexpected eos"),
        }
    }

    #[test]
    fn test_time_format_stamps_missing_pts() {
        let src = gray_src();
        let receiver = src.receiver();

        src.push_buffer(Buffer::from_vec(vec![0; 8])).unwrap();
        src.push_buffer(Buffer::from_vec(vec![0; 8]).with_pts(7)).unwrap();
        src.push_buffer(Buffer::from_vec(vec![0; 8])).unwrap();

        assert_eq!(pts_of(receiver.recv().unwrap()), Some(0));
        assert_eq!(pts_of(receiver.recv().unwrap()), Some(7));
        assert_eq!(pts_of(receiver.recv().unwrap()), Some(2 * 33_333_333));
    }

    #[test]
    fn test_bytes_format_keeps_buffers_untouched() {
        let caps = Caps::raw_video(PixelFormat::Gray8, 4, 2, Fraction::new(30, 1));
        let src = AppSrc::new(
            "src",
            AppSrcConfig::new(caps)
                .with_max_buffers(4)
                .with_format(Format::Bytes),
        );
        src.reset();

        src.push_buffer(Buffer::from_vec(vec![0; 8])).unwrap();
        assert_eq!(pts_of(src.receiver().recv().unwrap()), None);
    }

    #[test]
    fn test_push_after_eos() {
        let src = gray_src();
        src.end_of_stream().unwrap();

        assert!(matches!(src.end_of_stream(), Err(PipelineError::Eos)));
        assert!(matches!(
            src.push_buffer(Buffer::from_vec(vec![0; 8])),
            Err(PipelineError::Eos)
        ));
    }

    #[test]
    fn test_push_when_not_playing() {
        let caps = Caps::raw_video(PixelFormat::Gray8, 4, 2, Fraction::new(30, 1));
        let src = AppSrc::new("src", AppSrcConfig::new(caps));
        assert!(matches!(
            src.push_buffer(Buffer::from_vec(vec![0; 8])),
            Err(PipelineError::Flushing)
        ));
    }

    #[test]
    fn test_full_queue_unblocks_on_flush() {
        let src = gray_src();
        for _ in 0..4 {
            src.push_buffer(Buffer::from_vec(vec![0; 8])).unwrap();
        }

        let pusher = {
            let src = src.clone();
            std::thread::spawn(move || src.push_buffer(Buffer::from_vec(vec![0; 8])))
        };

        std::thread::sleep(POLL_INTERVAL * 2);
        src.set_flushing(true);

        assert!(matches!(
            pusher.join().unwrap(),
            Err(PipelineError::Flushing)
        ));
    }
}
