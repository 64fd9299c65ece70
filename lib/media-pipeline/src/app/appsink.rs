use crate::{Caps, POLL_INTERVAL, Sample, buffer::StreamItem};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// Application side exit point of a pipeline. Samples queue up without limit
/// until they are pulled.
#[derive(Debug, Clone)]
pub struct AppSink {
    name: String,
    caps: Arc<Mutex<Option<Caps>>>,
    sender: Sender<StreamItem>,
    receiver: Receiver<StreamItem>,
    eos: Arc<AtomicBool>,
    flushing: Arc<AtomicBool>,
}

impl AppSink {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = unbounded();

        Self {
            name: name.into(),
            caps: Arc::new(Mutex::new(None)),
            sender,
            receiver,
            eos: Arc::new(AtomicBool::new(false)),
            flushing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caps negotiated on the link into the sink.
    pub fn caps(&self) -> Option<Caps> {
        self.caps.lock().ok().and_then(|caps| caps.clone())
    }

    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::Acquire) && self.receiver.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    /// Block until a sample is available. Returns `None` once end-of-stream
    /// was reached, or when the pipeline stopped and nothing is left queued.
    pub fn pull_sample(&self) -> Option<Sample> {
        self.pull(None)
    }

    pub fn try_pull_sample(&self, timeout: Duration) -> Option<Sample> {
        self.pull(Some(Instant::now() + timeout))
    }

    fn pull(&self, deadline: Option<Instant>) -> Option<Sample> {
        if self.eos.load(Ordering::Acquire) {
            return None;
        }

        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let remained = deadline.saturating_duration_since(Instant::now());
                    if remained.is_zero() {
                        return None;
                    }
                    remained.min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            match self.receiver.recv_timeout(wait) {
                Ok(StreamItem::Buffer(buffer)) => {
                    return Some(Sample {
                        buffer,
                        caps: self.caps(),
                    });
                }
                Ok(StreamItem::Eos) => {
                    log::info!("`{}` received end of stream", self.name);
                    self.eos.store(true, Ordering::Release);
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.flushing.load(Ordering::Acquire) {
                        log::debug!("`{}` is flushing, pull returns nothing", self.name);
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    pub(crate) fn render(&self, item: StreamItem) {
        if let Err(e) = self.sender.send(item) {
            log::warn!("`{}` render failed: {e}", self.name);
        }
    }

    pub(crate) fn set_flushing(&self, flushing: bool) {
        self.flushing.store(flushing, Ordering::Release);
    }

    pub(crate) fn reset(&self, caps: Caps) {
        while self.receiver.try_recv().is_ok() {}

        if let Ok(mut current) = self.caps.lock() {
            *current = Some(caps);
        }

        self.eos.store(false, Ordering::Release);
        self.flushing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Alignment, Buffer, StreamFormat};

    fn sink() -> AppSink {
        let sink = AppSink::new("sink");
        sink.reset(Caps::h264(StreamFormat::ByteStream, Alignment::Au));
        sink
    }

    #[test]
    fn test_pull_then_eos() {
        let sink = sink();
        sink.render(StreamItem::Buffer(Buffer::from_vec(vec![1, 2])));
        sink.render(StreamItem::Eos);

        let sample = sink.pull_sample().unwrap();
        assert_eq!(sample.data(), &[1, 2]);
        assert_eq!(
            sample.caps,
            Some(Caps::h264(StreamFormat::ByteStream, Alignment::Au))
        );

        assert!(!sink.is_eos());
        assert!(sink.pull_sample().is_none());
        assert!(sink.is_eos());
        assert!(sink.pull_sample().is_none());
    }

    #[test]
    fn test_flushing_keeps_queued_samples() {
        let sink = sink();
        sink.render(StreamItem::Buffer(Buffer::from_vec(vec![7])));
        sink.set_flushing(true);

        assert_eq!(sink.pull_sample().unwrap().into_data(), vec![7]);
        assert!(sink.pull_sample().is_none());
        assert!(!sink.is_eos());
    }

    #[test]
    fn test_try_pull_timeout() {
        let sink = sink();
        let start = Instant::now();
        assert!(sink.try_pull_sample(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
