use anyhow::{Context, Result, anyhow, bail};
use crossbeam::channel::{Receiver, Sender, bounded};
use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
};
use video_encoder::EncodedFrame;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub frames: u64,
    pub bytes: u64,
}

/// Appends encoded access units to an elementary stream file from a
/// background thread, in the order they were submitted.
pub struct H264Writer {
    output_path: PathBuf,
    frame_sender: Sender<EncodedFrame>,
    writer_worker: Option<JoinHandle<Result<WriteStats>>>,
}

impl H264Writer {
    /// The file is created before this returns so path problems surface early.
    pub fn new(output_path: &Path, queue_size: usize) -> Result<Self> {
        assert!(queue_size > 0);

        let h264_file = File::create(output_path)
            .with_context(|| format!("create {} failed", output_path.display()))?;
        log::info!("Creating H.264 file: {}", output_path.display());

        let (frame_sender, frame_receiver) = bounded::<EncodedFrame>(queue_size);
        let writer_worker = thread::Builder::new()
            .name("h264-writer".to_string())
            .spawn(move || Self::writer_thread(frame_receiver, h264_file))
            .context("spawn h264 writer thread failed")?;

        Ok(Self {
            output_path: output_path.to_path_buf(),
            frame_sender,
            writer_worker: Some(writer_worker),
        })
    }

    /// Queue one access unit. Blocks while the queue is full. Once the writer
    /// thread has stopped, returns the error that stopped it.
    pub fn write_frame(&mut self, index: u64, data: Vec<u8>) -> Result<()> {
        if self
            .frame_sender
            .send(EncodedFrame::Frame((index, data)))
            .is_err()
        {
            self.join().context("h264 writer thread stopped")?;
            bail!("h264 writer thread exited before frame[{index}]");
        }

        Ok(())
    }

    fn join(&mut self) -> Result<WriteStats> {
        let Some(writer_worker) = self.writer_worker.take() else {
            bail!("h264 writer thread already joined");
        };

        writer_worker
            .join()
            .map_err(|e| anyhow!("join h264 writer thread failed: {e:?}"))?
    }

    fn writer_thread(frame_receiver: Receiver<EncodedFrame>, mut h264_file: File) -> Result<WriteStats> {
        let mut stats = WriteStats::default();

        log::debug!("Writer thread started");

        while let Ok(frame) = frame_receiver.recv() {
            match frame {
                EncodedFrame::Frame((frame_index, frame_data)) => {
                    h264_file
                        .write_all(&frame_data)
                        .with_context(|| format!("write frame[{frame_index}] failed"))?;

                    stats.frames += 1;
                    stats.bytes += frame_data.len() as u64;
                    log::debug!("written frame[{frame_index}] {} bytes", frame_data.len());
                }
                EncodedFrame::Empty(_) => continue,
                EncodedFrame::End => {
                    log::debug!("h264 writer thread received `End` signal");
                    break;
                }
            }
        }

        h264_file.flush()?;
        Ok(stats)
    }

    /// Write everything still queued, close the file and report totals.
    pub fn finish(mut self) -> Result<WriteStats> {
        if self.frame_sender.send(EncodedFrame::End).is_err() {
            log::debug!("h264 writer thread stopped before `End` signal");
        }

        let stats = self.join()?;

        log::info!(
            "Successfully saved H.264 file with {} frames ({} bytes): {}",
            stats.frames,
            stats.bytes,
            self.output_path.display()
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");

        let mut writer = H264Writer::new(&path, 2).unwrap();
        for i in 0..5u8 {
            writer.write_frame(i as u64, vec![i; i as usize + 1]).unwrap();
        }

        let stats = writer.finish().unwrap();
        assert_eq!(stats, WriteStats { frames: 5, bytes: 15 });
        assert_eq!(
            std::fs::read(&path).unwrap(),
            vec![0, 1, 1, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_reports_io_error_of_writer_thread() {
        let mut writer = H264Writer::new(Path::new("/dev/full"), 1).unwrap();

        let mut failed = None;
        for i in 0..64 {
            if let Err(e) = writer.write_frame(i, vec![0; 64 * 1024]) {
                failed = Some(e);
                break;
            }
        }

        let err = match failed {
            Some(e) => e,
            None => writer.finish().unwrap_err(),
        };
        assert!(
            format!("{err:#}").contains("No space left on device"),
            "{err:#}"
        );
    }

    #[test]
    fn test_create_fails_in_missing_dir() {
        assert!(H264Writer::new(Path::new("/no/such/dir/out.h264"), 1).is_err());
    }
}
