use crate::{
    cli::Cli,
    config::HarnessConfig,
    frame::RawFrame,
    h264_writer::{H264Writer, WriteStats},
    worker::{PipelineSettings, PipelineWorker},
};
use anyhow::{Context, Result};
use std::time::{Duration, Instant};

const START_POLL_INTERVAL: Duration = Duration::from_millis(10);
const WRITER_QUEUE_SIZE: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    pub written: WriteStats,
    pub conversion_time: Duration,
    pub worker_finished: bool,
}

/// Prefill the pipeline, push and pull the striped frames one by one, then
/// send end-of-stream and drain what the encoder still holds.
pub fn run(cli: &Cli, config: &HarnessConfig) -> Result<RunStats> {
    let (width, height) = cli.dimensions()?;

    log::info!(
        "{width}x{height}, quality {} (unused), outfile {} ignored, writing {}",
        cli.quality,
        cli.outfile.display(),
        config.output_path.display()
    );

    let mut frame = RawFrame::load_or_ramp(&cli.rawfile, width, height);
    let settings = PipelineSettings::new(width, height, config)?;

    let mut worker = PipelineWorker::start(settings)?;
    worker.wait_started(START_POLL_INTERVAL)?;

    let frame_duration = config.frame_duration_ns();
    let prefilled = config.prefill_frames;
    let now = Instant::now();

    for i in 0..prefilled {
        worker.push_frame(frame.data(), i * frame_duration)?;
    }

    let mut writer = H264Writer::new(&config.output_path, WRITER_QUEUE_SIZE)?;
    let mut pulled = 0u64;

    for i in 0..config.active_frames {
        frame.draw_stripes(i as u32, config.stripe_spacing);
        worker.push_frame(frame.data(), (i + prefilled) * frame_duration)?;

        log::debug!("get frame!");
        let data = worker
            .pull_frame(config.pull_timeout())
            .with_context(|| format!("pull active frame[{i}] failed"))?;
        writer.write_frame(pulled, data)?;
        pulled += 1;
    }

    let conversion_time = now.elapsed();
    log::info!(
        "{} frames in flight, conversion time: {} ms",
        prefilled + config.active_frames,
        conversion_time.as_millis()
    );

    worker.end_of_stream()?;

    for i in 0..prefilled {
        log::debug!("drain {i}");
        let data = worker
            .pull_frame(config.pull_timeout())
            .with_context(|| format!("drain frame[{i}] failed"))?;
        writer.write_frame(pulled, data)?;
        pulled += 1;
    }

    let written = writer.finish()?;
    let worker_finished =
        worker.wait_finished(config.finish_wait_tries, config.finish_wait_interval());

    Ok(RunStats {
        written,
        conversion_time,
        worker_finished,
    })
}

#[cfg(all(test, feature = "x264"))]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_sample_run_writes_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            output_path: dir.path().join("out.h264"),
            ..Default::default()
        };
        let cli = Cli::parse_from(["h264-harness", "/no/such/frame.raw", "160", "120", "ignored.mp4"]);

        let stats = run(&cli, &config).unwrap();
        assert_eq!(stats.written.frames, 22);
        assert!(stats.worker_finished);

        let data = std::fs::read(&config.output_path).unwrap();
        assert_eq!(data.len() as u64, stats.written.bytes);
        assert!(data.starts_with(&[0, 0, 0, 1]));
    }

    #[test]
    fn test_out_of_range_size_is_rejected() {
        let config = HarnessConfig::default();
        let cli = Cli::parse_from(["h264-harness", "in.raw", "99", "120", "out"]);
        assert!(run(&cli, &config).is_err());
    }
}
