use anyhow::{Context, Result, bail};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};
use video_encoder::Preset;

#[derive(Serialize, Deserialize, Debug, Clone, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct HarnessConfig {
    #[derivative(Default(value = "30"))]
    pub fps: u32,

    /// Frames pushed before the first pull
    #[derivative(Default(value = "12"))]
    pub prefill_frames: u64,

    /// Frames pushed and pulled one by one with stripes drawn in
    #[derivative(Default(value = "10"))]
    pub active_frames: u64,

    #[derivative(Default(value = "20"))]
    pub stripe_spacing: u32,

    #[derivative(Default(value = "PathBuf::from(\"out.h264\")"))]
    pub output_path: PathBuf,

    #[derivative(Default(value = "32"))]
    pub appsrc_max_buffers: usize,

    /// Longest wait for one encoded frame before the run is abandoned
    #[derivative(Default(value = "10000"))]
    pub pull_timeout_ms: u64,

    #[derivative(Default(value = "100"))]
    pub finish_wait_tries: u32,

    #[derivative(Default(value = "10"))]
    pub finish_wait_interval_ms: u64,

    pub encoder: Encoder,
}

#[derive(Serialize, Deserialize, Debug, Clone, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct Encoder {
    #[derivative(Default(value = "\"superfast\".to_string()"))]
    pub preset: String,

    /// No lookahead and no frame-thread delay
    #[derivative(Default(value = "true"))]
    pub zero_latency: bool,

    /// `0` leaves the keyframe distance to the encoder
    pub key_int_max: u32,
}

impl HarnessConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = fs::read_to_string(path)
            .with_context(|| format!("read config file {} failed", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parse config file {} failed", path.display()))?;

        config.validate()?;
        log::debug!("loaded config from {}: {config:?}", path.display());

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            bail!("fps must be greater than 0");
        }

        if self.appsrc_max_buffers == 0 {
            bail!("appsrc_max_buffers must be greater than 0");
        }

        if self.pull_timeout_ms == 0 {
            bail!("pull_timeout_ms must be greater than 0");
        }

        self.encoder.preset()?;
        Ok(())
    }

    pub fn frame_duration_ns(&self) -> u64 {
        media_pipeline::SECOND_NS / self.fps as u64
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn finish_wait_interval(&self) -> Duration {
        Duration::from_millis(self.finish_wait_interval_ms)
    }
}

impl Encoder {
    pub fn preset(&self) -> Result<Preset> {
        let preset = match self.preset.to_lowercase().as_str() {
            "ultrafast" => Preset::Ultrafast,
            "superfast" => Preset::Superfast,
            "veryfast" => Preset::Veryfast,
            "faster" => Preset::Faster,
            "fast" => Preset::Fast,
            "medium" => Preset::Medium,
            "slow" => Preset::Slow,
            "slower" => Preset::Slower,
            "veryslow" => Preset::Veryslow,
            other => bail!("unknown encoder preset `{other}`"),
        };

        Ok(preset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_matches_sample_run() {
        let config = HarnessConfig::load(None).unwrap();
        assert_eq!(config.fps, 30);
        assert_eq!(config.prefill_frames, 12);
        assert_eq!(config.active_frames, 10);
        assert_eq!(config.stripe_spacing, 20);
        assert_eq!(config.output_path, PathBuf::from("out.h264"));
        assert_eq!(config.frame_duration_ns(), 33_333_333);
        assert_eq!(config.pull_timeout(), Duration::from_secs(10));
        assert_eq!(config.finish_wait_tries, 100);
        assert_eq!(config.finish_wait_interval(), Duration::from_millis(10));
        assert_eq!(config.encoder.preset().unwrap(), Preset::Superfast);
        assert!(config.encoder.zero_latency);
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "prefill_frames = 4\noutput_path = \"/tmp/x.h264\"\n\n[encoder]\npreset = \"Medium\"\nzero_latency = false"
        )
        .unwrap();

        let config = HarnessConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.prefill_frames, 4);
        assert_eq!(config.active_frames, 10);
        assert_eq!(config.output_path, PathBuf::from("/tmp/x.h264"));
        assert_eq!(config.encoder.preset().unwrap(), Preset::Medium);
        assert!(!config.encoder.zero_latency);
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fps = 0").unwrap();
        assert!(HarnessConfig::load(Some(file.path())).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pull_timeout_ms = 0").unwrap();
        assert!(HarnessConfig::load(Some(file.path())).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[encoder]\npreset = \"warp\"").unwrap();
        assert!(HarnessConfig::load(Some(file.path())).is_err());

        assert!(HarnessConfig::load(Some(Path::new("/no/such/harness.toml"))).is_err());
    }
}
