use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;

pub const MIN_DIMENSION: i64 = 100;
pub const MAX_DIMENSION: i64 = 4096;
pub const DEFAULT_QUALITY: i64 = 60;

/// Feed raw GRAY8 frames through `appsrc ! videoconvert ! x264enc ! appsink`
/// and write the H.264 byte-stream.
#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about,
    after_help = "Rawfile must be one raw frame of GRAY8. The encoded stream is written to the configured output path (default out.h264)"
)]
pub struct Cli {
    /// One raw GRAY8 frame used as the base picture
    pub rawfile: PathBuf,

    #[arg(allow_negative_numbers = true)]
    pub width: i64,

    #[arg(allow_negative_numbers = true)]
    pub height: i64,

    /// Accepted for compatibility, the stream goes to the configured output path
    pub outfile: PathBuf,

    /// Parsed but not used by the encoder
    #[arg(allow_negative_numbers = true, default_value_t = DEFAULT_QUALITY)]
    pub quality: i64,

    /// TOML file with pipeline tuning
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Validated frame size.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let range = MIN_DIMENSION..=MAX_DIMENSION;
        if !range.contains(&self.width) || !range.contains(&self.height) {
            bail!(
                "width and/or height or quality is bad, not running conversion: {}x{}",
                self.width,
                self.height
            );
        }

        Ok((self.width as u32, self.height as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("h264-harness").chain(args.iter().copied()))
    }

    #[test]
    fn test_four_arguments() {
        let cli = parse(&["in.raw", "640", "480", "out.mp4"]).unwrap();
        assert_eq!(cli.rawfile, PathBuf::from("in.raw"));
        assert_eq!(cli.outfile, PathBuf::from("out.mp4"));
        assert_eq!(cli.quality, DEFAULT_QUALITY);
        assert_eq!(cli.dimensions().unwrap(), (640, 480));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_quality_and_config() {
        let cli = parse(&["in.raw", "640", "480", "out.mp4", "85", "--config", "h.toml"]).unwrap();
        assert_eq!(cli.quality, 85);
        assert_eq!(cli.config, Some(PathBuf::from("h.toml")));
    }

    #[test]
    fn test_argument_count() {
        assert!(parse(&["in.raw", "640", "480"]).is_err());
        assert!(parse(&["in.raw", "640", "480", "out", "60", "extra"]).is_err());
        assert!(parse(&["in.raw", "wide", "480", "out"]).is_err());
    }

    #[test]
    fn test_dimension_range() {
        for (w, h) in [("99", "480"), ("640", "4097"), ("-1", "480"), ("0", "0")] {
            let cli = parse(&["in.raw", w, h, "out"]).unwrap();
            assert!(cli.dimensions().is_err(), "{w}x{h}");
        }

        let cli = parse(&["in.raw", "100", "4096", "out"]).unwrap();
        assert_eq!(cli.dimensions().unwrap(), (100, 4096));
    }
}
