#[cfg(feature = "x264")]
mod ve_x264;

#[cfg(feature = "openh264")]
mod ve_openh264;

mod color;

pub use color::{I420Frame, PixelFormat, gray8_to_i420, rgb_to_i420};

use derive_setters::Setters;

// Standard video timescale (90kHz) for better compatibility
pub const VIDEO_TIMESCALE: u32 = 90000;

#[derive(thiserror::Error, Debug)]
pub enum EncoderError {
    #[error("Image processing failed: {0}")]
    ImageProcessingFailed(String),

    #[error("Video encoding failed: {0}")]
    VideoEncodingFailed(String),

    #[error("Invalid encoder configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EncoderError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedFrame {
    Empty(u64),
    Frame((u64, Vec<u8>)),
    End,
}

impl Default for EncodedFrame {
    fn default() -> Self {
        EncodedFrame::Empty(0)
    }
}

pub trait VideoEncoder {
    /// Encode one I420 frame. `pts_ns` is the presentation time in nanoseconds.
    ///
    /// Encoders with lookahead may return `EncodedFrame::Empty` for the first
    /// frames; the delayed output comes back from later calls or from `flush`.
    fn encode_frame(&mut self, frame: &I420Frame, pts_ns: u64) -> Result<EncodedFrame>;
    fn headers(&mut self) -> Result<Vec<u8>>;
    fn flush(self: Box<Self>, cb: &mut dyn FnMut(Vec<u8>)) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    Ultrafast,
    #[default]
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tune {
    #[default]
    None,
    Film,
    Animation,
    StillImage,
}

/// H.264 profile. `Baseline` never emits B-frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Baseline,
    Main,
    High,
}

#[derive(Clone, Debug, Setters)]
#[setters(prefix = "with_")]
pub struct VideoEncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps_n: u32,
    pub fps_d: u32,
    pub annexb: bool,
    pub preset: Preset,
    pub tune: Tune,
    pub profile: Profile,
    pub zero_latency: bool,

    /// Maximum distance between keyframes in frames. `0` lets the encoder pick.
    pub keyframe_interval: u32,
}

impl VideoEncoderConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps_n: 30,
            fps_d: 1,
            annexb: true,
            preset: Preset::default(),
            tune: Tune::default(),
            profile: Profile::default(),
            zero_latency: false,
            keyframe_interval: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EncoderError::InvalidConfig(format!(
                "frame size must be non-zero: {}x{}",
                self.width, self.height
            )));
        }

        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(EncoderError::InvalidConfig(format!(
                "I420 needs even dimensions, got {}x{}",
                self.width, self.height
            )));
        }

        if self.fps_n == 0 || self.fps_d == 0 {
            return Err(EncoderError::InvalidConfig(format!(
                "invalid framerate {}/{}",
                self.fps_n, self.fps_d
            )));
        }

        Ok(())
    }

    /// Convert nanoseconds to the encoder timescale.
    pub fn timestamp(pts_ns: u64) -> i64 {
        (pts_ns as u128 * VIDEO_TIMESCALE as u128 / 1_000_000_000) as i64
    }
}

#[cfg(any(feature = "x264", feature = "openh264"))]
pub fn new(config: VideoEncoderConfig) -> Result<Box<dyn VideoEncoder>> {
    config.validate()?;

    #[cfg(feature = "x264")]
    let ve = ve_x264::X264VideoEncoder::new(config)?;

    #[cfg(all(feature = "openh264", not(feature = "x264")))]
    let ve = ve_openh264::OpenH264VideoEncoder::new(config)?;

    Ok(Box::new(ve))
}

#[cfg(not(any(feature = "x264", feature = "openh264")))]
pub fn new(config: VideoEncoderConfig) -> Result<Box<dyn VideoEncoder>> {
    config.validate()?;

    Err(EncoderError::VideoEncodingFailed(
        "no encoder backend compiled in, enable the `x264` or `openh264` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = VideoEncoderConfig::new(640, 480);
        assert_eq!(config.fps_n, 30);
        assert_eq!(config.fps_d, 1);
        assert!(config.annexb);
        assert_eq!(config.profile, Profile::Baseline);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_odd_size() {
        let config = VideoEncoderConfig::new(101, 100);
        assert!(matches!(
            config.validate(),
            Err(EncoderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_rejects_zero_fps() {
        let config = VideoEncoderConfig::new(100, 100).with_fps_n(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timestamp_timescale() {
        assert_eq!(VideoEncoderConfig::timestamp(0), 0);
        assert_eq!(VideoEncoderConfig::timestamp(1_000_000_000), 90000);
        assert_eq!(VideoEncoderConfig::timestamp(33_333_333), 2999);
    }
}
