use crate::{Alignment, Buffer, Caps, Element, PipelineError, Result, StreamFormat, Transform};
use derive_setters::Setters;
use std::collections::VecDeque;
use video_encoder::{
    EncodedFrame, I420Frame, PixelFormat, Preset, Profile, Tune, VideoEncoder, VideoEncoderConfig,
};

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct X264EncSettings {
    pub preset: Preset,
    pub tune: Tune,

    /// `Profile::Baseline` keeps the stream free of B-frames.
    pub profile: Profile,

    /// Disable lookahead and frame threading delay.
    pub zero_latency: bool,

    /// `0` leaves the keyframe distance to the encoder.
    pub key_int_max: u32,

    /// Annex B start codes instead of length-prefixed NAL units.
    pub byte_stream: bool,
}

impl Default for X264EncSettings {
    fn default() -> Self {
        Self {
            preset: Preset::Superfast,
            tune: Tune::None,
            profile: Profile::Baseline,
            zero_latency: false,
            key_int_max: 0,
            byte_stream: true,
        }
    }
}

/// H.264 encoder element, I420 in, one access unit per output buffer.
#[derive(Debug, Clone)]
pub struct X264Enc {
    name: String,
    settings: X264EncSettings,
}

impl X264Enc {
    pub fn new(name: impl Into<String>, settings: X264EncSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &X264EncSettings {
        &self.settings
    }

    fn stream_format(&self) -> StreamFormat {
        if self.settings.byte_stream {
            StreamFormat::ByteStream
        } else {
            StreamFormat::Avc
        }
    }

    fn encoder_config(&self, input: &Caps) -> Result<VideoEncoderConfig> {
        let Caps::RawVideo {
            format: PixelFormat::I420,
            width,
            height,
            framerate,
        } = input
        else {
            return Err(PipelineError::NotNegotiated(format!(
                "`{}` only accepts I420 raw video, got `{input}`",
                self.name
            )));
        };

        let config = VideoEncoderConfig::new(*width, *height)
            .with_fps_n(framerate.num)
            .with_fps_d(framerate.den)
            .with_annexb(self.settings.byte_stream)
            .with_preset(self.settings.preset)
            .with_tune(self.settings.tune)
            .with_profile(self.settings.profile)
            .with_zero_latency(self.settings.zero_latency)
            .with_keyframe_interval(self.settings.key_int_max);

        config
            .validate()
            .map_err(|e| PipelineError::NotNegotiated(format!("`{}`: {e}", self.name)))?;

        Ok(config)
    }
}

impl Element for X264Enc {
    fn name(&self) -> &str {
        &self.name
    }

    fn negotiate(&self, input: &Caps) -> Result<Caps> {
        self.encoder_config(input)?;
        Ok(Caps::h264(self.stream_format(), Alignment::Au))
    }

    fn start(&self, input: &Caps) -> Result<Box<dyn Transform>> {
        let config = self.encoder_config(input)?;
        let (width, height) = (config.width, config.height);
        let frame_duration = input.framerate().and_then(|f| f.frame_duration_ns());
        let encoder = video_encoder::new(config)?;

        log::info!("`{}` started with `{input}`", self.name);

        Ok(Box::new(EncodeTransform {
            width,
            height,
            frame_duration,
            byte_stream: self.settings.byte_stream,
            encoder: Some(encoder),
            pending: VecDeque::new(),
        }))
    }
}

struct PendingTiming {
    pts: Option<u64>,
    dts: Option<u64>,
    duration: Option<u64>,
}

struct EncodeTransform {
    width: u32,
    height: u32,
    frame_duration: Option<u64>,
    byte_stream: bool,
    encoder: Option<Box<dyn VideoEncoder>>,

    // Timing of frames handed to the encoder but not yet returned. Without
    // B-frames the encoder returns frames in input order.
    pending: VecDeque<PendingTiming>,
}

impl EncodeTransform {
    fn output(&mut self, data: Vec<u8>) -> Buffer {
        let keyframe = self.byte_stream && contains_idr(&data);
        let mut buffer = Buffer::from_vec(data).with_keyframe(keyframe);

        match self.pending.pop_front() {
            Some(timing) => {
                buffer.pts = timing.pts;
                buffer.dts = timing.dts;
                buffer.duration = timing.duration;
            }
            None => log::warn!("encoder produced more frames than it received"),
        }

        buffer
    }
}

impl Transform for EncodeTransform {
    fn chain(&mut self, buffer: Buffer) -> Result<Vec<Buffer>> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(PipelineError::InvalidState(
                "encoder already drained".to_string(),
            ));
        };

        let frame = I420Frame::from_raw(&buffer.data, self.width, self.height)?;
        let pts = buffer.pts.unwrap_or_default();

        self.pending.push_back(PendingTiming {
            pts: buffer.pts,
            dts: buffer.dts.or(buffer.pts),
            duration: buffer.duration.or(self.frame_duration),
        });

        match encoder.encode_frame(&frame, pts)? {
            EncodedFrame::Frame((index, data)) => {
                log::debug!("encoded frame[{index}] {} bytes", data.len());
                Ok(vec![self.output(data)])
            }
            EncodedFrame::Empty(index) => {
                log::debug!("encoder holds frame[{index}]");
                Ok(vec![])
            }
            EncodedFrame::End => Ok(vec![]),
        }
    }

    fn drain(&mut self) -> Result<Vec<Buffer>> {
        let Some(encoder) = self.encoder.take() else {
            return Ok(vec![]);
        };

        let mut delayed = vec![];
        encoder.flush(&mut |data| {
            if !data.is_empty() {
                delayed.push(data);
            }
        })?;

        log::info!("encoder drained {} delayed frames", delayed.len());
        Ok(delayed
            .into_iter()
            .map(|data| self.output(data))
            .collect())
    }
}

/// Whether an Annex B access unit carries an IDR slice (NAL type 5).
pub fn contains_idr(data: &[u8]) -> bool {
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if data[i + 3] & 0x1f == 5 {
                return true;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    false
}
