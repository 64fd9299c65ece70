use crate::{
    EncodedFrame, EncoderError, I420Frame, Preset, Profile, Result, Tune, VideoEncoder,
    VideoEncoderConfig,
};
use x264::{Colorspace, Encoder, Image, Setup};

pub struct X264VideoEncoder {
    width: u32,
    height: u32,
    frame_index: u64,
    encoder: Encoder,
}

impl X264VideoEncoder {
    pub fn new(config: VideoEncoderConfig) -> Result<Self> {
        let VideoEncoderConfig {
            width,
            height,
            fps_n,
            fps_d,
            annexb,
            preset,
            tune,
            profile,
            zero_latency,
            keyframe_interval,
        } = config;

        let mut setup = Setup::preset(x264_preset(preset), x264_tune(tune), true, zero_latency)
            .fps(fps_n, fps_d)
            .annexb(annexb);

        if keyframe_interval > 0 {
            // Disable scene detection so keyframes land exactly on the interval
            setup = setup
                .max_keyframe_interval(keyframe_interval as i32)
                .scenecut_threshold(0);
        }

        setup = match profile {
            Profile::Baseline => setup.baseline(),
            Profile::Main => setup.main(),
            Profile::High => setup.high(),
        };

        let encoder = setup
            .build(Colorspace::I420, width as i32, height as i32)
            .map_err(|e| {
                EncoderError::VideoEncodingFailed(format!("Failed to create x264 encoder: {e:?}"))
            })?;

        log::info!(
            "x264 encoder created: {width}x{height} @ {fps_n}/{fps_d}, {preset:?}, {profile:?}, zero_latency: {zero_latency}"
        );

        Ok(Self {
            encoder,
            width,
            height,
            frame_index: 0,
        })
    }
}

impl VideoEncoder for X264VideoEncoder {
    fn encode_frame(&mut self, frame: &I420Frame, pts_ns: u64) -> Result<EncodedFrame> {
        if frame.width != self.width || frame.height != self.height {
            return Err(EncoderError::ImageProcessingFailed(format!(
                "frame size mismatch. current size: {}x{}. expect size: {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let planes = [
            x264::Plane {
                stride: self.width as i32,
                data: &frame.y,
            },
            x264::Plane {
                stride: frame.chroma_width() as i32,
                data: &frame.u,
            },
            x264::Plane {
                stride: frame.chroma_width() as i32,
                data: &frame.v,
            },
        ];

        let image = Image::new(
            Colorspace::I420,
            self.width as i32,
            self.height as i32,
            &planes,
        );

        let timestamp = VideoEncoderConfig::timestamp(pts_ns);
        let (data, _) = self.encoder.encode(timestamp, image).map_err(|e| {
            EncoderError::VideoEncodingFailed(format!("x264 encoding failed: {:?}", e))
        })?;

        let encoded_data = data.entirety().to_vec();
        let encoded_frame = if encoded_data.is_empty() {
            EncodedFrame::Empty(self.frame_index)
        } else {
            EncodedFrame::Frame((self.frame_index, encoded_data))
        };
        self.frame_index += 1;

        Ok(encoded_frame)
    }

    fn headers(&mut self) -> Result<Vec<u8>> {
        Ok(self
            .encoder
            .headers()
            .map_err(|e| {
                EncoderError::VideoEncodingFailed(format!("Failed to get encoder headers: {e:?}"))
            })?
            .entirety()
            .to_vec())
    }

    fn flush(self: Box<Self>, cb: &mut dyn FnMut(Vec<u8>)) -> Result<()> {
        let mut items = self.encoder.flush();
        while let Some(result) = items.next() {
            match result {
                Ok((data, _)) => cb(data.entirety().to_vec()),
                Err(e) => {
                    return Err(EncoderError::VideoEncodingFailed(format!(
                        "Failed to flush encoder frame: {e:?}"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn x264_preset(preset: Preset) -> x264::Preset {
    match preset {
        Preset::Ultrafast => x264::Preset::Ultrafast,
        Preset::Superfast => x264::Preset::Superfast,
        Preset::Veryfast => x264::Preset::Veryfast,
        Preset::Faster => x264::Preset::Faster,
        Preset::Fast => x264::Preset::Fast,
        Preset::Medium => x264::Preset::Medium,
        Preset::Slow => x264::Preset::Slow,
        Preset::Slower => x264::Preset::Slower,
        Preset::Veryslow => x264::Preset::Veryslow,
    }
}

fn x264_tune(tune: Tune) -> x264::Tune {
    match tune {
        Tune::None => x264::Tune::None,
        Tune::Film => x264::Tune::Film,
        Tune::Animation => x264::Tune::Animation,
        Tune::StillImage => x264::Tune::StillImage,
    }
}
