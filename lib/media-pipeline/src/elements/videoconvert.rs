use crate::{Buffer, Caps, Element, PipelineError, Result, Transform};
use video_encoder::{I420Frame, PixelFormat, gray8_to_i420, rgb_to_i420};

/// Converts raw video to I420.
#[derive(Debug, Clone)]
pub struct VideoConvert {
    name: String,
}

impl VideoConvert {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Element for VideoConvert {
    fn name(&self) -> &str {
        &self.name
    }

    fn negotiate(&self, input: &Caps) -> Result<Caps> {
        match input {
            Caps::RawVideo {
                format,
                width,
                height,
                framerate,
            } => {
                log::debug!("`{}` converts {format} -> I420", self.name);
                Ok(Caps::raw_video(
                    PixelFormat::I420,
                    *width,
                    *height,
                    *framerate,
                ))
            }
            _ => Err(PipelineError::NotNegotiated(format!(
                "`{}` only accepts raw video, got `{input}`",
                self.name
            ))),
        }
    }

    fn start(&self, input: &Caps) -> Result<Box<dyn Transform>> {
        match input {
            Caps::RawVideo {
                format,
                width,
                height,
                ..
            } => Ok(Box::new(ConvertTransform {
                format: *format,
                width: *width,
                height: *height,
            })),
            _ => Err(PipelineError::NotNegotiated(format!(
                "`{}` started with `{input}`",
                self.name
            ))),
        }
    }
}

struct ConvertTransform {
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl Transform for ConvertTransform {
    fn chain(&mut self, buffer: Buffer) -> Result<Vec<Buffer>> {
        let frame = match self.format {
            PixelFormat::I420 => return Ok(vec![buffer]),
            PixelFormat::Gray8 => gray8_to_i420(&buffer.data, self.width, self.height)?,
            PixelFormat::Rgb8 => rgb_to_i420(&buffer.data, self.width, self.height)?,
        };

        Ok(vec![Self::output(frame, &buffer)])
    }
}

impl ConvertTransform {
    fn output(frame: I420Frame, input: &Buffer) -> Buffer {
        Buffer::from_vec(frame.to_vec())
            .copy_timestamps(input)
            .with_keyframe(input.keyframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fraction;

    #[test]
    fn test_negotiate() {
        let convert = VideoConvert::new("convert");
        let caps = Caps::raw_video(PixelFormat::Gray8, 100, 100, Fraction::new(30, 1));
        assert_eq!(
            convert.negotiate(&caps).unwrap(),
            Caps::raw_video(PixelFormat::I420, 100, 100, Fraction::new(30, 1))
        );

        let h264 = Caps::h264(crate::StreamFormat::ByteStream, crate::Alignment::Au);
        assert!(matches!(
            convert.negotiate(&h264),
            Err(PipelineError::NotNegotiated(_))
        ));
    }

    #[test]
    fn test_gray_frame_to_i420() {
        let convert = VideoConvert::new("convert");
        let caps = Caps::raw_video(PixelFormat::Gray8, 4, 4, Fraction::new(30, 1));
        let mut transform = convert.start(&caps).unwrap();

        let out = transform
            .chain(Buffer::from_vec(vec![128; 16]).with_pts(42))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), PixelFormat::I420.frame_size(4, 4));
        assert_eq!(out[0].pts, Some(42));
        assert!(transform.drain().unwrap().is_empty());
    }

    #[test]
    fn test_bad_input_size() {
        let convert = VideoConvert::new("convert");
        let caps = Caps::raw_video(PixelFormat::Gray8, 4, 4, Fraction::new(30, 1));
        let mut transform = convert.start(&caps).unwrap();

        assert!(matches!(
            transform.chain(Buffer::from_vec(vec![0; 3])),
            Err(PipelineError::Encoder(_))
        ));
    }
}
