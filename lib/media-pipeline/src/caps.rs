use crate::{PipelineError, Result};
use std::fmt;
use video_encoder::PixelFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    pub num: u32,
    pub den: u32,
}

impl Fraction {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Duration of one frame in nanoseconds, `None` for a zero rate.
    pub fn frame_duration_ns(&self) -> Option<u64> {
        if self.num == 0 || self.den == 0 {
            return None;
        }

        Some(crate::SECOND_NS * self.den as u64 / self.num as u64)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFormat {
    /// Annex B start codes
    ByteStream,
    /// Length-prefixed NAL units
    Avc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// One access unit per buffer
    Au,
    Nal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caps {
    RawVideo {
        format: PixelFormat,
        width: u32,
        height: u32,
        framerate: Fraction,
    },
    H264 {
        stream_format: StreamFormat,
        alignment: Alignment,
    },
}

impl Caps {
    pub fn raw_video(format: PixelFormat, width: u32, height: u32, framerate: Fraction) -> Self {
        Caps::RawVideo {
            format,
            width,
            height,
            framerate,
        }
    }

    pub fn h264(stream_format: StreamFormat, alignment: Alignment) -> Self {
        Caps::H264 {
            stream_format,
            alignment,
        }
    }

    /// Size of one raw frame, `None` for compressed caps.
    pub fn frame_size(&self) -> Option<usize> {
        match self {
            Caps::RawVideo {
                format,
                width,
                height,
                ..
            } => Some(format.frame_size(*width, *height)),
            Caps::H264 { .. } => None,
        }
    }

    pub fn framerate(&self) -> Option<Fraction> {
        match self {
            Caps::RawVideo { framerate, .. } => Some(*framerate),
            Caps::H264 { .. } => None,
        }
    }

    pub fn is_compatible(&self, filter: &Caps) -> bool {
        self == filter
    }

    /// Apply a link filter. Fixed caps either match the filter or the link
    /// can not be negotiated.
    pub fn intersect(&self, filter: Option<&Caps>) -> Result<Caps> {
        match filter {
            None => Ok(self.clone()),
            Some(filter) if self.is_compatible(filter) => Ok(self.clone()),
            Some(filter) => Err(PipelineError::NotNegotiated(format!(
                "`{self}` does not match filter `{filter}`"
            ))),
        }
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caps::RawVideo {
                format,
                width,
                height,
                framerate,
            } => write!(
                f,
                "video/x-raw, format={format}, width={width}, height={height}, framerate={framerate}"
            ),
            Caps::H264 {
                stream_format,
                alignment,
            } => {
                let stream_format = match stream_format {
                    StreamFormat::ByteStream => "byte-stream",
                    StreamFormat::Avc => "avc",
                };
                let alignment = match alignment {
                    Alignment::Au => "au",
                    Alignment::Nal => "nal",
                };
                write!(
                    f,
                    "video/x-h264, stream-format={stream_format}, alignment={alignment}"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_to_string() {
        let caps = Caps::raw_video(PixelFormat::Gray8, 640, 480, Fraction::new(30, 1));
        assert_eq!(
            caps.to_string(),
            "video/x-raw, format=GRAY8, width=640, height=480, framerate=30/1"
        );

        let caps = Caps::h264(StreamFormat::ByteStream, Alignment::Au);
        assert_eq!(
            caps.to_string(),
            "video/x-h264, stream-format=byte-stream, alignment=au"
        );
    }

    #[test]
    fn test_caps_intersect() {
        let caps = Caps::raw_video(PixelFormat::Gray8, 640, 480, Fraction::new(30, 1));
        assert_eq!(caps.intersect(None).unwrap(), caps);
        assert_eq!(caps.intersect(Some(&caps.clone())).unwrap(), caps);

        let other = Caps::raw_video(PixelFormat::Gray8, 320, 480, Fraction::new(30, 1));
        assert!(matches!(
            caps.intersect(Some(&other)),
            Err(PipelineError::NotNegotiated(_))
        ));
    }

    #[test]
    fn test_frame_size_and_duration() {
        let caps = Caps::raw_video(PixelFormat::Gray8, 640, 480, Fraction::new(30, 1));
        assert_eq!(caps.frame_size(), Some(640 * 480));
        assert_eq!(
            caps.framerate().and_then(|f| f.frame_duration_ns()),
            Some(33_333_333)
        );
        assert_eq!(Fraction::new(0, 1).frame_duration_ns(), None);
        assert_eq!(
            Caps::h264(StreamFormat::Avc, Alignment::Nal).frame_size(),
            None
        );
    }
}
