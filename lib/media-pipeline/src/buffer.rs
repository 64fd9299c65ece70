use crate::Caps;
use derive_setters::Setters;

/// A chunk of media flowing through the pipeline. Timestamps are in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Setters)]
#[setters(prefix = "with_")]
pub struct Buffer {
    #[setters(skip)]
    pub data: Vec<u8>,

    #[setters(strip_option)]
    pub pts: Option<u64>,

    #[setters(strip_option)]
    pub dts: Option<u64>,

    #[setters(strip_option)]
    pub duration: Option<u64>,

    pub keyframe: bool,
}

impl Buffer {
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Carry timing over from `other`, used by elements that replace the payload.
    pub fn copy_timestamps(mut self, other: &Buffer) -> Self {
        self.pts = other.pts;
        self.dts = other.dts;
        self.duration = other.duration;
        self
    }
}

/// A buffer pulled from the sink together with the caps it was produced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub buffer: Buffer,
    pub caps: Option<Caps>,
}

impl Sample {
    pub fn data(&self) -> &[u8] {
        &self.buffer.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.buffer.data
    }
}

#[derive(Debug, Clone)]
pub(crate) enum StreamItem {
    Buffer(Buffer),
    Eos,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_setters() {
        let buffer = Buffer::from_slice(&[1, 2, 3])
            .with_pts(10)
            .with_dts(10)
            .with_duration(5);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pts, Some(10));
        assert_eq!(buffer.dts, Some(10));
        assert_eq!(buffer.duration, Some(5));
        assert!(!buffer.keyframe);
    }

    #[test]
    fn test_copy_timestamps() {
        let src = Buffer::from_vec(vec![0; 4]).with_pts(33).with_dts(30);
        let out = Buffer::from_vec(vec![1]).copy_timestamps(&src);
        assert_eq!(out.pts, Some(33));
        assert_eq!(out.dts, Some(30));
        assert_eq!(out.duration, None);
        assert_eq!(out.data, vec![1]);
    }
}
