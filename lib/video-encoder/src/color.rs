use crate::{EncoderError, Result};
use image::{GrayImage, RgbImage, buffer::ConvertBuffer};
use yuv::{
    YuvChromaSubsampling, YuvConversionMode, YuvPlanarImageMut, YuvRange, YuvStandardMatrix,
    rgb_to_yuv420,
};

/// Raw pixel layouts accepted on the raw-video side of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    I420,
}

impl PixelFormat {
    /// Bytes in one tightly packed frame.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Gray8 => w * h,
            PixelFormat::Rgb8 => w * h * 3,
            PixelFormat::I420 => w * h + 2 * (w.div_ceil(2) * h.div_ceil(2)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::Rgb8 => "RGB",
            PixelFormat::I420 => "I420",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planar YUV 4:2:0 image with tightly packed planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl I420Frame {
    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    /// Split a contiguous I420 buffer into its planes.
    pub fn from_raw(data: &[u8], width: u32, height: u32) -> Result<Self> {
        let expected = PixelFormat::I420.frame_size(width, height);
        if data.len() != expected {
            return Err(EncoderError::ImageProcessingFailed(format!(
                "I420 buffer is {} bytes, expect {expected} for {width}x{height}",
                data.len()
            )));
        }

        let luma = (width * height) as usize;
        let chroma = (expected - luma) / 2;

        Ok(Self {
            width,
            height,
            y: data[..luma].to_vec(),
            u: data[luma..luma + chroma].to_vec(),
            v: data[luma + chroma..].to_vec(),
        })
    }

    /// Contiguous Y, U, V layout.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.y.len() + self.u.len() + self.v.len());
        data.extend_from_slice(&self.y);
        data.extend_from_slice(&self.u);
        data.extend_from_slice(&self.v);
        data
    }
}

/// Convert a full-range GRAY8 frame to limited-range BT.601 I420.
pub fn gray8_to_i420(gray_data: &[u8], width: u32, height: u32) -> Result<I420Frame> {
    let gray = GrayImage::from_raw(width, height, gray_data.to_vec()).ok_or_else(|| {
        EncoderError::ImageProcessingFailed(format!(
            "GRAY8 buffer is {} bytes, expect {} for {width}x{height}",
            gray_data.len(),
            PixelFormat::Gray8.frame_size(width, height)
        ))
    })?;

    let rgb: RgbImage = gray.convert();
    rgb_to_i420(rgb.as_raw(), width, height)
}

pub fn rgb_to_i420(rgb_data: &[u8], width: u32, height: u32) -> Result<I420Frame> {
    let expected = PixelFormat::Rgb8.frame_size(width, height);
    if rgb_data.len() != expected {
        return Err(EncoderError::ImageProcessingFailed(format!(
            "RGB buffer is {} bytes, expect {expected} for {width}x{height}",
            rgb_data.len()
        )));
    }

    let mut planar_image =
        YuvPlanarImageMut::<u8>::alloc(width, height, YuvChromaSubsampling::Yuv420);

    rgb_to_yuv420(
        &mut planar_image,
        rgb_data,
        width * 3, // RGB stride (3 bytes per pixel)
        YuvRange::Limited,
        YuvStandardMatrix::Bt601,
        YuvConversionMode::Balanced,
    )
    .map_err(|e| {
        EncoderError::ImageProcessingFailed(format!("RGB to YUV conversion failed: {:?}", e))
    })?;

    Ok(I420Frame {
        width,
        height,
        y: planar_image.y_plane.borrow().to_vec(),
        u: planar_image.u_plane.borrow().to_vec(),
        v: planar_image.v_plane.borrow().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn near(a: u8, b: u8) -> bool {
        (a as i16 - b as i16).abs() <= 1
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormat::Gray8.frame_size(100, 100), 10_000);
        assert_eq!(PixelFormat::Rgb8.frame_size(100, 100), 30_000);
        assert_eq!(PixelFormat::I420.frame_size(100, 100), 15_000);
        assert_eq!(PixelFormat::I420.frame_size(3, 3), 9 + 2 * 4);
    }

    #[test]
    fn test_gray_to_i420_levels() {
        let (width, height) = (4, 2);
        let mut gray = vec![0u8; 4];
        gray.extend_from_slice(&[255u8; 4]);

        let frame = gray8_to_i420(&gray, width, height).unwrap();
        assert_eq!(frame.y.len(), 8);
        assert_eq!(frame.u.len(), 2);
        assert_eq!(frame.v.len(), 2);

        assert!(frame.y[..4].iter().all(|&y| near(y, 16)));
        assert!(frame.y[4..].iter().all(|&y| near(y, 235)));
        assert!(frame.u.iter().chain(frame.v.iter()).all(|&c| near(c, 128)));
    }

    #[test]
    fn test_gray_to_i420_bad_size() {
        let err = gray8_to_i420(&[0u8; 10], 4, 4).unwrap_err();
        assert!(matches!(err, EncoderError::ImageProcessingFailed(_)));
    }

    #[test]
    fn test_i420_from_raw() {
        let data: Vec<u8> = (0..24).collect();
        let frame = I420Frame::from_raw(&data, 4, 4).unwrap();
        assert_eq!(frame.y, (0..16).collect::<Vec<u8>>());
        assert_eq!(frame.u, vec![16, 17, 18, 19]);
        assert_eq!(frame.v, vec![20, 21, 22, 23]);
        assert_eq!(frame.to_vec(), data);

        assert!(I420Frame::from_raw(&data[..23], 4, 4).is_err());
    }
}
