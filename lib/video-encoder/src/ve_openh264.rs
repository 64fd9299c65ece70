use crate::{EncodedFrame, EncoderError, I420Frame, Result, VideoEncoder, VideoEncoderConfig};
use openh264::{encoder::Encoder, formats::YUVBuffer};

pub struct OpenH264VideoEncoder {
    width: u32,
    height: u32,
    frame_index: u64,
    encoder: Encoder,
}

impl OpenH264VideoEncoder {
    pub fn new(config: VideoEncoderConfig) -> Result<Self> {
        if !config.annexb {
            log::warn!("OpenH264 only produces Annex B byte-streams, ignoring `annexb = false`");
        }

        let encoder = Encoder::new().map_err(|e| {
            EncoderError::VideoEncodingFailed(format!("Failed to create OpenH264 encoder: {e:?}"))
        })?;

        Ok(Self {
            width: config.width,
            height: config.height,
            frame_index: 0,
            encoder,
        })
    }
}

impl VideoEncoder for OpenH264VideoEncoder {
    fn encode_frame(&mut self, frame: &I420Frame, _pts_ns: u64) -> Result<EncodedFrame> {
        if frame.width != self.width || frame.height != self.height {
            return Err(EncoderError::ImageProcessingFailed(format!(
                "frame size mismatch. current size: {}x{}. expect size: {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let yuv_buffer =
            YUVBuffer::from_vec(frame.to_vec(), self.width as usize, self.height as usize);

        let bitstream = self.encoder.encode(&yuv_buffer).map_err(|e| {
            EncoderError::VideoEncodingFailed(format!("OpenH264 encoding failed: {:?}", e))
        })?;

        let encoded_data = bitstream.to_vec();
        let encoded_frame = if encoded_data.is_empty() {
            EncodedFrame::Empty(self.frame_index)
        } else {
            EncodedFrame::Frame((self.frame_index, encoded_data))
        };
        self.frame_index += 1;

        Ok(encoded_frame)
    }

    // SPS/PPS travel inside the first encoded frame
    fn headers(&mut self) -> Result<Vec<u8>> {
        Ok(vec![])
    }

    fn flush(self: Box<Self>, _cb: &mut dyn FnMut(Vec<u8>)) -> Result<()> {
        Ok(())
    }
}
