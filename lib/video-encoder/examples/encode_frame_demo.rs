use std::{fs::File, io::Write};
use video_encoder::{EncodedFrame, VideoEncoderConfig, gray8_to_i420};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (width, height) = (640, 480);
    let config = VideoEncoderConfig::new(width, height).with_fps_n(30);
    let mut encoder = video_encoder::new(config)?;
    let mut output = File::create("/tmp/encode_frame_demo.h264")?;

    let now = std::time::Instant::now();
    for i in 0..30u64 {
        let gray: Vec<u8> = (0..width * height)
            .map(|p| ((p as u64 + i * 4) % 255) as u8)
            .collect();
        let frame = gray8_to_i420(&gray, width, height)?;

        if let EncodedFrame::Frame((index, data)) = encoder.encode_frame(&frame, i * 33_333_333)? {
            log::debug!("frame[{index}]: {} bytes", data.len());
            output.write_all(&data)?;
        }
    }

    let mut delayed = vec![];
    encoder.flush(&mut |data| delayed.push(data))?;
    for data in delayed {
        output.write_all(&data)?;
    }

    log::info!("H.264 encoding time: {:.2?}", now.elapsed());

    Ok(())
}
