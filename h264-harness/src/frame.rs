use std::{fs, path::Path};

/// The single GRAY8 picture the driver keeps pushing, modified in place
/// between pushes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RawFrame {
    /// Byte ramp `i % 255` over the whole frame.
    pub fn ramp(width: u32, height: u32) -> Self {
        let size = (width * height) as usize;
        Self {
            width,
            height,
            data: (0..size).map(|i| (i % 255) as u8).collect(),
        }
    }

    /// Use the first `width * height` bytes of `path`, or the ramp when the
    /// file is missing or too short.
    pub fn load_or_ramp(path: &Path, width: u32, height: u32) -> Self {
        let size = (width * height) as usize;

        match fs::read(path) {
            Ok(mut data) if data.len() >= size => {
                data.truncate(size);
                log::info!("loaded raw frame from {}", path.display());
                Self {
                    width,
                    height,
                    data,
                }
            }
            Ok(data) => {
                log::warn!(
                    "{} holds {} bytes, need {size} for {width}x{height}, using generated frame",
                    path.display(),
                    data.len()
                );
                Self::ramp(width, height)
            }
            Err(e) => {
                log::warn!(
                    "read {} failed: {e}, using generated frame",
                    path.display()
                );
                Self::ramp(width, height)
            }
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Paint row `index * spacing` white and row `(index + 3) * spacing`
    /// black so consecutive frames differ. Rows below the frame are skipped.
    pub fn draw_stripes(&mut self, index: u32, spacing: u32) {
        self.fill_row(index * spacing, 0xff);
        self.fill_row((index + 3) * spacing, 0x00);
    }

    fn fill_row(&mut self, row: u32, value: u8) {
        if row >= self.height {
            log::debug!("stripe row {row} is outside of {} rows", self.height);
            return;
        }

        let start = (row * self.width) as usize;
        self.data[start..start + self.width as usize].fill(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_ramp() {
        let frame = RawFrame::ramp(100, 100);
        assert_eq!(frame.data().len(), 10_000);
        assert_eq!(frame.data()[0], 0);
        assert_eq!(frame.data()[254], 254);
        assert_eq!(frame.data()[255], 0);
        assert_eq!(frame.data()[9_999], (9_999 % 255) as u8);
    }

    #[test]
    fn test_draw_stripes() {
        let mut frame = RawFrame::ramp(100, 100);
        frame.draw_stripes(1, 20);

        let row = |r: usize| &frame.data()[r * 100..(r + 1) * 100];
        assert!(row(20).iter().all(|&v| v == 0xff));
        assert!(row(80).iter().all(|&v| v == 0x00));
        assert_eq!(row(21)[0], (2100 % 255) as u8);
    }

    #[test]
    fn test_stripes_outside_frame_are_skipped() {
        let mut frame = RawFrame::ramp(100, 100);
        let before = frame.data().to_vec();

        // white row 180 and black row 240 are both below a 100 row frame
        frame.draw_stripes(9, 20);
        assert_eq!(frame.data(), before.as_slice());

        // white row 60 lands, black row 120 does not
        frame.draw_stripes(3, 20);
        assert!(frame.data()[6000..6100].iter().all(|&v| v == 0xff));
        assert_eq!(frame.data().len(), 10_000);
    }

    #[test]
    fn test_load_or_ramp() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![7u8; 10_050]).unwrap();

        let frame = RawFrame::load_or_ramp(file.path(), 100, 100);
        assert_eq!(frame.data().len(), 10_000);
        assert!(frame.data().iter().all(|&v| v == 7));

        let frame = RawFrame::load_or_ramp(file.path(), 200, 100);
        assert_eq!(frame.data(), RawFrame::ramp(200, 100).data());

        let frame = RawFrame::load_or_ramp(Path::new("/no/such/frame.raw"), 100, 100);
        assert_eq!(frame.data(), RawFrame::ramp(100, 100).data());
    }
}
