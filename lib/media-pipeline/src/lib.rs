//! # Media Pipeline
//!
//! A small linear media pipeline modelled on the GStreamer application API:
//! an [`AppSrc`] the application pushes raw buffers into, a chain of
//! [`Element`]s that each run on their own streaming thread, and an
//! [`AppSink`] the application pulls compressed samples from.
//!
//! ```no_run
//! use media_pipeline::{
//!     Alignment, AppSink, AppSrc, AppSrcConfig, Buffer, Caps, Fraction, Pipeline, State,
//!     StreamFormat, VideoConvert, X264Enc, X264EncSettings,
//! };
//! use video_encoder::PixelFormat;
//!
//! let raw_caps = Caps::raw_video(PixelFormat::Gray8, 640, 480, Fraction::new(30, 1));
//! let appsrc = AppSrc::new("src", AppSrcConfig::new(raw_caps.clone()));
//! let appsink = AppSink::new("sink");
//!
//! let mut pipeline = Pipeline::new("encode");
//! pipeline.add_source(appsrc.clone()).unwrap();
//! pipeline.link_filtered(VideoConvert::new("convert"), Some(raw_caps)).unwrap();
//! pipeline.link(X264Enc::new("enc", X264EncSettings::default())).unwrap();
//! pipeline
//!     .add_sink(
//!         appsink.clone(),
//!         Some(Caps::h264(StreamFormat::ByteStream, Alignment::Au)),
//!     )
//!     .unwrap();
//! pipeline.set_state(State::Playing).unwrap();
//!
//! appsrc.push_buffer(Buffer::from_vec(vec![0; 640 * 480]).with_pts(0)).unwrap();
//! appsrc.end_of_stream().unwrap();
//!
//! while let Some(sample) = appsink.pull_sample() {
//!     println!("{} bytes", sample.data().len());
//! }
//! ```

mod app;
mod buffer;
mod bus;
mod caps;
mod element;
mod elements;
mod error;
mod pipeline;

pub use app::{APPSRC_DEFAULT_MAX_BUFFERS, AppSink, AppSrc, AppSrcConfig, Format};
pub use buffer::{Buffer, Sample};
pub use bus::{Bus, Message};
pub use caps::{Alignment, Caps, Fraction, StreamFormat};
pub use element::{Element, Transform};
pub use elements::{VideoConvert, X264Enc, X264EncSettings, contains_idr};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, State};

use std::time::Duration;

pub const SECOND_NS: u64 = 1_000_000_000;

const ELEMENT_CHANNEL_SIZE: usize = 16;

// Wake-up interval of blocking waits that also watch a stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(20);
