mod videoconvert;
mod x264enc;

pub use videoconvert::VideoConvert;
pub use x264enc::{X264Enc, X264EncSettings, contains_idr};
