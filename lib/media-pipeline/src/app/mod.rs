mod appsink;
mod appsrc;

pub use appsink::AppSink;
pub use appsrc::{APPSRC_DEFAULT_MAX_BUFFERS, AppSrc, AppSrcConfig, Format};
