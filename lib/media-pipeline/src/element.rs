use crate::{Buffer, Caps, Result};

/// A processing stage in the pipeline.
///
/// The element itself only holds settings and is shared with its streaming
/// thread. The state that does the work is built by `start` on that thread,
/// so it does not have to be `Send`.
pub trait Element: Send + Sync {
    fn name(&self) -> &str;

    /// Output caps produced for `input`, or `NotNegotiated`.
    fn negotiate(&self, input: &Caps) -> Result<Caps>;

    fn start(&self, input: &Caps) -> Result<Box<dyn Transform>>;
}

pub trait Transform {
    /// Process one input buffer. May return nothing while the element holds
    /// data back.
    fn chain(&mut self, buffer: Buffer) -> Result<Vec<Buffer>>;

    /// Called once at end-of-stream to release held-back data.
    fn drain(&mut self) -> Result<Vec<Buffer>> {
        Ok(vec![])
    }
}
