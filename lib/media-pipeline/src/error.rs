use thiserror::Error;
use video_encoder::EncoderError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Caps negotiation failed: {0}")]
    NotNegotiated(String),

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    #[error("Pipeline is flushing")]
    Flushing,

    #[error("Already received end-of-stream")]
    Eos,

    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    #[error("Element `{element}` failed: {message}")]
    Element { element: String, message: String },

    #[error("Encoder failed: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Spawn streaming thread failed: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
