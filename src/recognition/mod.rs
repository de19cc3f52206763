pub mod client;
pub mod gemini;

pub use client::{
    parse_plates, BackendError, RecognitionBackend, RecognitionClient, RecognitionError,
    RecognitionRequest, MIN_IMAGE_BYTES,
};
pub use gemini::GeminiBackend;
