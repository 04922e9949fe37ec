//! Describe images out loud.
//!
//! An image is captioned by a vision-language model, optionally scanned for
//! objects, and the resulting sentence is turned into speech. The models are
//! loaded once and owned by an [`InferenceEngine`] worker thread; the HTTP
//! layer in [`server`] submits requests to it and keeps the generated audio in
//! an [`AudioStore`].

mod decode;
mod engine;
pub mod messages;
mod model;
mod narration;
pub mod server;
mod speech;
mod store;

#[cfg(feature = "paligemma")]
mod caption;
#[cfg(feature = "onnx")]
mod detection;

pub use decode::{DecodeError, decode_rgb8};
pub use engine::{
    EngineError, EngineResponse, InferenceEngine, InferenceEngineState, InferenceModel,
    PendingInference,
};
pub use model::{CaptionModel, Detection, ModelError, ObjectDetector, RgbImage, SpeechSynthesizer};
pub use narration::{
    DEFAULT_LANGUAGE, DETECTION_THRESHOLD, Narration, NarrationMode, NarrationRequest, Narrator,
    NarratorError, confident, explain,
};
pub use speech::{GoogleSpeech, split_text};
pub use store::{AudioStore, StoreError};

#[cfg(feature = "paligemma")]
pub use caption::{DEFAULT_SAMPLE_LEN, PaligemmaCaptioner};
#[cfg(feature = "onnx")]
pub use detection::{COCO_LABELS, OnnxDetector};
