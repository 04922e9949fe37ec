use kornia_image::{Image, allocator::CpuAllocator};
use serde::{Deserialize, Serialize};

/// RGB image handed to the vision models.
pub type RgbImage = Image<u8, 3, CpuAllocator>;

/// Error type returned by the model collaborators.
pub type ModelError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A pretrained image-to-text model producing a short description.
pub trait CaptionModel: Send {
    /// Describes the image in one short sentence.
    fn caption(&mut self, image: &RgbImage) -> Result<String, ModelError>;
}

/// A pretrained object detector.
pub trait ObjectDetector: Send {
    /// Returns the objects recognized with a confidence of at least `threshold`.
    fn detect(&mut self, image: &RgbImage, threshold: f32) -> Result<Vec<Detection>, ModelError>;
}

/// A text-to-speech engine.
pub trait SpeechSynthesizer: Send {
    /// Speaks `text` in the language `lang` and returns the encoded MP3 audio.
    fn synthesize(&mut self, text: &str, lang: &str) -> Result<Vec<u8>, ModelError>;
}

/// An object recognized in an image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Human readable class label.
    #[serde(rename = "object")]
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_serializes_label_as_object() {
        let json = serde_json::to_value(Detection::new("dog", 0.75)).unwrap();
        assert_eq!(json, serde_json::json!({ "object": "dog", "confidence": 0.75 }));
    }
}
