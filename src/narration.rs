//! Composition of captioning, detection and speech for a single image.

use crate::{
    engine::InferenceModel,
    model::{CaptionModel, Detection, ModelError, ObjectDetector, RgbImage, SpeechSynthesizer},
};

/// Confidence below which detections are not reported.
pub const DETECTION_THRESHOLD: f32 = 0.5;

/// Default language for the speech synthesizer.
pub const DEFAULT_LANGUAGE: &str = "en";

/// What to produce for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NarrationMode {
    /// Caption only; the caption itself is spoken.
    Caption,
    /// Caption plus detected objects; the explanation is spoken.
    Analyze,
}

pub struct NarrationRequest {
    pub image: RgbImage,
    pub mode: NarrationMode,
}

#[derive(Debug)]
pub struct Narration {
    pub caption: String,
    /// Present in [`NarrationMode::Analyze`] only.
    pub objects: Option<Vec<Detection>>,
    /// The text handed to the speech synthesizer.
    pub spoken_text: String,
    /// Encoded MP3, or `None` when synthesis failed.
    pub audio: Option<Vec<u8>>,
}

#[derive(Debug, thiserror::Error)]
pub enum NarratorError {
    #[error("caption generation failed: {0}")]
    Caption(#[source] ModelError),
    #[error("caption model returned an empty caption")]
    EmptyCaption,
    #[error("object detection failed: {0}")]
    Detection(#[source] ModelError),
    #[error("object detection is not enabled")]
    DetectionUnavailable,
}

/// Runs the collaborators for one image.
///
/// Caption and detection failures fail the request. Speech failures are
/// logged and leave the narration without audio.
pub struct Narrator {
    captioner: Box<dyn CaptionModel>,
    detector: Option<Box<dyn ObjectDetector>>,
    speech: Box<dyn SpeechSynthesizer>,
    lang: String,
}

impl Narrator {
    pub fn new(captioner: Box<dyn CaptionModel>, speech: Box<dyn SpeechSynthesizer>) -> Self {
        Self {
            captioner,
            detector: None,
            speech,
            lang: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn ObjectDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    fn speak(&mut self, text: &str) -> Option<Vec<u8>> {
        match self.speech.synthesize(text, &self.lang) {
            Ok(audio) => Some(audio),
            Err(e) => {
                log::warn!("Speech synthesis failed, answering without audio: {e}");
                None
            }
        }
    }
}

impl InferenceModel for Narrator {
    type Request = NarrationRequest;
    type Response = Narration;
    type Error = NarratorError;

    fn run(&mut self, request: NarrationRequest) -> Result<Narration, NarratorError> {
        let caption = self
            .captioner
            .caption(&request.image)
            .map_err(NarratorError::Caption)?
            .trim()
            .to_string();
        if caption.is_empty() {
            return Err(NarratorError::EmptyCaption);
        }
        log::info!("Generated caption: {caption}");

        let (objects, spoken_text) = match request.mode {
            NarrationMode::Caption => (None, caption.clone()),
            NarrationMode::Analyze => {
                let detector = self
                    .detector
                    .as_mut()
                    .ok_or(NarratorError::DetectionUnavailable)?;
                let detections = detector
                    .detect(&request.image, DETECTION_THRESHOLD)
                    .map_err(NarratorError::Detection)?;
                let objects = confident(detections, DETECTION_THRESHOLD);
                let explanation = explain(&caption, &objects);
                (Some(objects), explanation)
            }
        };

        let audio = self.speak(&spoken_text);

        Ok(Narration {
            caption,
            objects,
            spoken_text,
            audio,
        })
    }
}

/// Keeps the detections whose confidence reaches `threshold`.
pub fn confident(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= threshold)
        .collect()
}

/// Builds the sentence spoken for an analyzed image.
pub fn explain(caption: &str, objects: &[Detection]) -> String {
    if objects.is_empty() {
        return format!("{caption}. I also detected: no clear objects.");
    }
    let labels = objects
        .iter()
        .map(|d| d.label.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{caption}. I also detected: {labels}.")
}
