use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig, PaligemmaError};

use crate::model::{CaptionModel, ModelError, RgbImage};

/// Prompt asking Paligemma for an English caption.
const CAPTION_PROMPT: &str = "caption en";

/// Default number of tokens sampled for a caption.
pub const DEFAULT_SAMPLE_LEN: usize = 50;

/// Captions images with the Paligemma vision-language model.
pub struct PaligemmaCaptioner {
    model: Paligemma,
    sample_len: usize,
}

impl PaligemmaCaptioner {
    /// Loads the model weights. Fails when they cannot be fetched or loaded.
    pub fn new(sample_len: usize) -> Result<Self, PaligemmaError> {
        let model = Paligemma::new(PaligemmaConfig::default())?;
        Ok(Self { model, sample_len })
    }
}

impl CaptionModel for PaligemmaCaptioner {
    fn caption(&mut self, image: &RgbImage) -> Result<String, ModelError> {
        let caption = self
            .model
            .inference(image, CAPTION_PROMPT, self.sample_len, false)?;
        Ok(caption)
    }
}
