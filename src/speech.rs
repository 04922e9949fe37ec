//! Speech synthesis through the Google Translate text-to-speech endpoint.

use crate::model::{ModelError, SpeechSynthesizer};

const TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Longest text the endpoint accepts in one call.
const MAX_CHUNK_CHARS: usize = 100;

/// Speaks text through the Translate endpoint.
///
/// The blocking HTTP client is only built on first use, on the thread that
/// runs the synthesis, so constructing this inside an async runtime is safe.
pub struct GoogleSpeech {
    client: Option<reqwest::blocking::Client>,
    url: String,
}

impl GoogleSpeech {
    pub fn new() -> Self {
        Self::with_url(TTS_URL)
    }

    /// Points the synthesizer at another endpoint speaking the same protocol.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: None,
            url: url.into(),
        }
    }

    fn client(&mut self) -> Result<&reqwest::blocking::Client, ModelError> {
        if self.client.is_none() {
            let client = reqwest::blocking::Client::builder()
                .user_agent("Mozilla/5.0 (X11; Linux x86_64)")
                .build()?;
            self.client = Some(client);
        }
        self.client.as_ref().ok_or_else(|| "speech client unavailable".into())
    }
}

impl Default for GoogleSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSynthesizer for GoogleSpeech {
    fn synthesize(&mut self, text: &str, lang: &str) -> Result<Vec<u8>, ModelError> {
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err("no text to speak".into());
        }

        let total = chunks.len().to_string();
        let url = self.url.clone();
        let client = self.client()?;
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let response = client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", lang),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.to_string().as_str()),
                    ("textlen", chunk.chars().count().to_string().as_str()),
                ])
                .send()?
                .error_for_status()?;
            audio.extend_from_slice(&response.bytes()?);
        }

        log::debug!("Synthesized {} bytes of speech in {} chunk(s)", audio.len(), chunks.len());
        Ok(audio)
    }
}

/// Splits `text` into pieces of at most `max_chars` characters, breaking on
/// whitespace where possible.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.push(word.drain(..max_chars).collect());
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
