//! `StubModel`: deterministic stand-in for a real letter model.
//!
//! Frames the waveform like the production front end (400-sample windows,
//! 160-sample hop at 16 kHz) and turns each frame's RMS into a one-hot
//! activation: quiet frames map to the blank letter, louder frames to a
//! letter chosen from the level. Good enough to exercise the dispatcher,
//! the recognizer client and greedy decoding end to end.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{LetterboxError, Result};
use crate::inference::{InferenceRequest, InferenceResponse, SpeechModel};

const WINDOW: usize = 400;
const HOP: usize = 160;
const SILENCE_RMS: f32 = 0.01;

/// Supported languages and their alphabets. Index 0 is the blank.
const ALPHABETS: &[(&str, &str)] = &[
    ("de", "  abcdefghijklmnopqrstuvwxyzßäöü   "),
    ("en", "  abcdefghijklmnopqrstuvwxyz   "),
];

/// Alphabet for `language`, if supported.
pub fn alphabet(language: &str) -> Option<&'static str> {
    ALPHABETS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, letters)| *letters)
}

pub fn supported_languages() -> Vec<&'static str> {
    ALPHABETS.iter().map(|(lang, _)| *lang).collect()
}

#[derive(Debug, Default)]
pub struct StubModel {
    loaded: BTreeSet<String>,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, language: &str) -> bool {
        self.loaded.contains(language)
    }

    fn load(&mut self, language: &str) -> Result<&'static str> {
        let letters = alphabet(language).ok_or_else(|| {
            LetterboxError::Inference(format!(
                "only the following languages are supported: {}",
                supported_languages().join(", ")
            ))
        })?;
        if self.loaded.insert(language.to_string()) {
            debug!(language, "StubModel loaded");
        }
        Ok(letters)
    }
}

impl SpeechModel for StubModel {
    fn predict(&mut self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let letters = self.load(&request.language)?;
        let width = letters.chars().count();
        // Letters proper sit between the two leading blanks and the trailing ones.
        let spoken = width - 5;

        let mut waveform = request.waveform.clone();
        if waveform.len() < WINDOW {
            waveform.resize(WINDOW, 0.0);
        }

        let letter_activations = waveform
            .windows(WINDOW)
            .step_by(HOP)
            .map(|frame| {
                let rms = (frame.iter().map(|s| s * s).sum::<f32>() / WINDOW as f32).sqrt();
                let index = if rms < SILENCE_RMS {
                    0
                } else {
                    2 + ((rms * 100.0) as usize % spoken)
                };
                let mut step = vec![0.0f32; width];
                step[index] = 1.0;
                step
            })
            .collect();

        Ok(InferenceResponse {
            letter_activations,
            letters: letters.to_string(),
        })
    }

    fn unload(&mut self, language: &str) -> Result<bool> {
        let removed = self.loaded.remove(language);
        debug!(language, removed, "StubModel::unload");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::greedy_decode;

    fn request(waveform: Vec<f32>, language: &str) -> InferenceRequest {
        InferenceRequest {
            waveform,
            language: language.into(),
        }
    }

    #[test]
    fn frames_with_window_and_hop() {
        let mut model = StubModel::new();
        let resp = model
            .predict(&request(vec![0.0; 16_000], "en"))
            .expect("predict");
        assert_eq!(resp.timesteps(), (16_000 - WINDOW) / HOP + 1);
        assert_eq!(resp.letter_activations[0].len(), resp.letters.chars().count());
    }

    #[test]
    fn short_input_is_padded_to_one_frame() {
        let mut model = StubModel::new();
        let resp = model.predict(&request(vec![0.3; 10], "de")).expect("predict");
        assert_eq!(resp.timesteps(), 1);
    }

    #[test]
    fn silence_decodes_to_empty_text() {
        let mut model = StubModel::new();
        let resp = model.predict(&request(vec![0.0; 4_000], "en")).expect("predict");
        assert_eq!(greedy_decode(&resp), "");
    }

    #[test]
    fn loud_input_decodes_to_letters() {
        let mut model = StubModel::new();
        let resp = model.predict(&request(vec![0.5; 4_000], "en")).expect("predict");
        let text = greedy_decode(&resp);
        assert!(!text.is_empty());
        assert!(text.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn unsupported_language_is_an_error() {
        let mut model = StubModel::new();
        let err = model.predict(&request(vec![0.0; 400], "fr")).unwrap_err();
        assert!(err.to_string().contains("de, en"), "{err}");
    }

    #[test]
    fn unload_reports_whether_language_was_loaded() {
        let mut model = StubModel::new();
        assert!(!model.unload("en").unwrap());
        model.predict(&request(vec![0.0; 400], "en")).unwrap();
        assert!(model.is_loaded("en"));
        assert!(model.unload("en").unwrap());
        assert!(!model.is_loaded("en"));
    }
}
