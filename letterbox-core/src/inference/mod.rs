//! Speech model contract and its worker-side bindings.
//!
//! The dispatcher treats inference as opaque JSON. This module gives that
//! JSON a shape ([`InferenceRequest`] / [`InferenceResponse`]), the
//! [`SpeechModel`] trait backends implement, [`register_model`] to put a
//! model's methods into a worker catalog, and the caller-side
//! [`Recognizer`](client::Recognizer).
//!
//! `&mut self` on the model methods expresses that backends are stateful
//! (lazily loaded per-language weights). All access is serialised through
//! `ModelHandle`'s `parking_lot::Mutex`, and in practice only the worker
//! thread touches it.

pub mod client;
pub mod stub;

pub use client::Recognizer;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::worker::MethodCatalog;
use crate::error::Result;

/// Catalog implementation names registered by [`register_model`].
pub const PREDICT_IMPL: &str = "speech.predict";
pub const TRANSCRIBE_IMPL: &str = "speech.transcribe";
pub const UNLOAD_IMPL: &str = "speech.unload";

/// One recognition job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRequest {
    /// Mono samples in [-1.0, 1.0] at 16 kHz.
    pub waveform: Vec<f32>,
    /// Language identifier, e.g. `"en"`.
    pub language: String,
}

/// Per-timestep letter activations plus the alphabet they index into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResponse {
    /// `letter_activations[t][i]` is the activation of `letters[i]` at step `t`.
    pub letter_activations: Vec<Vec<f32>>,
    pub letters: String,
}

impl InferenceResponse {
    pub fn timesteps(&self) -> usize {
        self.letter_activations.len()
    }
}

/// Contract for recognition backends.
pub trait SpeechModel: Send + 'static {
    /// Compute letter activations for `request.waveform`, loading the
    /// language's weights on first use.
    ///
    /// # Errors
    /// Unsupported language or a backend failure.
    fn predict(&mut self, request: &InferenceRequest) -> Result<InferenceResponse>;

    /// Drop the weights for `language`. Returns `false` if nothing was loaded.
    fn unload(&mut self, language: &str) -> Result<bool>;
}

/// Thread-safe reference-counted handle to any `SpeechModel` implementor.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn SpeechModel>>);

impl ModelHandle {
    pub fn new<M: SpeechModel>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

/// Greedy best-path decoding: strongest letter per step, runs of spaces
/// collapsed, surrounding whitespace trimmed.
pub fn greedy_decode(response: &InferenceResponse) -> String {
    let letters: Vec<char> = response.letters.chars().collect();
    let mut text = String::with_capacity(response.timesteps());

    for step in &response.letter_activations {
        let best = step
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i);
        let Some(letter) = best.and_then(|i| letters.get(i)) else {
            continue;
        };
        if *letter == ' ' && text.ends_with(' ') {
            continue;
        }
        text.push(*letter);
    }

    text.trim().to_string()
}

/// Add `model`'s predict / transcribe / unload implementations to `catalog`.
pub fn register_model(catalog: &mut MethodCatalog, model: ModelHandle) {
    let predict_model = model.clone();
    catalog.insert(PREDICT_IMPL, move |payload| {
        let request: InferenceRequest = serde_json::from_value(payload)?;
        let response = predict_model.0.lock().predict(&request)?;
        Ok(serde_json::to_value(response)?)
    });

    let transcribe_model = model.clone();
    catalog.insert(TRANSCRIBE_IMPL, move |payload| {
        let request: InferenceRequest = serde_json::from_value(payload)?;
        let response = transcribe_model.0.lock().predict(&request)?;
        Ok(Value::String(greedy_decode(&response)))
    });

    catalog.insert(UNLOAD_IMPL, move |payload| {
        let language: String = serde_json::from_value(payload)?;
        let unloaded = model.0.lock().unload(&language)?;
        Ok(Value::Bool(unloaded))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(index: usize, width: usize) -> Vec<f32> {
        let mut v = vec![0.0; width];
        v[index] = 1.0;
        v
    }

    #[test]
    fn greedy_decode_collapses_spaces_and_trims() {
        let letters = " abc".to_string();
        let steps = [0, 1, 0, 0, 2, 3, 0, 0];
        let response = InferenceResponse {
            letter_activations: steps.iter().map(|&i| one_hot(i, 4)).collect(),
            letters,
        };
        assert_eq!(greedy_decode(&response), "a bc");
    }

    #[test]
    fn greedy_decode_of_empty_response_is_empty() {
        let response = InferenceResponse {
            letter_activations: Vec::new(),
            letters: "ab".into(),
        };
        assert_eq!(greedy_decode(&response), "");
    }

    #[test]
    fn request_serializes_camel_case() {
        let req = InferenceRequest {
            waveform: vec![0.5],
            language: "de".into(),
        };
        let json = serde_json::to_value(&req).expect("serialize request");
        assert_eq!(json["language"], "de");
        assert_eq!(json["waveform"][0], 0.5);

        let resp = InferenceResponse {
            letter_activations: vec![vec![1.0]],
            letters: " ".into(),
        };
        let json = serde_json::to_value(&resp).expect("serialize response");
        assert!(json.get("letterActivations").is_some());
    }
}
