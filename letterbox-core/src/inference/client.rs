//! Caller-side recognizer bound to a dispatcher.

use tracing::debug;

use crate::dispatch::{MethodProxy, TaskDispatcher};
use crate::error::Result;
use crate::inference::{InferenceRequest, InferenceResponse, PREDICT_IMPL, TRANSCRIBE_IMPL, UNLOAD_IMPL};

/// Typed front for a worker serving a model added with
/// [`register_model`](super::register_model).
#[derive(Debug, Clone)]
pub struct Recognizer {
    predict: MethodProxy,
    transcribe: MethodProxy,
    unload: MethodProxy,
}

impl Recognizer {
    /// Register `predict`, `transcribe` and `unload` in the worker.
    pub async fn register(dispatcher: &TaskDispatcher) -> Result<Self> {
        let predict = dispatcher.register_method("predict", PREDICT_IMPL).await?;
        let transcribe = dispatcher.register_method("transcribe", TRANSCRIBE_IMPL).await?;
        let unload = dispatcher.register_method("unload", UNLOAD_IMPL).await?;
        Ok(Self {
            predict,
            transcribe,
            unload,
        })
    }

    pub async fn predict(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        debug!(
            samples = request.waveform.len(),
            language = request.language.as_str(),
            "predict"
        );
        self.predict.call(request).await
    }

    /// Prediction followed by greedy decoding, done in the worker.
    pub async fn transcribe(&self, request: &InferenceRequest) -> Result<String> {
        self.transcribe.call(request).await
    }

    pub async fn unload(&self, language: &str) -> Result<bool> {
        self.unload.call(language).await
    }
}
