//! Messages exchanged between the dispatcher and its worker.
//!
//! | Direction | Message |
//! |-----------|---------|
//! | dispatcher → worker | [`WorkerRequest`] |
//! | worker → dispatcher | [`WorkerReply`] |
//!
//! Payloads are `serde_json::Value` so the dispatcher stays agnostic of what
//! a method consumes or returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::slots::Slot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub slot: Slot,
    pub method: String,
    pub payload: Value,
    /// When set, `payload` names the catalog implementation to bind to `method`.
    #[serde(default)]
    pub is_registration: bool,
}

impl WorkerRequest {
    pub fn call(slot: Slot, method: impl Into<String>, payload: Value) -> Self {
        Self {
            slot,
            method: method.into(),
            payload,
            is_registration: false,
        }
    }

    pub fn registration(slot: Slot, method: impl Into<String>, implementation: &str) -> Self {
        Self {
            slot,
            method: method.into(),
            payload: Value::String(implementation.to_string()),
            is_registration: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReply {
    pub slot: Slot,
    /// Diagnostic only; correlation uses `slot`.
    pub method: String,
    pub is_error: bool,
    pub result: Value,
}

impl WorkerReply {
    pub fn success(slot: Slot, method: impl Into<String>, result: Value) -> Self {
        Self {
            slot,
            method: method.into(),
            is_error: false,
            result,
        }
    }

    pub fn failure(slot: Slot, method: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            slot,
            method: method.into(),
            is_error: true,
            result: Value::String(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_camel_case_fields() {
        let req = WorkerRequest::registration(4, "transcribe", "stub.transcribe");
        let json = serde_json::to_value(&req).expect("serialize request");
        assert_eq!(json["slot"], 4);
        assert_eq!(json["method"], "transcribe");
        assert_eq!(json["payload"], "stub.transcribe");
        assert_eq!(json["isRegistration"], true);
    }

    #[test]
    fn request_defaults_to_a_plain_call() {
        let req: WorkerRequest =
            serde_json::from_value(json!({"slot": 1, "method": "echo", "payload": [1, 2]}))
                .expect("deserialize request");
        assert!(!req.is_registration);
        assert_eq!(req.payload, json!([1, 2]));
    }

    #[test]
    fn failure_reply_carries_error_text() {
        let reply = WorkerReply::failure(2, "predict", "boom");
        let json = serde_json::to_value(&reply).expect("serialize reply");
        assert_eq!(json["isError"], true);
        assert_eq!(json["result"], "boom");
    }
}
