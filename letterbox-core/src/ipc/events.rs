//! Notifications published by the sample buffer and the capture session.
//!
//! Both are delivered over `tokio::sync::broadcast` channels so any number of
//! observers (visualisers, the submit-for-inference step) can subscribe
//! without the producer knowing about them. Payloads serialise to camelCase
//! JSON for hosts that forward them to a UI.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Buffer events
// ---------------------------------------------------------------------------

/// Change notifications emitted by [`crate::buffering::ring::RingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BufferEvent {
    /// Elements in `[start, end)` were written.
    #[serde(rename_all = "camelCase")]
    DataChanged { start: usize, end: usize },
    /// The logical length was set explicitly.
    #[serde(rename_all = "camelCase")]
    LengthChanged { length: usize, previous: usize },
    /// The logical length dropped to zero.
    Empty,
    /// The logical length reached capacity.
    Full,
}

// ---------------------------------------------------------------------------
// Capture events
// ---------------------------------------------------------------------------

/// State of an [`crate::capture::AudioCaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureState {
    /// Not retaining incoming samples.
    Idle,
    /// Keeping a sliding lookback window of recent samples.
    PreRecording,
    /// Appending every incoming sample until the buffer is full.
    Recording,
}

/// Lifecycle notifications emitted by the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CaptureEvent {
    StateChanged {
        state: CaptureState,
        previous: CaptureState,
    },
    PreRecordingStarted,
    PreRecordingStopped,
    RecordingStarted,
    RecordingStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_event_serializes_with_type_tag() {
        let json = serde_json::to_value(BufferEvent::DataChanged { start: 3, end: 9 })
            .expect("serialize buffer event");
        assert_eq!(json["type"], "dataChanged");
        assert_eq!(json["start"], 3);
        assert_eq!(json["end"], 9);

        let json = serde_json::to_value(BufferEvent::Full).expect("serialize full");
        assert_eq!(json["type"], "full");
    }

    #[test]
    fn state_changed_serializes_camel_case_states() {
        let event = CaptureEvent::StateChanged {
            state: CaptureState::PreRecording,
            previous: CaptureState::Idle,
        };
        let json = serde_json::to_value(event).expect("serialize capture event");
        assert_eq!(json["type"], "stateChanged");
        assert_eq!(json["state"], "preRecording");
        assert_eq!(json["previous"], "idle");

        let back: CaptureEvent = serde_json::from_value(json).expect("deserialize capture event");
        assert_eq!(back, event);
    }

    #[test]
    fn capture_state_rejects_unknown_values() {
        let err = serde_json::from_str::<CaptureState>(r#""PLAYING""#);
        assert!(err.is_err());
    }
}
