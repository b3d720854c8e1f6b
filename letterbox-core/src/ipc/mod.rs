//! Wire types: the dispatcher/worker protocol and observable events.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so hosts can
//! forward them as JSON.

pub mod events;
pub mod protocol;
