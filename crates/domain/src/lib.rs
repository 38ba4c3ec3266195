//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod gate;
mod resource;
mod timestamp;
mod trigger;

pub use gate::{GateDecision, LockState};
pub use resource::{GateResources, ObjectKey, ObjectPath, Scope};
pub use timestamp::{decode_timestamp, encode_timestamp};
pub use trigger::TriggerMessage;
