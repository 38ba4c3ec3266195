//! Application services and ports.

#![forbid(unsafe_code)]

mod coalescing_gate;
mod delivery_ports;
mod exclusive_lock;
mod gate_config;
mod lease_ports;

#[cfg(test)]
mod test_support;

pub use coalescing_gate::{CoalescingGate, GateOutcome};
pub use delivery_ports::TriggerQueue;
pub use exclusive_lock::{ExclusiveLock, LockHandle};
pub use gate_config::GateConfig;
pub use lease_ports::{LeaseStore, LeaseToken, StoreObject};
