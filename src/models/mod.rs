//! # Data Models
//!
//! Device identity and accumulator-state data models shared by the
//! protocol and storage layers.
//!
//! - `device` - identifiers, key types, lifecycle status, device records
//! - `transition` - versioned accumulator state and transition records

pub mod device;
pub mod transition;

// Re-export common types at the models module level
pub use device::{DeviceId, DeviceRecord, DeviceStatus, KeyType};
pub use transition::{AccumulatorState, OpType, TransitionRecord};
