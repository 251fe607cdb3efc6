pub mod angles;
pub mod device;
pub mod registry;
pub mod sequencer;

pub use angles::{shortest_delta, wrap_degrees};
pub use device::{Rotator, Snapshot, CAN_REVERSE};
pub use registry::{DeviceError, RotatorBank};
pub use sequencer::TransactionSequencer;
