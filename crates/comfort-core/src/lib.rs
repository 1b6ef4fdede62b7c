//! Comfort core
//!
//! Device and sensor data model, notification types and the locked JSON
//! store shared by every actor of the comfort automation engine.

pub mod device;
pub mod notify;
pub mod persistence;

pub use device::{DeviceState, Document, Power, SensorReading};
pub use notify::{PendingUpdate, PendingUpdates, StatusSnapshot};
pub use persistence::{Resource, Store, StoreError};
