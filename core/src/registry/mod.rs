//! Per-resource registry: state machines, atomic claims, operator actions

pub mod store;

pub use store::{RegistryError, RegistryFilter, RegistryStore, ReplicationStatus};
