//! Dependency-aware update cycles for a fleet of containers.
//!
//! A cycle lists the fleet, asks the runtime which images are stale, pulls
//! every dependent of a stale container into the update set, and then stops
//! dependents before their dependencies and starts them in the reverse order.

pub mod client;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod executor;
pub mod filter;
pub mod graph;
pub mod io;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod update;

#[cfg(test)]
mod testing;

pub use client::RuntimeClient;
pub use container::Container;
pub use context::UpdateContext;
pub use error::{FleetError, Result, RuntimeError, RuntimeResult};
pub use filter::ContainerFilter;
pub use report::UpdateReport;
pub use update::{run_cycle, survey, Survey, UpdateParams};
