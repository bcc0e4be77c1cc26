//! Coordination core for dynamic, capacity-limited collections of
//! file-backed items embedded in a larger form: item lifecycle against a
//! remote store, bounded-concurrency file upload, drag-reorder
//! synchronization, and the terminal failure lockdown that ties them
//! together.

pub mod controller;
pub mod model;
pub mod page;
pub mod queue;
pub mod remote;
pub mod reorder;
pub mod store;
