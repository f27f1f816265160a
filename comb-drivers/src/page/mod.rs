//! Read-only view of the remote page.
pub mod exec;
pub mod geometry;
pub mod probe;
pub mod scripts;
pub mod selectors;
pub mod snapshot;
