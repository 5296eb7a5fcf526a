//! The HMR cycle registry and the types it is driven by.
//!
//! - [`tracker`]: the per-change state machine
//! - [`protocol`]: inbound and outbound wire shapes
//! - [`clock`]: server timestamps
//! - [`path`]: path normalization shared by all event sources
//! - [`error`]: the crate's error type

pub mod clock;
pub mod error;
pub mod path;
pub mod protocol;
pub mod tracker;
