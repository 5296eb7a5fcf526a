//! # vite-timing
//!
//! Measures how long hot-module-replacement takes in a development server,
//! from the moment a file is saved to the moment the browser has applied
//! the update, and ships one metrics record per cycle.
//!
//! ## Features
//!
//! - **Cycle tracking**: correlates watcher events, live-update notifications
//!   and browser callbacks into one timeline per change
//! - **Overlapping edits**: two saves of the same file before the first
//!   update lands are tracked side by side
//! - **Never in the way**: bad payloads are logged and dropped, delivery is
//!   detached and best effort
//! - **Bounded**: abandoned cycles are evicted after a configurable age
//! - **Optional adapters**: axum routes (`server`) and a notify-based file
//!   watcher (`watch`), both on by default
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vite_timing::prelude::*;
//!
//! # async fn run() {
//! let timing = HmrTiming::new(TimingConfig::from_env().with_project_root("/project/root"));
//! let _sweep = timing.spawn_eviction_sweep();
//!
//! // Wire these to the host's hooks.
//! timing.on_file_change("/project/root/src/main.ts");
//! timing.on_hot_update("/project/root/src/main.ts", &["/src/main.ts"]);
//! timing.on_update_message(r#"{"type":"update","updates":[{"path":"/src/main.ts"}]}"#);
//! let reply = timing.handle_completion_body(br#"{"file":"/src/main.ts","clientTimestamp":1700000000000}"#);
//! assert!(reply.body.success);
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`core`](crate::core): the cycle registry, wire types, clocks and path handling
//! - [`metadata`]: environment snapshot attached to every record
//! - [`metrics`]: record shape and delivery sinks
//! - [`client`]: browser script and HTML injection
//! - [`host`]: bindings to the dev server's events
//! - [`config`]: configuration and environment overrides

// ============================================================================
// Modules
// ============================================================================

pub mod client;
pub mod config;
pub mod core;
pub mod host;
pub mod metadata;
pub mod metrics;

// ============================================================================
// Public Re-exports
// ============================================================================

// Core types
pub use crate::core::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::error::TimingError;
pub use crate::core::protocol::{CompletionPayload, CompletionResponse, UpdateNotification, UpdateTarget};
pub use crate::core::tracker::{
    ChangeTracker, CompletionOutcome, CycleTimings, EntryKey, EntryStatus, PhaseBreakdown,
    TimingEntry,
};

// Configuration
pub use config::{ServerMode, TimingConfig};

// Metadata and delivery
pub use metadata::{CommonMetadata, GitCli, MetadataProvider, MetadataSnapshot, VcsProbe};
pub use metrics::{HttpMetricsSink, Measurement, MemorySink, MetricsRecord, MetricsSink};

// Host bindings
pub use client::{COMPLETION_PATH, inject_client_script};
pub use host::{CompletionReply, HmrTiming};

#[cfg(feature = "server")]
pub use host::server::router;

#[cfg(feature = "watch")]
pub use host::watch::FileWatcher;

// ============================================================================
// Prelude
// ============================================================================

/// Everything a host integration usually needs.
///
/// # Example
/// ```rust
/// use vite_timing::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        ChangeTracker, CompletionPayload, CompletionResponse, HmrTiming, MetricsRecord,
        MetricsSink, ServerMode, TimingConfig, TimingError, UpdateNotification,
    };

    #[cfg(feature = "server")]
    pub use super::router;

    #[cfg(feature = "watch")]
    pub use super::FileWatcher;
}

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
