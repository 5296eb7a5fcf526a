//! The HMR cycle registry.
//!
//! Each file change opens a [`TimingEntry`] that moves
//! `Detected -> HmrStarted -> Complete`. Three unordered sources drive it:
//! the file watcher ([`ChangeTracker::record_change`]), the live-update
//! channel ([`ChangeTracker::mark_hmr_started`]) and the browser's
//! completion callback ([`ChangeTracker::complete`]). Module counts from the
//! host's update hook land independently through
//! [`ChangeTracker::record_module_count`].
//!
//! Entries are keyed by `(file, changeDetectedAt, seq)`, so two edits of the
//! same file before the first cycle finishes are tracked side by side and
//! completed oldest-first. The registry is a flat, insertion-ordered list
//! scanned linearly: concurrent cycles during interactive editing number in
//! the single digits, and nothing here is tuned for more.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::clock::{Clock, SystemClock};
use crate::core::path::{normalize_client_path, normalize_path};
use crate::core::protocol::{CompletionPayload, UpdateNotification};

/// Default hard capacity of the registry.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryStatus {
    Detected,
    HmrStarted,
    /// Terminal. Entries are removed as soon as they reach it, so this
    /// only shows up on entries handed back by [`ChangeTracker::complete`].
    Complete,
}

/// Identity of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryKey {
    pub file: String,
    pub detected_at: u64,
    pub seq: u64,
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.file, self.detected_at, self.seq)
    }
}

/// One in-flight change-to-completion timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingEntry {
    pub key: EntryKey,
    pub status: EntryStatus,
    pub change_detected_at: u64,
    pub hmr_started_at: Option<u64>,
    /// Server clock.
    pub hmr_completed_at: Option<u64>,
    /// Client clock; never compared against server stamps without care.
    pub client_completed_at: Option<f64>,
    pub module_count: Option<usize>,
}

impl TimingEntry {
    pub fn file(&self) -> &str {
        &self.key.file
    }

    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.change_detected_at)
    }
}

/// Derived timings of a finished cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleTimings {
    pub file: String,
    /// `clientCompletedAt - changeDetectedAt`, across clock domains.
    pub total_time: f64,
    /// `hmrCompletedAt - changeDetectedAt`, server clock only.
    pub server_processing_time: u64,
    pub module_count: usize,
    pub phases: PhaseBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBreakdown {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_to_start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_to_complete: Option<u64>,
}

/// Result of the completion transition.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Completed {
        entry: TimingEntry,
        timings: CycleTimings,
    },
    NoEntry {
        file: String,
    },
}

/// Registry of open HMR cycles.
///
/// Not synchronized: whoever owns it serializes the transitions (the host
/// binding keeps it behind a mutex).
pub struct ChangeTracker {
    root: String,
    clock: Arc<dyn Clock>,
    entries: Vec<TimingEntry>,
    next_seq: u64,
    max_entries: usize,
}

impl ChangeTracker {
    pub fn new(root: impl Into<String>) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
            entries: Vec::new(),
            next_seq: 0,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Open cycles, oldest first.
    pub fn entries(&self) -> &[TimingEntry] {
        &self.entries
    }

    pub fn normalize(&self, path: &str) -> String {
        normalize_path(&self.root, path)
    }

    /// Watcher fired for `path`: opens a new `Detected` cycle.
    ///
    /// An unfinished cycle for the same file is left alone.
    pub fn record_change(&mut self, path: &str) -> EntryKey {
        let file = self.normalize(path);
        let now = self.clock.now_ms();

        if self.entries.len() >= self.max_entries {
            let dropped = self.entries.remove(0);
            log::warn!(
                "[vite-timing] Registry full ({} entries), dropping oldest entry {}",
                self.max_entries,
                dropped.key
            );
        }

        let key = EntryKey {
            file,
            detected_at: now,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        log::debug!("[vite-timing] Change detected: {}", key);
        self.entries.push(TimingEntry {
            key: key.clone(),
            status: EntryStatus::Detected,
            change_detected_at: now,
            hmr_started_at: None,
            hmr_completed_at: None,
            client_completed_at: None,
            module_count: None,
        });
        key
    }

    /// Server began pushing an update for each of `paths`.
    ///
    /// For every path, the oldest `Detected` entry of that file moves to
    /// `HmrStarted`. Returns how many entries transitioned.
    pub fn mark_hmr_started<S: AsRef<str>>(&mut self, paths: &[S]) -> usize {
        let now = self.clock.now_ms();
        let mut started = 0;

        for path in paths {
            let file = normalize_client_path(&self.root, path.as_ref());
            let entry = self
                .entries
                .iter_mut()
                .find(|e| e.key.file == file && e.status == EntryStatus::Detected);

            if let Some(entry) = entry {
                entry.status = EntryStatus::HmrStarted;
                entry.hmr_started_at = Some(now);
                started += 1;
                log::debug!("[vite-timing] HMR started: {}", entry.key);
            }
        }
        started
    }

    /// Applies a parsed live-update notification.
    pub fn apply_notification(&mut self, notification: &UpdateNotification) -> usize {
        let paths = notification.paths();
        if paths.is_empty() {
            return 0;
        }
        self.mark_hmr_started(&paths)
    }

    /// The host's module graph resolved `count` modules for `path`.
    ///
    /// Applies to the oldest entry of that file whatever its status; last
    /// write wins.
    pub fn record_module_count(&mut self, path: &str, count: usize) -> bool {
        let file = self.normalize(path);
        match self.entries.iter_mut().find(|e| e.key.file == file) {
            Some(entry) => {
                entry.module_count = Some(count);
                true
            }
            None => false,
        }
    }

    /// Browser finished applying the update for `payload.file`.
    ///
    /// Only an entry in `HmrStarted` can complete; a callback for an entry
    /// still in `Detected` is treated as spurious. On a match the entry is
    /// removed and its timings are returned.
    pub fn complete(&mut self, payload: &CompletionPayload) -> CompletionOutcome {
        let file = normalize_client_path(&self.root, &payload.file);
        let position = self
            .entries
            .iter()
            .position(|e| e.key.file == file && e.status == EntryStatus::HmrStarted);

        let Some(position) = position else {
            log::debug!("[vite-timing] No timing entry found for {}", file);
            return CompletionOutcome::NoEntry { file };
        };

        let mut entry = self.entries.remove(position);
        let now = self.clock.now_ms().max(entry.change_detected_at);
        entry.status = EntryStatus::Complete;
        entry.hmr_completed_at = Some(now);
        entry.client_completed_at = Some(payload.client_timestamp);

        let total_time = payload.client_timestamp - entry.change_detected_at as f64;
        if total_time < 0.0 {
            log::warn!(
                "[vite-timing] Client clock is behind the server for {} ({} ms)",
                entry.key,
                total_time
            );
        }

        let timings = CycleTimings {
            file: entry.key.file.clone(),
            total_time,
            server_processing_time: now - entry.change_detected_at,
            module_count: entry.module_count.unwrap_or(0),
            phases: PhaseBreakdown {
                detect_to_start: entry
                    .hmr_started_at
                    .map(|t| t.saturating_sub(entry.change_detected_at)),
                start_to_complete: entry.hmr_started_at.map(|t| now.saturating_sub(t)),
            },
        };

        log::debug!(
            "[vite-timing] HMR complete: {} (total {} ms, server {} ms)",
            entry.key,
            timings.total_time,
            timings.server_processing_time
        );
        CompletionOutcome::Completed { entry, timings }
    }

    /// Drops every entry older than `max_age` and hands them back.
    pub fn evict_stale(&mut self, max_age: Duration) -> Vec<TimingEntry> {
        let now = self.clock.now_ms();
        let max_age = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);

        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.age_ms(now) > max_age);
        self.entries = fresh;

        for entry in &stale {
            log::debug!(
                "[vite-timing] Evicted stale entry {} ({:?} after {} ms)",
                entry.key,
                entry.status,
                entry.age_ms(now)
            );
        }
        stale
    }
}
