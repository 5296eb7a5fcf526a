//! Glue between a dev server and the [`ChangeTracker`].
//!
//! [`HmrTiming`] owns one tracker per server session and exposes one method
//! per host event. Every method is infallible from the host's point of view:
//! bad input is logged and dropped, and metrics delivery runs detached so a
//! slow collector never holds up the HMR pipeline.

#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "watch")]
pub mod watch;

use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::client::inject_client_script;
use crate::config::TimingConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::protocol::{CompletionPayload, CompletionResponse, UpdateNotification};
use crate::core::tracker::{ChangeTracker, CompletionOutcome, TimingEntry};
use crate::metadata::MetadataProvider;
use crate::metrics::{HttpMetricsSink, Measurement, MetricsRecord, MetricsSink};

/// Status code and body written back for a completion callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReply {
    pub status: u16,
    pub body: CompletionResponse,
}

/// HMR timing for one dev-server session. Clones share the same registry.
#[derive(Clone)]
pub struct HmrTiming {
    config: Arc<TimingConfig>,
    clock: Arc<dyn Clock>,
    tracker: Arc<Mutex<ChangeTracker>>,
    metadata: Arc<MetadataProvider>,
    sink: Arc<dyn MetricsSink>,
    build_started_at: Arc<Mutex<Option<u64>>>,
}

impl HmrTiming {
    /// Session that delivers to `config.endpoint` over HTTP.
    pub fn new(config: TimingConfig) -> Self {
        let sink = Arc::new(HttpMetricsSink::new(config.endpoint.clone()));
        let metadata = Arc::new(MetadataProvider::new(config.project_root.clone()));
        Self::with_parts(config, Arc::new(SystemClock), metadata, sink)
    }

    pub fn with_parts(
        config: TimingConfig,
        clock: Arc<dyn Clock>,
        metadata: Arc<MetadataProvider>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let tracker =
            ChangeTracker::with_clock(config.root_str(), clock.clone()).max_entries(config.max_entries);
        Self {
            config: Arc::new(config),
            clock,
            tracker: Arc::new(Mutex::new(tracker)),
            metadata,
            sink,
            build_started_at: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        self.tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Watcher "change" event.
    pub fn on_file_change(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_string_lossy();
        self.tracker().record_change(&path);
    }

    /// Raw message from the live-update channel. Returns how many cycles
    /// moved to `HmrStarted`.
    pub fn on_update_message(&self, raw: &str) -> usize {
        match UpdateNotification::parse(raw) {
            Ok(notification) => self.on_update(&notification),
            Err(e) => {
                log::error!("[vite-timing] Error processing WS message: {}", e);
                0
            }
        }
    }

    /// Already-parsed live-update notification, for hosts that hook the
    /// send path directly.
    pub fn on_update(&self, notification: &UpdateNotification) -> usize {
        self.tracker().apply_notification(notification)
    }

    /// The host's per-update hook resolved `modules` for the changed `file`.
    pub fn on_hot_update<S: AsRef<str>>(&self, file: impl AsRef<Path>, modules: &[S]) {
        let file = file.as_ref().to_string_lossy();
        if !self.tracker().record_module_count(&file, modules.len()) {
            log::debug!("[vite-timing] Module count for untracked file {}", file);
        }
    }

    /// Completion callback body as received over HTTP.
    pub fn handle_completion_body(&self, body: &[u8]) -> CompletionReply {
        match CompletionPayload::parse(body) {
            Ok(payload) => CompletionReply {
                status: 200,
                body: self.complete(&payload),
            },
            Err(e) => {
                log::warn!("[vite-timing] Rejected completion callback: {}", e);
                CompletionReply {
                    status: 400,
                    body: CompletionResponse::invalid(&e),
                }
            }
        }
    }

    /// Finalizes the matching cycle and ships its record in the background.
    pub fn complete(&self, payload: &CompletionPayload) -> CompletionResponse {
        let outcome = self.tracker().complete(payload);
        match outcome {
            CompletionOutcome::Completed { timings, .. } => {
                let elapsed = timings.total_time;
                self.dispatch(elapsed, Measurement::Hmr(timings));
                CompletionResponse::completed()
            }
            CompletionOutcome::NoEntry { file } => {
                log::warn!("[vite-timing] No timing entry found for {}", file);
                CompletionResponse::no_entry(file)
            }
        }
    }

    /// Marks the start of a production build.
    pub fn on_build_start(&self) {
        *self.build_started() = Some(self.clock.now_ms());
    }

    /// Marks the end of a production build and ships its duration.
    pub fn on_build_end(&self) {
        let Some(started) = self.build_started().take() else {
            log::debug!("[vite-timing] Build ended without a recorded start");
            return;
        };
        let build_time = self.clock.now_ms().saturating_sub(started);
        self.dispatch(build_time as f64, Measurement::Build { build_time });
    }

    fn build_started(&self) -> MutexGuard<'_, Option<u64>> {
        self.build_started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dispatch(&self, elapsed_ms: f64, measurement: Measurement) {
        let metadata = self.metadata.clone();
        let sink = self.sink.clone();
        let delivery = async move {
            let common = metadata.common_metadata(elapsed_ms, None).await;
            sink.send(MetricsRecord::new(common, measurement)).await;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(delivery);
            }
            Err(_) => log::error!("[vite-timing] Failed to send metrics: no async runtime"),
        }
    }

    /// Injects the client script in development; returns `html` untouched
    /// otherwise.
    pub fn transform_index_html<'a>(&self, html: &'a str) -> Cow<'a, str> {
        inject_client_script(html, self.config.mode)
    }

    /// Copy of the open cycles. `None` outside development.
    pub fn debug_entries(&self) -> Option<Vec<TimingEntry>> {
        if !self.config.mode.is_development() {
            return None;
        }
        Some(self.tracker().entries().to_vec())
    }

    pub fn open_cycles(&self) -> usize {
        self.tracker().len()
    }

    /// Drops cycles older than `stale_after`; returns how many went.
    pub fn evict_stale(&self) -> usize {
        self.tracker().evict_stale(self.config.stale_after).len()
    }

    /// Runs [`Self::evict_stale`] every `sweep_interval` until aborted.
    pub fn spawn_eviction_sweep(&self) -> JoinHandle<()> {
        let timing = self.clone();
        tokio::spawn(async move {
            let period = timing.config.sweep_interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = timing.evict_stale();
                if evicted > 0 {
                    log::debug!("[vite-timing] Sweep evicted {} entries", evicted);
                }
            }
        })
    }

    /// Feeds every message of the host's update channel into
    /// [`Self::on_update_message`] until the stream ends.
    pub fn spawn_update_listener<S>(&self, messages: S) -> JoinHandle<()>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let timing = self.clone();
        tokio::spawn(async move {
            futures::pin_mut!(messages);
            while let Some(raw) = messages.next().await {
                timing.on_update_message(&raw);
            }
            log::debug!("[vite-timing] Update channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerMode;
    use crate::core::clock::ManualClock;
    use crate::core::tracker::EntryStatus;
    use crate::metadata::VcsProbe;
    use crate::metrics::MemorySink;
    use async_trait::async_trait;

    struct NoVcs;

    #[async_trait]
    impl VcsProbe for NoVcs {
        async fn query(&self, _args: &[&str]) -> Option<String> {
            None
        }
    }

    fn timing(mode: ServerMode) -> (HmrTiming, ManualClock, Arc<MemorySink>) {
        let clock = ManualClock::new(1000);
        let sink = Arc::new(MemorySink::new());
        let config = TimingConfig::default()
            .with_project_root("/project/root")
            .with_mode(mode);
        let timing = HmrTiming::with_parts(
            config,
            Arc::new(clock.clone()),
            Arc::new(MetadataProvider::with_probe(Arc::new(NoVcs))),
            sink.clone(),
        );
        (timing, clock, sink)
    }

    #[tokio::test]
    async fn test_malformed_ws_message_is_swallowed() {
        let (timing, _, _) = timing(ServerMode::Development);
        timing.on_file_change("/project/root/src/a.ts");

        assert_eq!(timing.on_update_message("invalid json"), 0);
        let entries = timing.debug_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Detected);
    }

    /// Keeps every log record together with the thread that emitted it, so
    /// tests running in parallel only see their own.
    struct RecordingLogger {
        records: Mutex<Vec<(std::thread::ThreadId, log::Level, String)>>,
    }

    impl log::Log for RecordingLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            self.records.lock().unwrap().push((
                std::thread::current().id(),
                record.level(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    static LOGGER: RecordingLogger = RecordingLogger {
        records: Mutex::new(Vec::new()),
    };

    fn logged_on_this_thread(level: log::Level) -> Vec<String> {
        static INSTALL: std::sync::Once = std::sync::Once::new();
        INSTALL.call_once(|| {
            log::set_logger(&LOGGER).unwrap();
            log::set_max_level(log::LevelFilter::Trace);
        });
        let me = std::thread::current().id();
        LOGGER
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(thread, lvl, _)| *thread == me && *lvl == level)
            .map(|(_, _, message)| message.clone())
            .collect()
    }

    #[test]
    fn test_malformed_ws_message_is_logged() {
        let (timing, _, _) = timing(ServerMode::Development);
        let before = logged_on_this_thread(log::Level::Error).len();

        assert_eq!(timing.on_update_message("invalid json"), 0);
        assert_eq!(timing.on_update_message(r#"{"type":"connected"}"#), 0);

        let errors = logged_on_this_thread(log::Level::Error);
        assert_eq!(errors.len(), before + 1);
        assert!(errors[before].starts_with("[vite-timing] Error processing WS message:"));
    }

    #[tokio::test]
    async fn test_completion_body_replies() {
        let (timing, _, sink) = timing(ServerMode::Development);

        let reply = timing.handle_completion_body(b"{not json");
        assert_eq!(reply.status, 400);
        assert!(!reply.body.success);

        let reply = timing.handle_completion_body(br#"{"file":"/src/a.ts","clientTimestamp":5}"#);
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, CompletionResponse::no_entry("src/a.ts"));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_build_timing_record() {
        let (timing, clock, sink) = timing(ServerMode::Production);
        timing.on_build_end();

        timing.on_build_start();
        clock.advance(4200);
        timing.on_build_end();

        let records = sink.wait_for(1, Duration::from_secs(2)).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].measurement, Measurement::Build { build_time: 4200 });
        assert_eq!(records[0].metadata.elapsed_ms, 4200.0);
    }

    #[tokio::test]
    async fn test_debug_entries_hidden_in_production() {
        let (timing, _, _) = timing(ServerMode::Production);
        timing.on_file_change("/project/root/src/a.ts");
        assert!(timing.debug_entries().is_none());
        assert_eq!(timing.open_cycles(), 1);
        assert_eq!(timing.transform_index_html("<head></head>"), "<head></head>");
    }

    #[tokio::test]
    async fn test_update_listener_consumes_stream() {
        let (timing, _, _) = timing(ServerMode::Development);
        timing.on_file_change("/project/root/src/a.ts");

        let messages = futures::stream::iter(vec![
            "garbage".to_string(),
            r#"{"type":"connected"}"#.to_string(),
            r#"{"type":"update","updates":[{"path":"/src/a.ts"}]}"#.to_string(),
        ]);
        timing.spawn_update_listener(messages).await.unwrap();

        let entries = timing.debug_entries().unwrap();
        assert_eq!(entries[0].status, EntryStatus::HmrStarted);
    }

    #[tokio::test]
    async fn test_evict_stale_uses_configured_age() {
        let (timing, clock, _) = timing(ServerMode::Development);
        timing.on_file_change("/project/root/src/a.ts");
        clock.advance(30_000);
        assert_eq!(timing.evict_stale(), 0);
        let debug_before = logged_on_this_thread(log::Level::Debug).len();
        let info_before = logged_on_this_thread(log::Level::Info).len();
        clock.advance(31_000);
        assert_eq!(timing.evict_stale(), 1);
        assert_eq!(timing.open_cycles(), 0);

        let debug = logged_on_this_thread(log::Level::Debug);
        assert!(
            debug[debug_before..]
                .iter()
                .any(|m| m.starts_with("[vite-timing] Evicted stale entry src/a.ts@1000#"))
        );
        assert_eq!(logged_on_this_thread(log::Level::Info).len(), info_before);
    }
}
