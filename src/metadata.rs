//! Environment facts attached to every metrics record.
//!
//! Static facts (machine, user, repository) are gathered once per
//! [`MetadataProvider`] and cached for its lifetime; a branch switch is not
//! observed until the dev server restarts. Per-record facts (id, capture
//! time, identifier, elapsed time) are fresh on every call.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::process::Command;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Environment variable consulted for the record identifier.
pub const TASK_NAME_ENV: &str = "npm_lifecycle_event";

/// Process-wide facts, computed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSnapshot {
    pub user: Option<String>,
    pub cpu_count: usize,
    pub cpu_model: Option<String>,
    pub hostname: Option<String>,
    pub platform: String,
    pub arch: String,
    pub os_version: Option<String>,
    pub total_memory: u64,
    pub runtime_version: String,
    pub repo_url: Option<String>,
    pub repo_name: Option<String>,
    pub branch: Option<String>,
    pub commit_hash: Option<String>,
}

/// The static snapshot plus the facts that change per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonMetadata {
    pub id: Uuid,
    pub timestamp: i64,
    pub iso_time: String,
    pub identifier: String,
    pub elapsed_ms: f64,
    #[serde(flatten)]
    pub snapshot: MetadataSnapshot,
}

/// Runs version-control queries. Any failure is reported as `None`.
#[async_trait]
pub trait VcsProbe: Send + Sync {
    async fn query(&self, args: &[&str]) -> Option<String>;
}

/// [`VcsProbe`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    dir: PathBuf,
}

impl GitCli {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl VcsProbe for GitCli {
    async fn query(&self, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| log::debug!("[vite-timing] git {:?} failed: {}", args, e))
            .ok()?;

        if !output.status.success() {
            log::debug!("[vite-timing] git {:?} exited with {}", args, output.status);
            return None;
        }

        let value = String::from_utf8(output.stdout).ok()?.trim().to_string();
        if value.is_empty() { None } else { Some(value) }
    }
}

/// Hands out metadata, gathering the static part on first use.
pub struct MetadataProvider {
    vcs: Arc<dyn VcsProbe>,
    snapshot: OnceCell<MetadataSnapshot>,
}

impl MetadataProvider {
    /// Provider that queries `git` inside `repo_dir`.
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self::with_probe(Arc::new(GitCli::new(repo_dir)))
    }

    pub fn with_probe(vcs: Arc<dyn VcsProbe>) -> Self {
        Self {
            vcs,
            snapshot: OnceCell::new(),
        }
    }

    /// The cached snapshot, collecting it on the first call.
    pub async fn static_snapshot(&self) -> &MetadataSnapshot {
        self.snapshot
            .get_or_init(|| collect_snapshot(self.vcs.as_ref()))
            .await
    }

    pub async fn common_metadata(&self, elapsed_ms: f64, identifier: Option<&str>) -> CommonMetadata {
        let snapshot = self.static_snapshot().await.clone();
        let now = chrono::Utc::now();

        CommonMetadata {
            id: Uuid::new_v4(),
            timestamp: now.timestamp_millis(),
            iso_time: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            identifier: resolve_identifier(identifier, std::env::var(TASK_NAME_ENV).ok()),
            elapsed_ms,
            snapshot,
        }
    }
}

/// Explicit argument, then the task-name environment value, then `"unknown"`.
pub fn resolve_identifier(explicit: Option<&str>, from_env: Option<String>) -> String {
    explicit
        .map(str::to_string)
        .or(from_env)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `git@host:org/repo.git` and `https://host/org/repo` both give `repo`.
pub fn repo_name_from_url(url: &str) -> Option<String> {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?
        .trim_end_matches(".git");
    if last.is_empty() { None } else { Some(last.to_string()) }
}

async fn collect_snapshot(vcs: &dyn VcsProbe) -> MetadataSnapshot {
    let sys = System::new_with_specifics(
        RefreshKind::nothing()
            .with_memory(MemoryRefreshKind::everything())
            .with_cpu(CpuRefreshKind::everything()),
    );

    let cpu_count = match sys.cpus().len() {
        0 => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        n => n,
    };
    let cpu_model = sys
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty());

    let repo_url = vcs.query(&["config", "--get", "remote.origin.url"]).await;
    let repo_name = repo_url.as_deref().and_then(repo_name_from_url);
    let branch = vcs.query(&["rev-parse", "--abbrev-ref", "HEAD"]).await;
    let commit_hash = vcs.query(&["rev-parse", "HEAD"]).await;

    MetadataSnapshot {
        user: Some(whoami::username()).filter(|u| !u.is_empty()),
        cpu_count,
        cpu_model,
        hostname: System::host_name(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        os_version: System::long_os_version(),
        total_memory: sys.total_memory(),
        runtime_version: format!("{}/{}", crate::NAME, crate::VERSION),
        repo_url,
        repo_name,
        branch,
        commit_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VcsProbe for CountingProbe {
        async fn query(&self, args: &[&str]) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match args {
                ["config", ..] => Some("git@github.com:acme/widgets.git".to_string()),
                ["rev-parse", "--abbrev-ref", "HEAD"] => Some("main".to_string()),
                ["rev-parse", "HEAD"] => Some("0123abcd".to_string()),
                _ => None,
            }
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl VcsProbe for FailingProbe {
        async fn query(&self, _args: &[&str]) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_memoized() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
        });
        let provider = MetadataProvider::with_probe(probe.clone());

        let first = provider.static_snapshot().await.clone();
        let calls = probe.calls.load(Ordering::SeqCst);
        assert_eq!(calls, 3);

        let second = provider.static_snapshot().await;
        assert_eq!(&first, second);
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls);

        assert_eq!(first.repo_name.as_deref(), Some("widgets"));
        assert_eq!(first.branch.as_deref(), Some("main"));
        assert_eq!(first.commit_hash.as_deref(), Some("0123abcd"));
        assert!(first.cpu_count >= 1);
    }

    #[tokio::test]
    async fn test_vcs_failure_maps_to_none() {
        let provider = MetadataProvider::with_probe(Arc::new(FailingProbe));
        let snapshot = provider.static_snapshot().await;
        assert!(snapshot.repo_url.is_none());
        assert!(snapshot.repo_name.is_none());
        assert!(snapshot.commit_hash.is_none());
    }

    #[tokio::test]
    async fn test_git_cli_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        // Either git is missing or the directory is not a repository.
        assert!(git.query(&["rev-parse", "HEAD"]).await.is_none());
    }

    #[tokio::test]
    async fn test_common_metadata_fresh_per_call() {
        let provider = MetadataProvider::with_probe(Arc::new(FailingProbe));
        let a = provider.common_metadata(12.5, Some("dev")).await;
        let b = provider.common_metadata(3.0, Some("dev")).await;
        assert_ne!(a.id, b.id);
        assert_eq!(a.identifier, "dev");
        assert_eq!(a.elapsed_ms, 12.5);
        assert_eq!(a.snapshot, b.snapshot);
    }

    #[test]
    fn test_resolve_identifier() {
        assert_eq!(resolve_identifier(Some("build"), Some("dev".into())), "build");
        assert_eq!(resolve_identifier(None, Some("dev".into())), "dev");
        assert_eq!(resolve_identifier(None, None), "unknown");
        assert_eq!(resolve_identifier(None, Some("  ".into())), "unknown");
    }

    #[test]
    fn test_repo_name_from_url() {
        assert_eq!(
            repo_name_from_url("git@github.com:acme/widgets.git").as_deref(),
            Some("widgets")
        );
        assert_eq!(
            repo_name_from_url("https://github.com/acme/widgets/").as_deref(),
            Some("widgets")
        );
        assert_eq!(repo_name_from_url(""), None);
    }
}
