//! Follow-up work chained after a run.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::TtlCache;
use crate::history::RunHistory;

/// Receives the history of a finished run.
///
/// Runs on the worker after the task itself, as a separate step: a failing
/// callback never changes the recorded history.
#[async_trait]
pub trait ResultCallback: Send + Sync {
    async fn on_complete(&self, task_name: &str, history: &RunHistory);
}

/// Records per-host reachability in the shared cache.
///
/// Contacted hosts are stored as `1`, dark hosts as `0`, under
/// `asset_connectivity_<hostname>`.
pub struct ConnectivityCallback {
    cache: Arc<TtlCache>,
    ttl: Option<Duration>,
}

impl ConnectivityCallback {
    pub const KEY_PREFIX: &'static str = "asset_connectivity_";

    pub fn new(cache: Arc<TtlCache>) -> Self {
        Self { cache, ttl: None }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn key(hostname: &str) -> String {
        format!("{}{}", Self::KEY_PREFIX, hostname)
    }

    /// Last recorded reachability of a host.
    pub fn connectivity(cache: &TtlCache, hostname: &str) -> Option<bool> {
        cache.get_as::<u8>(&Self::key(hostname)).map(|v| v == 1)
    }
}

#[async_trait]
impl ResultCallback for ConnectivityCallback {
    async fn on_complete(&self, task_name: &str, history: &RunHistory) {
        for host in history.summary.contacted.keys() {
            self.cache.set(Self::key(host), 1, self.ttl);
        }
        // `all` marks a run that never reached any host
        for host in history.summary.dark.keys().filter(|h| h.as_str() != "all") {
            self.cache.set(Self::key(host), 0, self.ttl);
        }
        debug!(
            task = %task_name,
            contacted = history.summary.contacted.len(),
            dark = history.summary.dark.len(),
            "Updated asset connectivity"
        );
    }
}
