//! Owner of every backend handle.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, instrument, warn};

use super::config::{BackendConfig, BackendId};
use super::connection::{Connection, Connector};
use super::error::BackendFailure;
use super::handle::{AcquireError, ConnectionHandle, HandleStatus};

/// Outcome of [`ConnectionManager::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Backends whose handle closed without error, including never-opened ones.
    pub closed: Vec<BackendId>,
    /// Backends whose native close call failed.
    pub failures: Vec<(BackendId, BackendFailure)>,
}

impl ShutdownReport {
    /// Whether every backend closed cleanly.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Hands out shared connections by backend id.
///
/// Handles are created for every configured backend up front, but nothing is
/// opened until a tool first asks for it.
pub struct ConnectionManager {
    handles: BTreeMap<BackendId, ConnectionHandle>,
    closing: AtomicBool,
}

impl ConnectionManager {
    /// Create one unstarted handle per config. A later config for the same
    /// backend replaces an earlier one.
    pub fn new(configs: impl IntoIterator<Item = BackendConfig>, connector: Arc<dyn Connector>) -> Self {
        let handles = configs
            .into_iter()
            .map(|config| (config.id, ConnectionHandle::new(config, Arc::clone(&connector))))
            .collect();
        Self {
            handles,
            closing: AtomicBool::new(false),
        }
    }

    /// Backends this manager can hand out, in id order.
    pub fn enabled(&self) -> Vec<BackendId> {
        self.handles.keys().copied().collect()
    }

    /// Get the shared connection for `backend`, opening it on first use.
    pub async fn acquire(&self, backend: BackendId) -> Result<Connection, AcquireError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(AcquireError::Closed(backend));
        }
        let handle = self
            .handles
            .get(&backend)
            .ok_or(AcquireError::NotConfigured(backend))?;
        handle.acquire().await
    }

    /// Clear a cached setup failure so the next acquire retries.
    pub fn reset(&self, backend: BackendId) -> Result<bool, AcquireError> {
        let handle = self
            .handles
            .get(&backend)
            .ok_or(AcquireError::NotConfigured(backend))?;
        Ok(handle.reset())
    }

    /// State of one backend's handle, or `None` if it isn't configured.
    pub fn status(&self, backend: BackendId) -> Option<HandleStatus> {
        self.handles.get(&backend).map(ConnectionHandle::status)
    }

    /// Whether shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Close every handle. Individual close failures are collected, not
    /// propagated, and never stop the other backends from closing.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> ShutdownReport {
        self.closing.store(true, Ordering::Release);

        let outcomes = join_all(self.handles.values().map(|handle| async move {
            (handle.backend(), handle.shutdown().await)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (backend, outcome) in outcomes {
            match outcome {
                Ok(()) => report.closed.push(backend),
                Err(failure) => {
                    warn!(%backend, %failure, "Backend failed to close");
                    report.failures.push((backend, failure));
                }
            }
        }

        info!(
            closed = report.closed.len(),
            failed = report.failures.len(),
            "Connection manager shut down"
        );
        report
    }
}
