//! Lazily created, shared connection for one backend.
//!
//! A handle moves through `Unstarted -> Starting -> Ready | Failed`, and to
//! `Closed` on shutdown. Creation is single-flight: the first caller stores a
//! shared setup future in the state and everyone arriving while it runs awaits
//! that same future. The future lives in the handle, not in the caller, so a
//! caller that gives up waiting does not abort the attempt or cause a second
//! one.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{BackendConfig, BackendId};
use super::connection::{Connection, Connector};
use super::error::BackendFailure;

type Setup = Shared<BoxFuture<'static, Result<Connection, BackendFailure>>>;

/// Why a connection could not be handed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The backend is not enabled in this process.
    #[error("backend '{0}' is not configured")]
    NotConfigured(BackendId),

    /// Connection setup failed. The failure stays cached until reset.
    #[error("backend '{backend}' is unavailable: {failure}")]
    Failed {
        backend: BackendId,
        failure: BackendFailure,
    },

    /// The manager has been shut down.
    #[error("backend '{0}' is closed")]
    Closed(BackendId),
}

impl AcquireError {
    /// The backend the failure concerns.
    pub fn backend(&self) -> BackendId {
        match self {
            Self::NotConfigured(backend) | Self::Closed(backend) => *backend,
            Self::Failed { backend, .. } => *backend,
        }
    }
}

/// Snapshot of a handle's state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleStatus {
    Unstarted,
    Starting,
    Ready,
    Failed(BackendFailure),
    Closed,
}

enum HandleState {
    Unstarted,
    Starting { attempt: u64, setup: Setup },
    Ready(Connection),
    Failed(BackendFailure),
    Closed,
}

struct Inner {
    state: HandleState,
    attempts: u64,
}

/// Owner of one backend's connection.
pub struct ConnectionHandle {
    config: Arc<BackendConfig>,
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
}

impl ConnectionHandle {
    /// Create an unstarted handle. Nothing is opened until [`acquire`](Self::acquire).
    pub fn new(config: BackendConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            inner: Mutex::new(Inner {
                state: HandleState::Unstarted,
                attempts: 0,
            }),
        }
    }

    /// Which backend this handle owns.
    pub fn backend(&self) -> BackendId {
        self.config.id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) -> Setup {
        let config = Arc::clone(&self.config);
        let connector = Arc::clone(&self.connector);
        async move {
            info!(backend = %config.id, "Opening backend connection");
            let limit = config.limits.connect_timeout;
            match tokio::time::timeout(limit, connector.connect(&config)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BackendFailure::TimedOut(format!(
                    "connection setup exceeded {}ms",
                    limit.as_millis()
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// Get the shared connection, opening it on first use.
    pub async fn acquire(&self) -> Result<Connection, AcquireError> {
        let backend = self.backend();
        let (attempt, setup) = {
            let mut inner = self.lock();
            match &inner.state {
                HandleState::Ready(connection) => return Ok(connection.clone()),
                HandleState::Failed(failure) => {
                    return Err(AcquireError::Failed {
                        backend,
                        failure: failure.clone(),
                    });
                }
                HandleState::Closed => return Err(AcquireError::Closed(backend)),
                HandleState::Starting { attempt, setup } => (*attempt, setup.clone()),
                HandleState::Unstarted => {
                    inner.attempts += 1;
                    let attempt = inner.attempts;
                    let setup = self.start();
                    inner.state = HandleState::Starting {
                        attempt,
                        setup: setup.clone(),
                    };
                    (attempt, setup)
                }
            }
        };

        let outcome = setup.await;
        self.settle(attempt, outcome)
    }

    /// Record the outcome of a setup attempt and report what the caller gets.
    fn settle(
        &self,
        attempt: u64,
        outcome: Result<Connection, BackendFailure>,
    ) -> Result<Connection, AcquireError> {
        let backend = self.backend();
        let mut inner = self.lock();
        match &inner.state {
            HandleState::Starting { attempt: current, .. } if *current == attempt => {
                match &outcome {
                    Ok(_) => info!(%backend, "Backend connection ready"),
                    Err(failure) => warn!(%backend, %failure, "Backend connection failed"),
                }
                inner.state = match &outcome {
                    Ok(connection) => HandleState::Ready(connection.clone()),
                    Err(failure) => HandleState::Failed(failure.clone()),
                };
                outcome.map_err(|failure| AcquireError::Failed { backend, failure })
            }
            HandleState::Ready(connection) => Ok(connection.clone()),
            HandleState::Failed(failure) => Err(AcquireError::Failed {
                backend,
                failure: failure.clone(),
            }),
            HandleState::Closed => Err(AcquireError::Closed(backend)),
            // A later attempt owns the state; report this attempt's outcome as is.
            HandleState::Starting { .. } | HandleState::Unstarted => {
                outcome.map_err(|failure| AcquireError::Failed { backend, failure })
            }
        }
    }

    /// Forget a cached failure so the next acquire tries again. Returns
    /// whether anything was cleared.
    pub fn reset(&self) -> bool {
        let mut inner = self.lock();
        if matches!(inner.state, HandleState::Failed(_)) {
            debug!(backend = %self.backend(), "Clearing cached backend failure");
            inner.state = HandleState::Unstarted;
            true
        } else {
            false
        }
    }

    /// Current state.
    pub fn status(&self) -> HandleStatus {
        match &self.lock().state {
            HandleState::Unstarted => HandleStatus::Unstarted,
            HandleState::Starting { .. } => HandleStatus::Starting,
            HandleState::Ready(_) => HandleStatus::Ready,
            HandleState::Failed(failure) => HandleStatus::Failed(failure.clone()),
            HandleState::Closed => HandleStatus::Closed,
        }
    }

    /// Move to `Closed` and release the connection, if one was opened.
    ///
    /// An in-flight setup is awaited and its connection closed. Calling this
    /// more than once closes the connection only the first time.
    pub async fn shutdown(&self) -> Result<(), BackendFailure> {
        let previous = {
            let mut inner = self.lock();
            std::mem::replace(&mut inner.state, HandleState::Closed)
        };

        let connection = match previous {
            HandleState::Ready(connection) => connection,
            HandleState::Starting { setup, .. } => match setup.await {
                Ok(connection) => connection,
                Err(_) => return Ok(()),
            },
            HandleState::Unstarted | HandleState::Failed(_) | HandleState::Closed => {
                return Ok(());
            }
        };

        debug!(backend = %self.backend(), "Closing backend connection");
        connection.close().await
    }
}
