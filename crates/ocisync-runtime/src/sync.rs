//! State synchronization between the controller and the runtime.
//!
//! While a container is being created or torn down the runtime reports
//! every state transition to a per-container socket. A [`StateObserver`]
//! turns that socket into a channel of [`RuntimeState`] values, and a
//! [`SyncSession`] pairs the channel with the cancellation token that
//! stops the observer.

use std::path::Path;

use ocisync_common::error::Result;
use ocisync_common::types::RuntimeState;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Opens a stream of runtime state notifications for one socket.
pub trait StateObserver: Send + Sync {
    /// Starts observing `socket` until `cancel` fires.
    ///
    /// The returned channel yields one value per reported transition, in
    /// the order the runtime reported them, and closes once observation
    /// stops. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ocisync_common::error::OcisyncError::Session`] if the
    /// listener cannot be set up.
    fn observe(
        &self,
        cancel: CancellationToken,
        socket: &Path,
    ) -> Result<mpsc::Receiver<RuntimeState>>;
}

/// An open synchronization session: a notification channel plus the
/// token that tears down its observer.
///
/// [`SyncSession::release`] must be called when the session is no longer
/// needed. It is idempotent; dropping an unreleased session releases it.
#[derive(Debug)]
pub struct SyncSession {
    cancel: CancellationToken,
    states: mpsc::Receiver<RuntimeState>,
    released: bool,
}

impl SyncSession {
    /// Opens a session on `socket` through `observer`.
    ///
    /// # Errors
    ///
    /// Returns the observer's error. The fresh token is cancelled before
    /// returning so nothing outlives the failed attempt.
    pub fn open(observer: &dyn StateObserver, socket: &Path) -> Result<Self> {
        let cancel = CancellationToken::new();
        match observer.observe(cancel.clone(), socket) {
            Ok(states) => {
                tracing::debug!(socket = %socket.display(), "sync session opened");
                Ok(Self {
                    cancel,
                    states,
                    released: false,
                })
            }
            Err(e) => {
                cancel.cancel();
                Err(e)
            }
        }
    }

    /// Receives the next reported state.
    ///
    /// Returns `None` once the session is released or the observer has
    /// stopped and every buffered value was consumed.
    pub async fn recv(&mut self) -> Option<RuntimeState> {
        if self.released {
            return None;
        }
        self.states.recv().await
    }

    /// Returns a handle that ends the session from elsewhere, e.g. when
    /// the runtime fails before reporting anything.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the observer and closes the channel. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.cancel.cancel();
        self.states.close();
        tracing::debug!("sync session released");
    }

    /// Returns whether [`SyncSession::release`] has run.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
pub use socket::SocketObserver;

#[cfg(unix)]
mod socket {
    use std::path::{Path, PathBuf};

    use ocisync_common::constants::SYNC_CHANNEL_CAPACITY;
    use ocisync_common::error::{OcisyncError, Result};
    use ocisync_common::types::RuntimeState;
    use serde::Deserialize;
    use tokio::io::AsyncReadExt;
    use tokio::net::{UnixListener, UnixStream};
    use tokio::sync::mpsc;
    use tokio::task::JoinSet;
    use tokio_util::sync::CancellationToken;

    use super::StateObserver;

    const READ_CHUNK: usize = 4096;

    /// One state report written by the runtime. Runtimes send their full
    /// OCI state object; only the status matters here.
    #[derive(Debug, Deserialize)]
    struct StateMessage {
        status: String,
    }

    /// Observer that listens on a Unix socket for the runtime's JSON state
    /// reports.
    ///
    /// The runtime may report one or several states per connection, and
    /// may keep a connection open between reports. Each connection is
    /// read by its own task, so an idle peer never holds back another one.
    /// States from one connection keep their order; across connections
    /// they are forwarded in arrival order.
    #[derive(Debug, Clone)]
    pub struct SocketObserver {
        capacity: usize,
    }

    impl SocketObserver {
        /// Creates an observer with the default channel capacity.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                capacity: SYNC_CHANNEL_CAPACITY,
            }
        }
    }

    impl Default for SocketObserver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl StateObserver for SocketObserver {
        fn observe(
            &self,
            cancel: CancellationToken,
            socket: &Path,
        ) -> Result<mpsc::Receiver<RuntimeState>> {
            let session_err = |e: std::io::Error| OcisyncError::Session {
                path: socket.to_path_buf(),
                message: e.to_string(),
            };

            if let Some(parent) = socket.parent() {
                std::fs::create_dir_all(parent).map_err(session_err)?;
            }
            match std::fs::remove_file(socket) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(session_err(e)),
                _ => {}
            }
            let listener = UnixListener::bind(socket).map_err(session_err)?;

            let (tx, rx) = mpsc::channel(self.capacity);
            let _ = tokio::spawn(listen(listener, tx, cancel, socket.to_path_buf()));
            Ok(rx)
        }
    }

    async fn listen(
        listener: UnixListener,
        tx: mpsc::Sender<RuntimeState>,
        cancel: CancellationToken,
        path: PathBuf,
    ) {
        let mut readers = JoinSet::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tx.closed() => break,
                Some(_) = readers.join_next(), if !readers.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let _ = readers.spawn(forward(stream, tx.clone(), cancel.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(
                            socket = %path.display(),
                            error = %e,
                            "state listener failed"
                        );
                        break;
                    }
                },
            }
        }

        readers.shutdown().await;
        drop(listener);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::debug!(socket = %path.display(), error = %e, "could not remove sync socket");
        }
        tracing::debug!(socket = %path.display(), "state listener stopped");
    }

    /// Forwards states from one connection as soon as each one is complete.
    /// The connection is dropped on a malformed report.
    async fn forward(
        mut stream: UnixStream,
        tx: mpsc::Sender<RuntimeState>,
        cancel: CancellationToken,
    ) {
        let mut buf = Vec::with_capacity(READ_CHUNK);
        loop {
            let read = tokio::select! {
                () = cancel.cancelled() => return,
                read = stream.read_buf(&mut buf) => read,
            };
            match read {
                Ok(0) => {
                    if !buf.iter().all(u8::is_ascii_whitespace) {
                        tracing::warn!(bytes = buf.len(), "discarding truncated state report");
                    }
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "could not read state report");
                    return;
                }
            }

            let (states, consumed) = match decode_complete(&buf) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed state report");
                    return;
                }
            };
            let _ = buf.drain(..consumed);

            for state in states {
                tracing::debug!(state = %state, "runtime reported state");
                tokio::select! {
                    () = cancel.cancelled() => return,
                    sent = tx.send(state) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Decodes every complete report at the front of `buf` and returns the
    /// states with the number of bytes they used. A trailing partial report
    /// is left for the next read.
    fn decode_complete(buf: &[u8]) -> serde_json::Result<(Vec<RuntimeState>, usize)> {
        let mut reports = serde_json::Deserializer::from_slice(buf).into_iter::<StateMessage>();
        let mut states = Vec::new();
        loop {
            match reports.next() {
                Some(Ok(message)) => states.push(RuntimeState::from_status(&message.status)),
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok((states, reports.byte_offset()))
    }

}
