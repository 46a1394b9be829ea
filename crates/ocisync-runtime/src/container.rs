//! Lifecycle controller for a single OCI container.
//!
//! A [`Container`] creates its process through the runtime, follows the
//! runtime's own state reports over a [`SyncSession`], and tears the
//! process down with a graceful signal that escalates to a forceful kill
//! once the caller's grace period runs out.
//!
//! Lifecycle calls take `&mut self`, so calls on one container are
//! serialized by the borrow checker.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ocisync_common::config::ContainerPaths;
use ocisync_common::error::{OcisyncError, Result};
use ocisync_common::types::{ContainerId, ImageInfo, Phase, RuntimeState};
use serde::Serialize;

use crate::annotation::{self, decode_int, lookup};
use crate::bundle::BundleBuilder;
use crate::client::RuntimeClient;
use crate::sync::{StateObserver, SyncSession};

/// External services a container is driven through.
#[derive(Clone)]
pub struct Collaborators {
    /// Low-level runtime.
    pub client: Arc<dyn RuntimeClient>,
    /// Source of runtime state notifications.
    pub observer: Arc<dyn StateObserver>,
    /// OCI bundle preparation.
    pub bundler: Arc<dyn BundleBuilder>,
}

impl Collaborators {
    /// Bundles the three collaborators.
    #[must_use]
    pub fn new(
        client: Arc<dyn RuntimeClient>,
        observer: Arc<dyn StateObserver>,
        bundler: Arc<dyn BundleBuilder>,
    ) -> Self {
        Self {
            client,
            observer,
            bundler,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("client", &"<runtime>")
            .field("observer", &"<observer>")
            .field("bundler", &"<bundler>")
            .finish()
    }
}

/// One container managed through an OCI runtime.
#[derive(Debug)]
pub struct Container {
    id: ContainerId,
    paths: ContainerPaths,
    runtime_state: RuntimeState,
    created_at: i64,
    started_at: i64,
    finished_at: i64,
    exit_code: i32,
    exit_desc: String,
    attach_socket: String,
    control_socket: String,
    session: Option<SyncSession>,
    collaborators: Collaborators,
}

impl Container {
    /// Creates a controller for a container that has not been spawned yet.
    #[must_use]
    pub fn new(id: ContainerId, paths: ContainerPaths, collaborators: Collaborators) -> Self {
        Self {
            id,
            paths,
            runtime_state: RuntimeState::Unknown,
            created_at: 0,
            started_at: 0,
            finished_at: 0,
            exit_code: 0,
            exit_desc: String::new(),
            attach_socket: String::new(),
            control_socket: String::new(),
            session: None,
            collaborators,
        }
    }

    /// Creates the container from `image`.
    ///
    /// Prepares the bundle, opens a sync session on the container's
    /// socket, launches the runtime's create in the background and waits
    /// for the runtime to report `creating` and then `created`. On success
    /// the session stays open for the later [`Container::terminate`] or
    /// [`Container::kill`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle or the session cannot be set up, if
    /// the runtime reports any other state, or if the session ends before
    /// both states arrive (for example because the create request failed).
    pub async fn spawn(&mut self, image: &ImageInfo) -> Result<()> {
        tracing::info!(id = %self.id, image = %image.reference, "spawning container");

        self.collaborators
            .bundler
            .build(&self.id, image, &self.paths.bundle)?;

        self.release_session();
        let session = SyncSession::open(
            self.collaborators.observer.as_ref(),
            &self.paths.sync_socket,
        )?;
        let abort = session.cancellation();
        self.session = Some(session);

        let client = Arc::clone(&self.collaborators.client);
        let id = self.id.clone();
        let paths = self.paths.clone();
        let _ = tokio::spawn(async move {
            if let Err(e) = client
                .create(&id, &paths.bundle, &paths.sync_socket, &paths.log)
                .await
            {
                tracing::warn!(id = %id, error = %e, "runtime create failed");
                abort.cancel();
            }
        });

        let result = self.await_creation().await;
        if result.is_err() {
            self.release_session();
        }
        result
    }

    async fn await_creation(&mut self) -> Result<()> {
        self.wait_for_state(RuntimeState::Creating, Phase::Spawn)
            .await?;
        self.wait_for_state(RuntimeState::Created, Phase::Spawn)
            .await?;
        tracing::info!(id = %self.id, "container created");
        Ok(())
    }

    /// Re-reads the container's state from the runtime.
    ///
    /// Fields are overwritten in order (timestamps, exit code, status,
    /// exit description, sockets). A malformed integer annotation aborts
    /// the refresh and leaves the fields after it untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the state query fails or an annotation cannot
    /// be decoded.
    pub async fn refresh_state(&mut self) -> Result<()> {
        let snapshot = self.collaborators.client.state(&self.id).await?;
        let annotations = &snapshot.annotations;

        self.created_at = decode_int(annotations, annotation::CREATED_AT, "created timestamp")?;
        self.started_at = decode_int(annotations, annotation::STARTED_AT, "started timestamp")?;
        self.finished_at = decode_int(annotations, annotation::FINISHED_AT, "finished timestamp")?;
        let exit_code = decode_int(annotations, annotation::EXIT_CODE, "exit code")?;
        self.exit_code = i32::try_from(exit_code).map_err(|e| OcisyncError::Decode {
            field: "exit code",
            value: exit_code.to_string(),
            reason: e.to_string(),
        })?;
        self.record_state(RuntimeState::from_status(&snapshot.status));
        self.exit_desc = lookup(annotations, annotation::EXIT_DESC).to_string();
        self.attach_socket = lookup(annotations, annotation::ATTACH_SOCKET).to_string();
        self.control_socket = lookup(annotations, annotation::CONTROL_SOCKET).to_string();

        tracing::debug!(id = %self.id, state = %self.runtime_state, "container state refreshed");
        Ok(())
    }

    /// Stops the container, giving it `timeout` to exit on its own.
    ///
    /// A zero timeout kills immediately. Otherwise a graceful signal is
    /// sent and the first of two outcomes wins: the runtime reports a
    /// state, or the grace period elapses and the container is killed.
    /// Already exited containers are left alone. The sync session is
    /// released on every path.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful signal cannot be sent (no kill is
    /// attempted), if the runtime reports a state other than `exited`, or
    /// if the escalated kill fails.
    pub async fn terminate(&mut self, timeout: Duration) -> Result<()> {
        let result = self.stop_gracefully(timeout).await;
        self.release_session();
        result
    }

    async fn stop_gracefully(&mut self, timeout: Duration) -> Result<()> {
        if self.runtime_state.is_terminal() {
            tracing::debug!(id = %self.id, "container already exited");
            return Ok(());
        }
        if timeout.is_zero() {
            return self.force_stop().await;
        }

        self.collaborators.client.kill(&self.id, false).await?;
        tracing::info!(
            id = %self.id,
            timeout_secs = timeout.as_secs_f64(),
            "sent graceful termination"
        );

        // `None` means the grace period won the race.
        let received = match self.session.as_mut() {
            Some(session) => tokio::select! {
                state = session.recv() => Some(state),
                () = tokio::time::sleep(timeout) => None,
            },
            None => Some(None),
        };

        match received {
            Some(Some(state)) => {
                self.record_state(state);
                if state != RuntimeState::Exited {
                    return Err(OcisyncError::UnexpectedState {
                        phase: Phase::Terminate,
                        expected: RuntimeState::Exited,
                        actual: state,
                    });
                }
                tracing::info!(id = %self.id, "container exited");
                Ok(())
            }
            Some(None) => Err(OcisyncError::SessionClosed {
                phase: Phase::Terminate,
                expected: RuntimeState::Exited,
            }),
            None => {
                tracing::info!(id = %self.id, "grace period elapsed, killing container");
                self.force_stop().await
            }
        }
    }

    /// Kills the container without a grace period and waits for the
    /// runtime to report it exited. Already exited containers are left
    /// alone. The sync session is released on every path.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill request fails or the runtime reports
    /// a state other than `exited`.
    pub async fn kill(&mut self) -> Result<()> {
        let result = self.force_stop().await;
        self.release_session();
        result
    }

    async fn force_stop(&mut self) -> Result<()> {
        if self.runtime_state.is_terminal() {
            return Ok(());
        }
        self.collaborators.client.kill(&self.id, true).await?;
        tracing::info!(id = %self.id, "sent forceful kill");
        self.wait_for_state(RuntimeState::Exited, Phase::Kill).await
    }

    /// Takes exactly one state from the session. The received state is
    /// recorded even when it is not the expected one.
    async fn wait_for_state(&mut self, expected: RuntimeState, phase: Phase) -> Result<()> {
        tracing::debug!(id = %self.id, %expected, %phase, "waiting for state");

        let received = match self.session.as_mut() {
            Some(session) => session.recv().await,
            None => None,
        };
        let Some(state) = received else {
            return Err(OcisyncError::SessionClosed { phase, expected });
        };

        self.record_state(state);
        if state != expected {
            return Err(OcisyncError::UnexpectedState {
                phase,
                expected,
                actual: state,
            });
        }
        Ok(())
    }

    fn record_state(&mut self, state: RuntimeState) {
        if state.lifecycle_rank() < self.runtime_state.lifecycle_rank() {
            tracing::warn!(
                id = %self.id,
                previous = %self.runtime_state,
                %state,
                "runtime state moved backwards"
            );
        }
        self.runtime_state = state;
    }

    fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.release();
        }
    }

    /// Container identifier.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// OCI bundle directory.
    #[must_use]
    pub fn bundle_path(&self) -> &Path {
        &self.paths.bundle
    }

    /// Socket the runtime reports state transitions to.
    #[must_use]
    pub fn sync_socket_path(&self) -> &Path {
        &self.paths.sync_socket
    }

    /// Container log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.paths.log
    }

    /// Last state reported by the runtime.
    #[must_use]
    pub const fn runtime_state(&self) -> RuntimeState {
        self.runtime_state
    }

    /// Creation time in nanoseconds since the Unix epoch, zero if unknown.
    #[must_use]
    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Start time in nanoseconds since the Unix epoch, zero if unknown.
    #[must_use]
    pub const fn started_at(&self) -> i64 {
        self.started_at
    }

    /// Exit time in nanoseconds since the Unix epoch, zero if unknown.
    #[must_use]
    pub const fn finished_at(&self) -> i64 {
        self.finished_at
    }

    /// Exit code; only meaningful once the container has exited.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Runtime-provided exit reason.
    #[must_use]
    pub fn exit_desc(&self) -> &str {
        &self.exit_desc
    }

    /// Socket for attaching to the container's stdio.
    #[must_use]
    pub fn attach_socket(&self) -> &str {
        &self.attach_socket
    }

    /// Socket for runtime control requests.
    #[must_use]
    pub fn control_socket(&self) -> &str {
        &self.control_socket
    }

    /// Returns whether a sync session is open.
    #[must_use]
    pub fn has_sync_session(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_released())
    }

    /// Snapshot of the cached fields for reporting.
    #[must_use]
    pub fn report(&self) -> ContainerReport {
        let exited = self.runtime_state.is_terminal();
        ContainerReport {
            id: self.id.clone(),
            state: self.runtime_state,
            bundle: self.paths.bundle.display().to_string(),
            log: self.paths.log.display().to_string(),
            created_at: timestamp(self.created_at),
            started_at: timestamp(self.started_at),
            finished_at: timestamp(self.finished_at),
            exit_code: exited.then_some(self.exit_code),
            exit_desc: (exited && !self.exit_desc.is_empty()).then(|| self.exit_desc.clone()),
            attach_socket: non_empty(&self.attach_socket),
            control_socket: non_empty(&self.control_socket),
        }
    }
}

/// Point-in-time view of a container, suitable for printing or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerReport {
    /// Container identifier.
    pub id: ContainerId,
    /// Last known runtime state.
    pub state: RuntimeState,
    /// Bundle directory.
    pub bundle: String,
    /// Log file.
    pub log: String,
    /// Creation time, if reached.
    pub created_at: Option<DateTime<Utc>>,
    /// Start time, if reached.
    pub started_at: Option<DateTime<Utc>>,
    /// Exit time, if reached.
    pub finished_at: Option<DateTime<Utc>>,
    /// Exit code, once exited.
    pub exit_code: Option<i32>,
    /// Exit reason, once exited.
    pub exit_desc: Option<String>,
    /// Attach socket, once exposed.
    pub attach_socket: Option<String>,
    /// Control socket, once exposed.
    pub control_socket: Option<String>,
}

fn timestamp(nanos: i64) -> Option<DateTime<Utc>> {
    (nanos > 0).then(|| DateTime::<Utc>::from_timestamp_nanos(nanos))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
