//! Lifecycle tests for the container controller.
//!
//! The runtime, the state observer, and the bundle builder are replaced by
//! scripted stand-ins: each runtime request pushes a configured sequence of
//! states into the observer's channel, the way a real runtime reports
//! transitions over the sync socket.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ocisync_common::config::ContainerPaths;
use ocisync_common::error::{OcisyncError, Result};
use ocisync_common::types::{ContainerId, ImageInfo, Phase, RuntimeState};
use ocisync_runtime::bundle::BundleBuilder;
use ocisync_runtime::client::{RuntimeClient, StateSnapshot};
use ocisync_runtime::container::{Collaborators, Container};
use ocisync_runtime::sync::StateObserver;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Create,
    Kill { force: bool },
    State,
}

#[derive(Default)]
struct Script {
    on_create: Vec<RuntimeState>,
    on_graceful: Vec<RuntimeState>,
    on_force: Vec<RuntimeState>,
    graceful_delay: Duration,
    force_delay: Duration,
    status: String,
    fail_create: bool,
    fail_kill: bool,
    fail_bundle: bool,
    fail_observe: bool,
}

struct ScriptedRuntime {
    calls: Mutex<Vec<Call>>,
    reports: mpsc::Sender<RuntimeState>,
    on_create: Vec<RuntimeState>,
    on_graceful: Vec<RuntimeState>,
    on_force: Vec<RuntimeState>,
    graceful_delay: Duration,
    force_delay: Duration,
    status: String,
    fail_create: bool,
    fail_kill: bool,
}

impl ScriptedRuntime {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn report(&self, states: &[RuntimeState]) {
        for state in states {
            self.reports.try_send(*state).unwrap();
        }
    }

    /// Reports `states` after `delay` without holding up the request.
    fn report_later(&self, delay: Duration, states: Vec<RuntimeState>) {
        let reports = self.reports.clone();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for state in states {
                reports.try_send(state).unwrap();
            }
        });
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn failure(operation: &'static str, id: &ContainerId) -> OcisyncError {
        OcisyncError::RuntimeRequest {
            operation,
            id: id.to_string(),
            message: "scripted failure".into(),
        }
    }
}

#[async_trait]
impl RuntimeClient for ScriptedRuntime {
    async fn create(&self, id: &ContainerId, _: &Path, _: &Path, _: &Path) -> Result<()> {
        self.record(Call::Create);
        if self.fail_create {
            return Err(Self::failure("create", id));
        }
        self.report(&self.on_create);
        Ok(())
    }

    async fn kill(&self, id: &ContainerId, force: bool) -> Result<()> {
        self.record(Call::Kill { force });
        if self.fail_kill {
            return Err(Self::failure("kill", id));
        }
        if force {
            tokio::time::sleep(self.force_delay).await;
            self.report(&self.on_force);
        } else if self.graceful_delay.is_zero() {
            self.report(&self.on_graceful);
        } else {
            self.report_later(self.graceful_delay, self.on_graceful.clone());
        }
        Ok(())
    }

    async fn state(&self, id: &ContainerId) -> Result<StateSnapshot> {
        self.record(Call::State);
        Ok(StateSnapshot {
            id: id.to_string(),
            status: self.status.clone(),
            ..StateSnapshot::default()
        })
    }
}

/// Forwards scripted reports until the session cancels it, like a socket
/// listener would.
struct ScriptedObserver {
    reports: Mutex<Option<mpsc::Receiver<RuntimeState>>>,
    fail: bool,
}

impl StateObserver for ScriptedObserver {
    fn observe(
        &self,
        cancel: CancellationToken,
        socket: &Path,
    ) -> Result<mpsc::Receiver<RuntimeState>> {
        let reports = if self.fail {
            None
        } else {
            self.reports.lock().unwrap().take()
        };
        let Some(mut reports) = reports else {
            return Err(OcisyncError::Session {
                path: socket.to_path_buf(),
                message: "scripted failure".into(),
            });
        };

        let (tx, rx) = mpsc::channel(16);
        let _ = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    report = reports.recv() => match report {
                        Some(state) => {
                            if tx.send(state).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });
        Ok(rx)
    }
}

struct ScriptedBundle {
    fail: bool,
}

impl BundleBuilder for ScriptedBundle {
    fn build(&self, id: &ContainerId, _: &ImageInfo, _: &Path) -> Result<()> {
        if self.fail {
            return Err(OcisyncError::Bundle {
                id: id.to_string(),
                message: "scripted failure".into(),
            });
        }
        Ok(())
    }
}

fn harness(script: Script) -> (Container, Arc<ScriptedRuntime>) {
    let (reports_tx, reports_rx) = mpsc::channel(16);
    let runtime = Arc::new(ScriptedRuntime {
        calls: Mutex::new(Vec::new()),
        reports: reports_tx,
        on_create: script.on_create,
        on_graceful: script.on_graceful,
        on_force: script.on_force,
        graceful_delay: script.graceful_delay,
        force_delay: script.force_delay,
        status: script.status,
        fail_create: script.fail_create,
        fail_kill: script.fail_kill,
    });
    let observer = ScriptedObserver {
        reports: Mutex::new(Some(reports_rx)),
        fail: script.fail_observe,
    };
    let collaborators = Collaborators::new(
        runtime.clone(),
        Arc::new(observer),
        Arc::new(ScriptedBundle {
            fail: script.fail_bundle,
        }),
    );
    let id = ContainerId::new("c1");
    let paths = ContainerPaths::derive(Path::new("/var/lib/ocisync"), &id);
    (Container::new(id, paths, collaborators), runtime)
}

fn image() -> ImageInfo {
    ImageInfo::new("docker://alpine", "/rootfs").with_command(vec!["sleep".into(), "60".into()])
}

fn created() -> Vec<RuntimeState> {
    vec![RuntimeState::Creating, RuntimeState::Created]
}

// ── Spawn ────────────────────────────────────────────────────────────

#[tokio::test]
async fn spawn_succeeds_after_creating_then_created() {
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        ..Script::default()
    });

    c.spawn(&image()).await.expect("spawn");

    assert_eq!(c.runtime_state(), RuntimeState::Created);
    assert!(c.has_sync_session());
    assert_eq!(runtime.calls(), vec![Call::Create]);
}

#[tokio::test]
async fn spawn_fails_when_created_arrives_first() {
    let (mut c, _) = harness(Script {
        on_create: vec![RuntimeState::Created, RuntimeState::Creating],
        ..Script::default()
    });

    let err = c.spawn(&image()).await.unwrap_err();

    assert!(matches!(
        err,
        OcisyncError::UnexpectedState {
            phase: Phase::Spawn,
            expected: RuntimeState::Creating,
            actual: RuntimeState::Created,
        }
    ));
    assert_eq!(c.runtime_state(), RuntimeState::Created);
    assert!(!c.has_sync_session());
}

#[tokio::test]
async fn spawn_fails_naming_unexpected_second_state() {
    let (mut c, _) = harness(Script {
        on_create: vec![RuntimeState::Creating, RuntimeState::Exited],
        ..Script::default()
    });

    let err = c.spawn(&image()).await.unwrap_err();

    assert!(matches!(
        err,
        OcisyncError::UnexpectedState {
            expected: RuntimeState::Created,
            actual: RuntimeState::Exited,
            ..
        }
    ));
    assert!(err.to_string().contains("got exited"));
    assert!(!c.has_sync_session());
}

#[tokio::test]
async fn spawn_stops_at_bundle_failure() {
    let (mut c, runtime) = harness(Script {
        fail_bundle: true,
        ..Script::default()
    });

    let err = c.spawn(&image()).await.unwrap_err();

    assert!(matches!(err, OcisyncError::Bundle { .. }));
    assert!(runtime.calls().is_empty());
    assert!(!c.has_sync_session());
}

#[tokio::test]
async fn spawn_stops_at_session_failure() {
    let (mut c, runtime) = harness(Script {
        fail_observe: true,
        ..Script::default()
    });

    let err = c.spawn(&image()).await.unwrap_err();

    assert!(matches!(err, OcisyncError::Session { .. }));
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn failed_create_ends_spawn_instead_of_hanging() {
    let (mut c, runtime) = harness(Script {
        fail_create: true,
        ..Script::default()
    });

    let err = c.spawn(&image()).await.unwrap_err();

    assert!(matches!(
        err,
        OcisyncError::SessionClosed {
            phase: Phase::Spawn,
            expected: RuntimeState::Creating,
        }
    ));
    assert_eq!(runtime.calls(), vec![Call::Create]);
}

// ── Terminate ────────────────────────────────────────────────────────

#[tokio::test]
async fn terminate_on_exited_container_sends_nothing() {
    let (mut c, runtime) = harness(Script {
        status: "stopped".into(),
        ..Script::default()
    });
    c.refresh_state().await.expect("refresh");
    assert_eq!(c.runtime_state(), RuntimeState::Exited);

    c.terminate(Duration::from_secs(10)).await.expect("terminate");

    assert_eq!(runtime.calls(), vec![Call::State]);
}

#[tokio::test]
async fn zero_timeout_terminate_kills_forcefully() {
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        on_force: vec![RuntimeState::Exited],
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");

    c.terminate(Duration::ZERO).await.expect("terminate");

    assert_eq!(
        runtime.calls(),
        vec![Call::Create, Call::Kill { force: true }]
    );
    assert_eq!(c.runtime_state(), RuntimeState::Exited);
    assert!(!c.has_sync_session());
}

#[tokio::test(start_paused = true)]
async fn graceful_exit_within_grace_period() {
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        on_graceful: vec![RuntimeState::Exited],
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");

    c.terminate(Duration::from_secs(30)).await.expect("terminate");

    assert_eq!(
        runtime.calls(),
        vec![Call::Create, Call::Kill { force: false }]
    );
    assert_eq!(c.runtime_state(), RuntimeState::Exited);
    assert!(!c.has_sync_session());
}

#[tokio::test(start_paused = true)]
async fn silent_container_is_killed_once_grace_period_elapses() {
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        on_force: vec![RuntimeState::Exited],
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");

    let started = tokio::time::Instant::now();
    c.terminate(Duration::from_secs(5)).await.expect("terminate");

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(
        runtime.calls(),
        vec![
            Call::Create,
            Call::Kill { force: false },
            Call::Kill { force: true },
        ]
    );
    assert_eq!(c.runtime_state(), RuntimeState::Exited);
    assert!(!c.has_sync_session());
}

#[tokio::test(start_paused = true)]
async fn exit_reported_after_grace_period_completes_forceful_kill() {
    // Exited lands at 6s, while the forceful kill request (5s..7s) is in flight.
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        on_graceful: vec![RuntimeState::Exited],
        graceful_delay: Duration::from_secs(6),
        force_delay: Duration::from_secs(2),
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");

    let started = tokio::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(60), c.terminate(Duration::from_secs(5)))
        .await
        .expect("late exit must satisfy the kill wait")
        .expect("terminate");

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(7));
    assert!(elapsed < Duration::from_secs(8));
    assert_eq!(
        runtime.calls(),
        vec![
            Call::Create,
            Call::Kill { force: false },
            Call::Kill { force: true },
        ]
    );
    assert_eq!(c.runtime_state(), RuntimeState::Exited);
    assert!(!c.has_sync_session());
}

#[tokio::test(start_paused = true)]
async fn non_exited_report_during_grace_period_is_an_error() {
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        on_graceful: vec![RuntimeState::Running],
        on_force: vec![RuntimeState::Exited],
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");

    let err = c.terminate(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(
        err,
        OcisyncError::UnexpectedState {
            phase: Phase::Terminate,
            expected: RuntimeState::Exited,
            actual: RuntimeState::Running,
        }
    ));
    assert!(!runtime.calls().contains(&Call::Kill { force: true }));
    assert_eq!(c.runtime_state(), RuntimeState::Running);
    assert!(!c.has_sync_session());
}

#[tokio::test]
async fn failed_graceful_signal_does_not_escalate() {
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        fail_kill: true,
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");

    let err = c.terminate(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(err, OcisyncError::RuntimeRequest { operation: "kill", .. }));
    assert_eq!(
        runtime.calls(),
        vec![Call::Create, Call::Kill { force: false }]
    );
    assert!(!c.has_sync_session());
}

// ── Kill ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn kill_waits_for_exited() {
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        on_force: vec![RuntimeState::Exited],
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");

    c.kill().await.expect("kill");

    assert_eq!(c.runtime_state(), RuntimeState::Exited);
    assert_eq!(
        runtime.calls(),
        vec![Call::Create, Call::Kill { force: true }]
    );
}

#[tokio::test]
async fn kill_reports_unexpected_created_state() {
    let (mut c, _) = harness(Script {
        on_create: created(),
        on_force: vec![RuntimeState::Created],
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");

    let err = c.kill().await.unwrap_err();

    assert!(matches!(
        err,
        OcisyncError::UnexpectedState {
            phase: Phase::Kill,
            expected: RuntimeState::Exited,
            actual: RuntimeState::Created,
        }
    ));
    assert!(err.to_string().contains("got created"));
    assert!(!c.has_sync_session());
}

#[tokio::test]
async fn termination_after_exit_is_a_no_op() {
    let (mut c, runtime) = harness(Script {
        on_create: created(),
        on_force: vec![RuntimeState::Exited],
        ..Script::default()
    });
    c.spawn(&image()).await.expect("spawn");
    c.kill().await.expect("kill");

    c.terminate(Duration::from_secs(5)).await.expect("second terminate");
    c.kill().await.expect("second kill");

    assert_eq!(
        runtime.calls(),
        vec![Call::Create, Call::Kill { force: true }]
    );
}

#[tokio::test]
async fn kill_without_session_fails_after_request() {
    let (mut c, runtime) = harness(Script::default());

    let err = c.kill().await.unwrap_err();

    assert!(matches!(
        err,
        OcisyncError::SessionClosed {
            phase: Phase::Kill,
            expected: RuntimeState::Exited,
        }
    ));
    assert_eq!(runtime.calls(), vec![Call::Kill { force: true }]);
}
