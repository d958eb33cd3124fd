//! Session supervisor: opens sessions, replaces closed ones with backoff,
//! and gives up on fatal disconnects or once the attempt budget is spent.

use std::{fmt, sync::Arc};

use {
    tokio::{sync::watch, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use wabridge_channels::{DisconnectReason, Error, SessionOptions, Transport};

use crate::{
    backoff::Backoff,
    session::{Session, SessionContext, SessionEnd},
};

/// Why the supervisor stopped retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The network refused the session (logged out, banned).
    Disconnected(DisconnectReason),
    AttemptsExhausted { attempts: u32 },
    /// The transport rejected the connect request itself.
    Rejected(String),
    Internal(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected(reason) => write!(f, "disconnected: {reason}"),
            Self::AttemptsExhausted { attempts } => {
                write!(f, "gave up after {attempts} failed attempts")
            },
            Self::Rejected(message) => write!(f, "connect rejected: {message}"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    /// Opening a session. `attempt` counts failures since the last `open`.
    Connecting { attempt: u32 },
    Open { generation: u64 },
    /// Waiting out the backoff before the next attempt.
    Closed { reason: DisconnectReason },
    Failed { reason: FailureReason },
    Stopped,
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Stopped)
    }
}

pub struct SessionSupervisor {
    transport: Arc<dyn Transport>,
    options: SessionOptions,
    ctx: Arc<SessionContext>,
    backoff: Backoff,
}

impl SessionSupervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        options: SessionOptions,
        ctx: SessionContext,
        backoff: Backoff,
    ) -> Self {
        Self {
            transport,
            options,
            ctx: Arc::new(ctx),
            backoff,
        }
    }

    /// Run on a background task.
    pub fn spawn(self) -> SupervisorHandle {
        let (state_tx, state_rx) = watch::channel(SupervisorState::Connecting { attempt: 1 });
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone(), state_tx));
        SupervisorHandle {
            state: state_rx,
            shutdown,
            task,
        }
    }

    /// Drive sessions until a terminal state; returns that state.
    pub async fn run(
        self,
        shutdown: CancellationToken,
        state: watch::Sender<SupervisorState>,
    ) -> SupervisorState {
        let finish = |s: SupervisorState| {
            state.send_replace(s.clone());
            s
        };

        let mut failures = 0u32;
        let mut generation = 0u64;
        // One immediate restart per failure streak.
        let mut restart_used = false;

        loop {
            if shutdown.is_cancelled() {
                return finish(SupervisorState::Stopped);
            }

            state.send_replace(SupervisorState::Connecting {
                attempt: failures + 1,
            });
            generation += 1;

            let opened = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return finish(SupervisorState::Stopped),
                opened = Session::open(
                    self.transport.as_ref(),
                    &self.options,
                    Arc::clone(&self.ctx),
                    generation,
                ) => opened,
            };

            let mut skip_delay = false;
            match opened {
                Err(Error::InvalidInput { message }) => {
                    error!(generation, %message, "transport rejected the session");
                    return finish(SupervisorState::Failed {
                        reason: FailureReason::Rejected(message),
                    });
                },
                Err(e) => {
                    failures += 1;
                    warn!(generation, failures, error = %e, "failed to open session");
                },
                Ok(session) => {
                    let mut opened_once = false;
                    let end = session
                        .run(&shutdown, |generation| {
                            opened_once = true;
                            failures = 0;
                            state.send_replace(SupervisorState::Open { generation });
                        })
                        .await;

                    let reason = match end {
                        SessionEnd::Shutdown => return finish(SupervisorState::Stopped),
                        SessionEnd::Closed(reason) => reason,
                    };
                    if reason.is_fatal() {
                        error!(generation, %reason, "session ended permanently, re-pair the device");
                        return finish(SupervisorState::Failed {
                            reason: FailureReason::Disconnected(reason),
                        });
                    }
                    if opened_once {
                        restart_used = false;
                    } else {
                        failures += 1;
                    }
                    skip_delay = reason == DisconnectReason::RestartRequired && !restart_used;
                    restart_used |= skip_delay;
                    state.send_replace(SupervisorState::Closed { reason });
                },
            }

            if self.backoff.exhausted(failures) {
                error!(failures, "reconnect attempts exhausted");
                return finish(SupervisorState::Failed {
                    reason: FailureReason::AttemptsExhausted { attempts: failures },
                });
            }

            if skip_delay {
                info!(generation, "restart requested, reconnecting now");
                continue;
            }

            let delay = self.backoff.delay_after(failures);
            info!(
                next_attempt = failures + 1,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return finish(SupervisorState::Stopped),
                _ = tokio::time::sleep(delay) => {},
            }
        }
    }
}

/// Observe and stop a spawned supervisor.
pub struct SupervisorHandle {
    state: watch::Receiver<SupervisorState>,
    shutdown: CancellationToken,
    task: JoinHandle<SupervisorState>,
}

impl SupervisorHandle {
    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `pred`. Returns the last
    /// published state if the supervisor ends first.
    pub async fn wait_for(&self, mut pred: impl FnMut(&SupervisorState) -> bool) -> SupervisorState {
        let mut rx = self.state.clone();
        let found = rx.wait_for(|s| pred(s)).await.map(|s| s.clone());
        found.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Close the active session and stop reconnecting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the supervisor to reach a terminal state.
    pub async fn join(self) -> SupervisorState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "supervisor task failed");
                SupervisorState::Failed {
                    reason: FailureReason::Internal(e.to_string()),
                }
            },
        }
    }
}
