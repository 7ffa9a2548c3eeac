//! Bridge between a blocking agent program and the tick-based simulation.
//!
//! Each action call queues a uniquely identified [`Action`], then parks the
//! calling thread until the simulation reports that the action started and
//! later that it finished. Every wait re-checks a shared [`CancelToken`]
//! at least once per poll interval, so a superseded program unwinds at its
//! next suspension point without queueing anything further.

mod mailbox;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mailbox::AgentMailbox;
use mailbox::Waited;

use crate::protocol::{Action, ActionKind, ActionResult, AgentStatus, StepOutput, unix_time_seconds};

/// Bridge timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound between re-checks of cancellation and arrivals.
    pub poll_interval_ms: u64,
    /// How long to wait for the simulation to acknowledge an action.
    pub started_timeout_ms: u64,
    /// How long to wait for a started action to finish; `None` waits
    /// until cancelled.
    pub result_timeout_ms: Option<u64>,
    /// Pause after each spoken message.
    pub speak_pause_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            started_timeout_ms: 30_000,
            result_timeout_ms: Some(120_000),
            speak_pause_ms: 1_000,
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn speak_pause(&self) -> Duration {
        Duration::from_millis(self.speak_pause_ms)
    }
}

/// Cooperative cancellation flag shared by a supervisor and one program.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    Started,
    Completed,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitStage::Started => f.write_str("started"),
            WaitStage::Completed => f.write_str("completed"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The program was superseded; not a failure.
    #[error("program unwound by cancellation")]
    Unwound,

    #[error("timed out waiting for action {action_unique_id} to be {stage}")]
    TimedOut {
        action_unique_id: String,
        stage: WaitStage,
    },

    #[error("agent mailbox closed")]
    Closed,
}

/// Action-issuing handle bound to one agent program.
#[derive(Debug, Clone)]
pub struct ActionBridge {
    mailbox: Arc<AgentMailbox>,
    cancel: CancelToken,
    config: BridgeConfig,
}

impl ActionBridge {
    pub fn new(mailbox: Arc<AgentMailbox>, cancel: CancelToken, config: BridgeConfig) -> Self {
        Self {
            mailbox,
            cancel,
            config,
        }
    }

    pub fn mailbox(&self) -> &Arc<AgentMailbox> {
        &self.mailbox
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Fail with [`BridgeError::Unwound`] once cancellation is requested.
    pub fn check(&self) -> Result<(), BridgeError> {
        if self.cancel.is_cancelled() {
            Err(BridgeError::Unwound)
        } else {
            Ok(())
        }
    }

    /// Queue one action and block until its result arrives.
    pub fn perform(&self, kind: ActionKind) -> Result<ActionResult, BridgeError> {
        let action = Action::new(kind);
        let id = action.action_unique_id.clone();
        let kind_name = action.kind.name();

        let queued = self.mailbox.push_output_unless(
            || self.cancel.is_cancelled(),
            StepOutput::status(AgentStatus::WaitingForAction, unix_time_seconds())
                .with_actions(vec![action]),
        );
        if !queued {
            return Err(BridgeError::Unwound);
        }
        tracing::debug!(action_unique_id = %id, kind = kind_name, "Added action");

        let started_deadline =
            Instant::now() + Duration::from_millis(self.config.started_timeout_ms);
        self.wait_stage(&id, WaitStage::Started, Some(started_deadline), |state| {
            state.started.remove(&id).then_some(())
        })?;

        let result_deadline = self
            .config
            .result_timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let result = self.wait_stage(&id, WaitStage::Completed, result_deadline, |state| {
            state.results.remove(&id)
        })?;

        self.mailbox.push_output(StepOutput::status(
            AgentStatus::ActionDone,
            unix_time_seconds(),
        ));
        Ok(result)
    }

    /// Block for `duration`, unwinding early on cancellation.
    pub fn sleep(&self, duration: Duration) -> Result<(), BridgeError> {
        let deadline = Instant::now() + duration;
        match self.mailbox.wait_for(
            self.config.poll_interval(),
            Some(deadline),
            || self.cancel.is_cancelled(),
            |_| None::<()>,
        ) {
            Waited::TimedOut | Waited::Ready(()) => self.check(),
            Waited::Cancelled => Err(BridgeError::Unwound),
            Waited::Closed => Err(BridgeError::Closed),
        }
    }

    fn wait_stage<T>(
        &self,
        id: &str,
        stage: WaitStage,
        deadline: Option<Instant>,
        take: impl FnMut(&mut mailbox::MailboxState) -> Option<T>,
    ) -> Result<T, BridgeError> {
        match self.mailbox.wait_for(
            self.config.poll_interval(),
            deadline,
            || self.cancel.is_cancelled(),
            take,
        ) {
            Waited::Ready(value) => Ok(value),
            Waited::Cancelled => {
                self.mailbox.abandon(id);
                Err(BridgeError::Unwound)
            }
            Waited::Closed => {
                self.mailbox.abandon(id);
                Err(BridgeError::Closed)
            }
            Waited::TimedOut => {
                tracing::warn!(action_unique_id = %id, stage = %stage, "Action wait timed out");
                self.mailbox.abandon(id);
                Err(BridgeError::TimedOut {
                    action_unique_id: id.to_string(),
                    stage,
                })
            }
        }
    }
}
