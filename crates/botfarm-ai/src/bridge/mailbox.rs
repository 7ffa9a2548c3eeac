use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::protocol::{ActionResult, Observations, StepOutput};

#[derive(Debug, Default)]
pub(crate) struct MailboxState {
    outputs: Vec<StepOutput>,
    pub(crate) started: HashSet<String>,
    pub(crate) results: HashMap<String, ActionResult>,
    /// Actions whose wait timed out; late arrivals for them are dropped.
    pub(crate) orphaned: HashSet<String>,
    thoughts: Vec<String>,
    closed: bool,
}

pub(crate) enum Waited<T> {
    Ready(T),
    TimedOut,
    Cancelled,
    Closed,
}

/// State shared between an agent's worker and the program thread that
/// drives actions for it.
///
/// The worker feeds simulation events in and drains outputs; the program
/// thread queues outputs and blocks on arrivals. One mutex guards all of
/// it, and the condvar wakes waiters whenever something arrives.
#[derive(Debug, Default)]
pub struct AgentMailbox {
    state: Mutex<MailboxState>,
    arrivals: Condvar,
}

impl AgentMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, output: StepOutput) {
        self.state.lock().outputs.push(output);
    }

    /// Take every queued output in the order it was pushed.
    /// Queue `output` unless `cancelled` reports true, deciding under the
    /// same lock the queue is drained with.
    pub(crate) fn push_output_unless(
        &self,
        cancelled: impl Fn() -> bool,
        output: StepOutput,
    ) -> bool {
        let mut state = self.state.lock();
        if cancelled() {
            return false;
        }
        state.outputs.push(output);
        true
    }

    pub fn drain_outputs(&self) -> Vec<StepOutput> {
        std::mem::take(&mut self.state.lock().outputs)
    }

    pub fn pending_output_count(&self) -> usize {
        self.state.lock().outputs.len()
    }

    /// Record "started" ids and results reported by the simulation.
    pub fn receive(&self, observations: &Observations) {
        if observations.started_action_unique_ids.is_empty()
            && observations.action_results.is_empty()
        {
            return;
        }

        let mut state = self.state.lock();
        for id in &observations.started_action_unique_ids {
            if state.orphaned.contains(id) {
                tracing::debug!(action_unique_id = %id, "Dropping start of abandoned action");
                continue;
            }
            tracing::debug!(action_unique_id = %id, "Got action started");
            state.started.insert(id.clone());
        }
        for result in &observations.action_results {
            if state.orphaned.remove(&result.action_unique_id) {
                tracing::debug!(
                    action_unique_id = %result.action_unique_id,
                    "Dropping result of abandoned action"
                );
                continue;
            }
            tracing::debug!(action_unique_id = %result.action_unique_id, "Got action result");
            state
                .results
                .insert(result.action_unique_id.clone(), result.clone());
        }
        drop(state);
        self.arrivals.notify_all();
    }

    pub fn record_thought(&self, thought: impl Into<String>) {
        self.state.lock().thoughts.push(thought.into());
    }

    /// Thoughts recorded by programs since the last call.
    pub fn take_thoughts(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().thoughts)
    }

    /// Give up on an action: forget what has arrived for it and drop
    /// whatever arrives later.
    pub(crate) fn abandon(&self, action_unique_id: &str) {
        let mut state = self.state.lock();
        state.started.remove(action_unique_id);
        if state.results.remove(action_unique_id).is_none() {
            state.orphaned.insert(action_unique_id.to_string());
        }
    }

    /// Started ids and results held for waiters, plus abandoned ids.
    #[cfg(test)]
    pub(crate) fn tracked_action_counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (state.started.len(), state.results.len(), state.orphaned.len())
    }

    /// Wake every waiter so it re-checks cancellation.
    pub fn wake(&self) {
        self.arrivals.notify_all();
    }

    /// Refuse further waits and release current ones.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.arrivals.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Block until `take` yields a value, the deadline passes, `cancelled`
    /// reports true or the mailbox closes. Re-checks at least every `poll`.
    pub(crate) fn wait_for<T>(
        &self,
        poll: Duration,
        deadline: Option<Instant>,
        cancelled: impl Fn() -> bool,
        mut take: impl FnMut(&mut MailboxState) -> Option<T>,
    ) -> Waited<T> {
        let mut state = self.state.lock();
        loop {
            if cancelled() {
                return Waited::Cancelled;
            }
            if state.closed {
                return Waited::Closed;
            }
            if let Some(value) = take(&mut state) {
                return Waited::Ready(value);
            }

            let mut wait = poll;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Waited::TimedOut;
                }
                wait = wait.min(deadline - now);
            }
            self.arrivals.wait_for(&mut state, wait);
        }
    }
}
