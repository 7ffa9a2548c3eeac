//! Step phases and prompt pacing.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    ConsumingObservations,
    MaybeCompacting,
    DecidingToPrompt,
    RunningPrompt,
    ApplyingResponse,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepPhase::ConsumingObservations => "consuming-observations",
            StepPhase::MaybeCompacting => "maybe-compacting",
            StepPhase::DecidingToPrompt => "deciding-to-prompt",
            StepPhase::RunningPrompt => "running-prompt",
            StepPhase::ApplyingResponse => "applying-response",
        };
        f.write_str(name)
    }
}

/// How the prompt interval reacts to agent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadencePolicy {
    /// Same interval regardless of state.
    Uniform,
    /// Faster when something important is unseen, slower while a program
    /// is still carrying out the previous plan.
    Adaptive,
}

/// Minimum wall-clock seconds between completed prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptCadence {
    pub uniform_secs: f64,
    pub high_priority_secs: f64,
    pub idle_secs: f64,
    pub script_running_secs: f64,
}

impl Default for PromptCadence {
    fn default() -> Self {
        Self {
            uniform_secs: 5.0,
            high_priority_secs: 8.0,
            idle_secs: 15.0,
            script_running_secs: 60.0,
        }
    }
}

impl PromptCadence {
    /// Every interval zero, so each step prompts.
    pub fn immediate() -> Self {
        Self {
            uniform_secs: 0.0,
            high_priority_secs: 0.0,
            idle_secs: 0.0,
            script_running_secs: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepScheduler {
    policy: CadencePolicy,
    cadence: PromptCadence,
    phase: StepPhase,
    /// Simulation time the last successful prompt was sent at.
    previous_prompt_send_time: Option<f64>,
    /// Wall-clock time the last prompt finished at.
    previous_prompt_done_time: Option<f64>,
}

impl StepScheduler {
    pub fn new(policy: CadencePolicy, cadence: PromptCadence) -> Self {
        Self {
            policy,
            cadence,
            phase: StepPhase::ConsumingObservations,
            previous_prompt_send_time: None,
            previous_prompt_done_time: None,
        }
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn enter(&mut self, phase: StepPhase) {
        tracing::trace!(from = %self.phase, to = %phase, "Step phase");
        self.phase = phase;
    }

    pub fn interval(&self, has_unseen_high_priority: bool, script_running: bool) -> f64 {
        match self.policy {
            CadencePolicy::Uniform => self.cadence.uniform_secs,
            CadencePolicy::Adaptive if has_unseen_high_priority => self.cadence.high_priority_secs,
            CadencePolicy::Adaptive if script_running => self.cadence.script_running_secs,
            CadencePolicy::Adaptive => self.cadence.idle_secs,
        }
    }

    /// Whether enough wall-clock time has passed since the last prompt.
    pub fn should_prompt(
        &self,
        now: f64,
        has_unseen_high_priority: bool,
        script_running: bool,
    ) -> bool {
        let Some(done) = self.previous_prompt_done_time else {
            return true;
        };
        let elapsed = now - done;
        let interval = self.interval(has_unseen_high_priority, script_running);
        if elapsed >= interval {
            true
        } else {
            tracing::trace!(elapsed, interval, "Not prompting yet");
            false
        }
    }

    /// Record a prompt that produced a usable response.
    pub fn prompt_completed(&mut self, sent_at_simulation_time: f64, done_at: f64) {
        self.previous_prompt_send_time = Some(sent_at_simulation_time);
        self.previous_prompt_done_time = Some(done_at);
    }

    /// Push the next attempt out by one interval without moving the
    /// activity split, so a throttled model is not retried every tick.
    pub fn prompt_deferred(&mut self, done_at: f64) {
        self.previous_prompt_done_time = Some(done_at);
    }

    pub fn previous_prompt_send_time(&self) -> Option<f64> {
        self.previous_prompt_send_time
    }

    /// Time the activity split is taken at; everything counts as new
    /// before the first prompt.
    pub fn activity_split_time(&self) -> f64 {
        self.previous_prompt_send_time.unwrap_or(f64::NEG_INFINITY)
    }

    pub fn seconds_since_previous_prompt(&self, simulation_time: f64) -> f64 {
        self.previous_prompt_send_time
            .map(|sent| simulation_time - sent)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_always_prompts() {
        let scheduler = StepScheduler::new(CadencePolicy::Uniform, PromptCadence::default());
        assert!(scheduler.should_prompt(0.0, false, false));
    }

    #[test]
    fn test_uniform_interval() {
        let mut scheduler = StepScheduler::new(CadencePolicy::Uniform, PromptCadence::default());
        scheduler.prompt_completed(10.0, 1_000.0);
        assert!(!scheduler.should_prompt(1_004.0, true, false));
        assert!(scheduler.should_prompt(1_005.0, false, false));
    }

    #[test]
    fn test_adaptive_intervals() {
        let mut scheduler = StepScheduler::new(CadencePolicy::Adaptive, PromptCadence::default());
        scheduler.prompt_completed(10.0, 1_000.0);

        assert!(scheduler.should_prompt(1_008.0, true, true));
        assert!(!scheduler.should_prompt(1_014.0, false, false));
        assert!(scheduler.should_prompt(1_015.0, false, false));
        assert!(!scheduler.should_prompt(1_059.0, false, true));
        assert!(scheduler.should_prompt(1_060.0, false, true));
    }

    #[test]
    fn test_deferral_keeps_activity_split() {
        let mut scheduler = StepScheduler::new(CadencePolicy::Uniform, PromptCadence::default());
        scheduler.prompt_deferred(50.0);
        assert_eq!(scheduler.previous_prompt_send_time(), None);
        assert_eq!(scheduler.activity_split_time(), f64::NEG_INFINITY);
        assert!(!scheduler.should_prompt(52.0, false, false));
        assert_eq!(scheduler.seconds_since_previous_prompt(99.0), 0.0);
    }
}
