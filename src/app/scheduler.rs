//! Debounced refresh of the grammar and trace.
//!
//! Edit notifications set dirty flags and (re)arm a [`ScheduledTask`]. When the
//! task comes due the owner calls [`RefreshScheduler::run_cycle`], which
//! rebuilds the grammar if its source changed, traces the input, and publishes
//! the results on the editor bus.
//!
//! A cycle always runs to completion. Bus contract violations are held back
//! until the scheduler state is consistent, then returned from `run_cycle`.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::app::grammar_builder::{self, GrammarError};
use crate::app::incremental::IncrementalMatcher;
use crate::app::trace_executor;
use crate::model::bus::{BusError, EventBus};
use crate::model::events::EditorEvent;
use crate::model::options::{FailureDisplay, OptionFlags, SHOW_FAILURES};
use crate::primitives::grammar::{Grammar, MatchError, Trace};

/// A cancellable deadline. Re-arming replaces the previous deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduledTask {
    deadline: Option<Instant>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Time left before the task is due, `None` if nothing is scheduled.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

/// Which sources changed since the last cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub grammar_changed: bool,
    pub input_changed: bool,
}

impl DirtyFlags {
    pub fn any(&self) -> bool {
        self.grammar_changed || self.input_changed
    }

    /// Snapshot and clear.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Pending,
    Running,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub cycles: u64,
    pub grammar_builds: u64,
    pub traces: u64,
    pub handler_failures: u64,
}

/// What a single cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub flags: DirtyFlags,
    pub grammar_rebuilt: bool,
    pub trace_executed: bool,
    pub trace_reused: bool,
    pub start_rule: Option<String>,
    pub handler_failures: usize,
    /// A match the cycle had to abandon, for the grammar source or the input
    pub match_error: Option<MatchError>,
}

/// Everything a cycle reads or writes that the scheduler does not own.
pub struct CycleContext<'a> {
    pub matcher: &'a mut IncrementalMatcher,
    pub bus: &'a mut EventBus<EditorEvent>,
    pub options: &'a mut OptionFlags,
    pub grammar_source: &'a str,
    pub input_source: &'a str,
    pub input_version: u64,
    pub start_rule: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceKey {
    grammar_generation: u64,
    start_rule: String,
    input_version: u64,
}

#[derive(Debug, Clone)]
struct CachedTrace {
    key: TraceKey,
    trace: Rc<Trace>,
}

pub struct RefreshScheduler {
    task: ScheduledTask,
    state: SchedulerState,
    dirty: DirtyFlags,
    failure_display: FailureDisplay,
    grammar: Option<Rc<Grammar>>,
    grammar_error: Option<GrammarError>,
    grammar_generation: u64,
    cached_trace: Option<CachedTrace>,
    stats: RefreshStats,
    /// First bus contract violation of the running cycle
    bus_violation: Option<BusError>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self {
            task: ScheduledTask::new(),
            state: SchedulerState::Idle,
            dirty: DirtyFlags::default(),
            failure_display: FailureDisplay::Implicit,
            grammar: None,
            grammar_error: None,
            grammar_generation: 0,
            cached_trace: None,
            stats: RefreshStats::default(),
            bus_violation: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn stats(&self) -> RefreshStats {
        self.stats
    }

    pub fn task(&self) -> &ScheduledTask {
        &self.task
    }

    pub fn failure_display(&self) -> FailureDisplay {
        self.failure_display
    }

    /// The grammar built by the latest grammar-change cycle.
    pub fn grammar(&self) -> Option<&Rc<Grammar>> {
        self.grammar.as_ref()
    }

    pub fn grammar_error(&self) -> Option<&GrammarError> {
        self.grammar_error.as_ref()
    }

    /// The trace published by the latest cycle, if it is still valid for the
    /// current grammar.
    pub fn current_trace(&self) -> Option<&Rc<Trace>> {
        self.cached_trace.as_ref().map(|cached| &cached.trace)
    }

    pub fn mark_grammar_changed(&mut self) {
        self.dirty.grammar_changed = true;
    }

    pub fn mark_input_changed(&mut self) {
        self.dirty.input_changed = true;
    }

    /// The user toggled `showFailures`; stop deriving it from the trace.
    pub fn set_explicit_failure_display(&mut self, show: bool) {
        self.failure_display = FailureDisplay::Explicit(show);
    }

    /// Arm (or re-arm) the refresh. The latest delay wins.
    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        self.task.arm(now, delay);
        self.state = SchedulerState::Pending;
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.task.is_due(now)
    }

    /// Run one refresh cycle now, whether or not the task is due.
    ///
    /// Fails only when an event broke the bus contract. The grammar, trace
    /// and stats are updated in full before that error is returned.
    pub fn run_cycle(&mut self, ctx: CycleContext<'_>) -> anyhow::Result<CycleReport> {
        self.task.cancel();
        self.state = SchedulerState::Running;
        let report = self.refresh(ctx);
        self.state = SchedulerState::Idle;
        match self.bus_violation.take() {
            Some(e) => Err(anyhow::Error::new(e).context("editor bus rejected a refresh event")),
            None => Ok(report),
        }
    }

    fn refresh(&mut self, ctx: CycleContext<'_>) -> CycleReport {
        let flags = self.dirty.take();
        self.stats.cycles += 1;
        let mut report = CycleReport {
            flags,
            ..CycleReport::default()
        };
        tracing::debug!(
            "Refresh cycle {} (grammar changed: {}, input changed: {})",
            self.stats.cycles,
            flags.grammar_changed,
            flags.input_changed
        );

        if flags.any() {
            self.failure_display = FailureDisplay::Implicit;
        }

        if flags.input_changed {
            let event = EditorEvent::InputChanged {
                source: Rc::from(ctx.input_source),
            };
            self.publish(ctx.bus, event, &mut report);
        }

        if flags.grammar_changed {
            let event = EditorEvent::GrammarChanged {
                source: Rc::from(ctx.grammar_source),
            };
            self.publish(ctx.bus, event, &mut report);

            self.stats.grammar_builds += 1;
            self.grammar_generation += 1;
            report.grammar_rebuilt = true;
            self.cached_trace = None;

            let result = match ctx.matcher.match_source() {
                Ok(result) => Rc::new(result),
                Err(e) => {
                    // No match result to publish; the error stands in for one
                    tracing::warn!("Grammar source could not be matched: {}", e);
                    self.grammar = None;
                    self.grammar_error = Some(GrammarError::from_match_error(&e));
                    report.match_error = Some(e);
                    return report;
                }
            };
            let outcome = grammar_builder::build_from_match(result);

            match (&outcome.grammar, &outcome.error) {
                (Some(grammar), _) => tracing::debug!("Built grammar {}", grammar.name()),
                (None, Some(error)) => tracing::debug!("Grammar error: {}", error.short_message),
                (None, None) => tracing::debug!("Grammar source declares no grammar"),
            }
            self.grammar = outcome.grammar.clone();
            self.grammar_error = outcome.error.clone();

            let event = EditorEvent::GrammarParsed {
                result: outcome.result,
                grammar: outcome.grammar,
                error: outcome.error,
            };
            self.publish(ctx.bus, event, &mut report);
        }

        let Some(grammar) = self.grammar.clone() else {
            return report;
        };
        let Some(start_rule) = trace_executor::resolve_start_rule(&grammar, ctx.start_rule) else {
            tracing::debug!("Grammar {} has no start rule; skipping trace", grammar.name());
            return report;
        };

        let key = TraceKey {
            grammar_generation: self.grammar_generation,
            start_rule: start_rule.to_string(),
            input_version: ctx.input_version,
        };
        let trace = match &self.cached_trace {
            Some(cached) if cached.key == key => {
                report.trace_reused = true;
                Rc::clone(&cached.trace)
            }
            _ => {
                let trace = match trace_executor::execute(&grammar, start_rule, ctx.input_source) {
                    Ok(trace) => Rc::new(trace),
                    Err(e) => {
                        tracing::warn!("Input could not be traced: {}", e);
                        self.cached_trace = None;
                        report.match_error = Some(e);
                        return report;
                    }
                };
                self.stats.traces += 1;
                report.trace_executed = true;
                self.cached_trace = Some(CachedTrace {
                    key,
                    trace: Rc::clone(&trace),
                });
                trace
            }
        };
        report.start_rule = Some(start_rule.to_string());

        if self.failure_display == FailureDisplay::Implicit {
            ctx.options.set(SHOW_FAILURES, trace.result().failed());
        }

        let event = EditorEvent::InputParsed {
            result: trace.shared_result(),
            trace,
        };
        self.publish(ctx.bus, event, &mut report);
        report
    }

    /// Emit on the bus. Handler failures were already logged by the bus; they
    /// are counted and the cycle carries on. A contract violation is kept for
    /// `run_cycle` to return once the cycle is over.
    fn publish(
        &mut self,
        bus: &mut EventBus<EditorEvent>,
        event: EditorEvent,
        report: &mut CycleReport,
    ) {
        match bus.emit(event) {
            Ok(()) => {}
            Err(BusError::HandlerFailed { failures, .. }) => {
                report.handler_failures += failures.len();
                self.stats.handler_failures += failures.len() as u64;
            }
            Err(e) => {
                tracing::error!("Refresh event rejected by the editor bus: {}", e);
                if self.bus_violation.is_none() {
                    self.bus_violation = Some(e);
                }
            }
        }
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}
