// Integration tests - the refresh pipeline driven through the workbench

mod common;

use std::rc::Rc;

use common::harness::WorkbenchHarness;
use tempfile::TempDir;
use workbench::app::Workbench;
use workbench::config::Config;
use workbench::model::bus::{BusError, EventBus};
use workbench::model::document::{DocumentChange, Position};
use workbench::model::events::{BusEvent, EditorEvent, ExampleEvent, NamedEvent, SemanticsEvent};
use workbench::model::options::{SHOW_FAILURES, SHOW_SPACES};
use workbench::primitives::grammar::{MatchError, MatchResult, Trace, MAX_APPLICATION_DEPTH};
use workbench::services::storage::{FileStore, KeyValueStore, GRAMMAR_KEY, INPUT_KEY};
use workbench::services::time_source::TestTimeSource;

const GRAMMAR_A: &str = "G { start = \"a\" }";

fn parsed_inputs(events: &[EditorEvent]) -> Vec<(Rc<MatchResult>, Rc<Trace>)> {
    events
        .iter()
        .filter_map(|event| match event {
            EditorEvent::InputParsed { result, trace } => Some((result.clone(), trace.clone())),
            _ => None,
        })
        .collect()
}

fn parsed_grammar(events: &[EditorEvent]) -> Option<&EditorEvent> {
    events
        .iter()
        .find(|event| matches!(event, EditorEvent::GrammarParsed { .. }))
}

#[test]
fn test_scenario_a_matching_input() {
    let mut h = WorkbenchHarness::new(GRAMMAR_A, "a");
    let report = h.settle().unwrap();
    assert!(report.grammar_rebuilt);
    assert!(report.trace_executed);

    let events = h.take_events();
    match parsed_grammar(&events) {
        Some(EditorEvent::GrammarParsed { grammar, error, .. }) => {
            assert!(error.is_none());
            assert_eq!(grammar.as_ref().unwrap().name(), "G");
        }
        other => panic!("expected parse:grammar, got {other:?}"),
    }

    let inputs = parsed_inputs(&events);
    assert_eq!(inputs.len(), 1);
    let (result, _) = &inputs[0];
    assert!(result.succeeded());
    assert_eq!(result.match_length(), 1);
    assert!(!h.workbench.options().get(SHOW_FAILURES));
}

#[test]
fn test_scenario_b_failing_input() {
    let mut h = WorkbenchHarness::new(GRAMMAR_A, "b");
    h.settle().unwrap();

    let inputs = parsed_inputs(&h.take_events());
    let (result, trace) = &inputs[0];
    assert!(result.failed());
    assert_eq!(result.rightmost_failure_position(), Some(0));
    assert!(!trace.failures().is_empty());
    insta::assert_snapshot!(result.message(), @r#"
    Line 1, col 1:
    > 1 | b
          ^
    Expected "a"
    "#);

    // Failures are shown automatically while the input fails to match
    assert!(h.workbench.options().get(SHOW_FAILURES));
}

#[test]
fn test_scenario_c_malformed_grammar() {
    let mut h = WorkbenchHarness::new("G { start = }", "a");
    let report = h.settle().unwrap();
    assert!(report.grammar_rebuilt);
    assert!(!report.trace_executed);

    let events = h.take_events();
    match parsed_grammar(&events) {
        Some(EditorEvent::GrammarParsed { grammar, error, .. }) => {
            assert!(grammar.is_none());
            assert!(!error.as_ref().unwrap().message.is_empty());
        }
        other => panic!("expected parse:grammar, got {other:?}"),
    }
    assert!(parsed_inputs(&events).is_empty());
    assert!(h.workbench.grammar().is_none());
    assert!(h.workbench.current_trace().is_none());
}

#[test]
fn test_breaking_the_grammar_drops_the_old_trace() {
    let mut h = WorkbenchHarness::new(GRAMMAR_A, "a");
    h.settle().unwrap();
    assert!(h.workbench.current_trace().is_some());
    h.take_events();

    // Delete the closing brace
    let len = h.workbench.grammar_source().len();
    h.workbench.edit_grammar_range(len - 1, len, "").unwrap();
    h.settle().unwrap();

    let events = h.take_events();
    assert!(parsed_inputs(&events).is_empty());
    assert!(h.workbench.grammar().is_none());
    assert!(h.workbench.current_trace().is_none());
    let error = h.workbench.grammar_error().unwrap();
    assert!(error.short_message.starts_with("Line 1, col 17:"));
}

#[test]
fn test_scenario_d_no_start_rule() {
    let mut h = WorkbenchHarness::new("G { }", "a");
    h.workbench.set_start_rule(Some("missing"));
    let report = h.settle().unwrap();
    assert!(report.grammar_rebuilt);
    assert!(report.start_rule.is_none());
    assert!(!report.trace_executed);
    assert!(h.workbench.grammar().is_some());
    assert!(parsed_inputs(&h.take_events()).is_empty());
}

#[test]
fn test_scenario_e_option_toggle_reuses_grammar_and_trace() {
    let mut h = WorkbenchHarness::new(GRAMMAR_A, "a");
    h.settle().unwrap();
    let before = h.workbench.stats();
    let first_trace = h.workbench.current_trace().unwrap().clone();
    h.take_events();

    h.workbench.set_option(SHOW_SPACES, true).unwrap();
    assert!(!h.workbench.scheduler().dirty().any());
    // Option changes use the option delay, which defaults to zero
    let report = h.workbench.poll().unwrap().unwrap();
    assert!(!report.grammar_rebuilt);
    assert!(report.trace_reused);

    let after = h.workbench.stats();
    assert_eq!(after.grammar_builds, before.grammar_builds);
    assert_eq!(after.traces, before.traces);
    assert_eq!(after.cycles, before.cycles + 1);

    let events = h.take_events();
    assert_eq!(
        events.iter().map(|e| e.name()).collect::<Vec<_>>(),
        vec!["change:option", "parse:input"]
    );
    let inputs = parsed_inputs(&events);
    assert!(Rc::ptr_eq(&inputs[0].1, &first_trace));
}

#[test]
fn test_deeply_nested_input_is_traced() {
    let input = "a".repeat(10_000);
    let mut h = WorkbenchHarness::new("G { start = \"a\" start | end }", &input);
    let report = h.workbench.refresh_now().unwrap();
    assert!(report.trace_executed);
    assert!(report.match_error.is_none());

    let inputs = parsed_inputs(&h.take_events());
    let (result, trace) = &inputs[0];
    assert!(result.succeeded());
    assert_eq!(result.match_length(), 10_000);
    let spans = trace.rule_spans();
    assert_eq!(spans.len(), 10_001);
    assert_eq!((spans[0].start, spans[0].end), (0, 10_000));
}

#[test]
fn test_input_past_the_depth_cap_is_reported() {
    let input = "a".repeat(MAX_APPLICATION_DEPTH + 1);
    let mut h = WorkbenchHarness::new("G { start = \"a\" start | end }", &input);
    let report = h.workbench.refresh_now().unwrap();
    assert!(!report.trace_executed);
    assert!(matches!(report.match_error, Some(MatchError::TooDeep { .. })));
    assert!(h.workbench.grammar().is_some());
    assert!(h.workbench.current_trace().is_none());
    assert!(parsed_inputs(&h.take_events()).is_empty());

    // Cutting the input back below the cap recovers
    h.workbench
        .edit_input_range(10_000, input.len(), "")
        .unwrap();
    let report = h.settle().unwrap();
    assert!(report.trace_executed);
    assert!(h.workbench.current_trace().unwrap().result().succeeded());
}

#[test]
fn test_explicit_show_failures_holds_until_an_edit() {
    let mut h = WorkbenchHarness::new(GRAMMAR_A, "b");
    h.settle().unwrap();
    assert!(h.workbench.options().get(SHOW_FAILURES));

    h.workbench.set_option(SHOW_FAILURES, false).unwrap();
    h.workbench.poll().unwrap().unwrap();
    assert!(!h.workbench.options().get(SHOW_FAILURES));

    h.workbench.edit_input_range(0, 1, "c").unwrap();
    h.settle().unwrap();
    assert!(h.workbench.options().get(SHOW_FAILURES));
}

#[test]
fn test_edits_within_the_window_coalesce() {
    let mut h = WorkbenchHarness::new(GRAMMAR_A, "");
    h.settle().unwrap();
    let cycles = h.workbench.stats().cycles;
    h.take_events();

    h.workbench.edit_input_range(0, 0, "a").unwrap();
    h.clock.advance_ms(100);
    assert!(h.workbench.poll().unwrap().is_none());

    // Replace `"a"` with `"a"+`
    let end = h.workbench.grammar_source().len() - 2;
    h.workbench.edit_grammar_range(end, end, "+").unwrap();
    h.clock.advance_ms(200);
    assert!(h.workbench.poll().unwrap().is_none());

    h.workbench
        .edit_input(&DocumentChange::insert(Position::new(0, 1), "aa"))
        .unwrap();
    h.clock.advance_ms(249);
    assert!(h.workbench.poll().unwrap().is_none());
    h.clock.advance_ms(1);
    let report = h.workbench.poll().unwrap().unwrap();

    assert!(report.flags.grammar_changed);
    assert!(report.flags.input_changed);
    assert_eq!(h.workbench.stats().cycles, cycles + 1);
    assert!(h.workbench.poll().unwrap().is_none());

    assert_eq!(
        h.take_event_names(),
        vec![
            "change:inputEditor",
            "change:grammarEditor",
            "change:inputEditor",
            "change:input",
            "change:grammar",
            "parse:grammar",
            "parse:input",
        ]
    );
    assert_eq!(h.workbench.input_source(), "aaa");
    assert!(h.workbench.current_trace().unwrap().result().succeeded());
}

#[test]
fn test_grammar_edits_match_a_fresh_parse() {
    let mut h = WorkbenchHarness::new("G {\n  start = \"a\"\n}", "b");
    h.settle().unwrap();

    let change = DocumentChange::new(Position::new(1, 10), Position::new(1, 13), "letter");
    h.workbench.edit_grammar(&change).unwrap();
    h.settle().unwrap();
    assert_eq!(h.workbench.grammar_source(), "G {\n  start = letter\n}");
    assert_eq!(h.workbench.matcher().input(), h.workbench.grammar_source());
    assert!(h.workbench.current_trace().unwrap().result().succeeded());
}

#[test]
fn test_handler_failure_does_not_stop_the_cycle() {
    let mut h = WorkbenchHarness::new(GRAMMAR_A, "a");
    h.workbench
        .editor_bus()
        .on(
            "parse:grammar",
            Box::new(|_: &EditorEvent| Err(anyhow::anyhow!("renderer crashed"))),
        )
        .unwrap();
    let report = h.settle().unwrap();
    assert_eq!(report.handler_failures, 1);
    assert!(report.trace_executed);
    assert_eq!(parsed_inputs(&h.take_events()).len(), 1);
}

#[test]
fn test_buses_are_independent() {
    let mut h = WorkbenchHarness::new(GRAMMAR_A, "a");
    h.workbench
        .semantics_bus()
        .emit(SemanticsEvent::SelectOperation("eval".into()))
        .unwrap();
    h.workbench
        .example_bus()
        .emit(ExampleEvent::AddExample("ex1".into()))
        .unwrap();
    assert!(h.take_events().is_empty());

    assert!(matches!(
        h.workbench.example_bus().on("parse:input", Box::new(|_| Ok(()))),
        Err(BusError::UnregisteredEvent(_))
    ));
}

#[test]
fn test_named_events_are_checked_at_runtime() {
    let mut bus: EventBus<NamedEvent> = EventBus::empty();
    bus.register_event("ping", &["count"], "Ping with a counter")
        .unwrap();

    assert!(bus.emit(NamedEvent::new("ping", vec![1.into()])).is_ok());
    assert!(matches!(
        bus.emit(NamedEvent::new("ping", vec![])),
        Err(BusError::ArityMismatch {
            expected: 1,
            actual: 0,
            ..
        })
    ));
    assert!(matches!(
        bus.emit(NamedEvent::new("pong", vec![])),
        Err(BusError::UnregisteredEvent(_))
    ));
}

#[test]
fn test_sources_persist_across_sessions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let config = Config::default();

    {
        let store = FileStore::open(&path).unwrap();
        let mut h = WorkbenchHarness::with_store(config.clone(), Box::new(store));
        h.settle().unwrap();
        h.workbench.set_grammar_source(GRAMMAR_A).unwrap();
        h.workbench.set_input_source("a").unwrap();
        h.settle().unwrap();
    }

    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.get(GRAMMAR_KEY).unwrap().as_deref(), Some(GRAMMAR_A));
    assert_eq!(store.get(INPUT_KEY).unwrap().as_deref(), Some("a"));

    let mut workbench =
        Workbench::open(config, TestTimeSource::shared(), Box::new(store)).unwrap();
    assert_eq!(workbench.grammar_source(), GRAMMAR_A);
    let report = workbench.flush().unwrap().unwrap();
    assert!(report.trace_executed);
    assert!(workbench.current_trace().unwrap().result().succeeded());
}
