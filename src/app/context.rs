//! The workbench: the grammar and input documents plus everything derived
//! from them.

use std::rc::Rc;
use std::time::Duration;

use anyhow::Context as _;

use crate::app::grammar_builder::GrammarError;
use crate::app::incremental::IncrementalMatcher;
use crate::app::scheduler::{CycleContext, CycleReport, RefreshScheduler, RefreshStats};
use crate::config::Config;
use crate::model::bus::{BusError, EventBus};
use crate::model::document::{DocumentChange, TextDocument};
use crate::model::events::{EditorEvent, ExampleEvent, SemanticsEvent};
use crate::model::options::{OptionFlags, SHOW_FAILURES};
use crate::primitives::grammar::{Grammar, Trace};
use crate::services::storage::{KeyValueStore, GRAMMAR_KEY, INPUT_KEY};
use crate::services::time_source::SharedTimeSource;

pub struct Workbench {
    config: Config,
    time_source: SharedTimeSource,
    store: Box<dyn KeyValueStore>,
    grammar_doc: TextDocument,
    input_doc: TextDocument,
    matcher: IncrementalMatcher,
    scheduler: RefreshScheduler,
    options: OptionFlags,
    start_rule: Option<String>,
    editor_bus: EventBus<EditorEvent>,
    semantics_bus: EventBus<SemanticsEvent>,
    example_bus: EventBus<ExampleEvent>,
}

impl Workbench {
    /// Create an empty workbench. Call [`Workbench::restore`] to load the
    /// stored sources.
    pub fn new(config: Config, time_source: SharedTimeSource, store: Box<dyn KeyValueStore>) -> Self {
        let options = OptionFlags::from(config.options.clone());
        Self {
            config,
            time_source,
            store,
            grammar_doc: TextDocument::default(),
            input_doc: TextDocument::default(),
            matcher: IncrementalMatcher::new(),
            scheduler: RefreshScheduler::new(),
            options,
            start_rule: None,
            editor_bus: EventBus::new(),
            semantics_bus: EventBus::new(),
            example_bus: EventBus::new(),
        }
    }

    /// Create a workbench and restore its sources from `store`.
    pub fn open(
        config: Config,
        time_source: SharedTimeSource,
        store: Box<dyn KeyValueStore>,
    ) -> anyhow::Result<Self> {
        let mut workbench = Self::new(config, time_source, store);
        workbench.restore()?;
        Ok(workbench)
    }

    /// Load the grammar (or the sample grammar) and input from the store and
    /// schedule an immediate refresh.
    pub fn restore(&mut self) -> anyhow::Result<()> {
        let grammar = match self.store.get(GRAMMAR_KEY) {
            Ok(Some(grammar)) => grammar,
            Ok(None) => self.config.sample_grammar.clone(),
            Err(e) => {
                tracing::warn!("Failed to read stored grammar, using sample: {}", e);
                self.config.sample_grammar.clone()
            }
        };
        let input = match self.store.get(INPUT_KEY) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Failed to read stored input: {}", e);
                String::new()
            }
        };

        tracing::info!(
            "Restoring workbench ({} bytes of grammar, {} bytes of input)",
            grammar.len(),
            input.len()
        );
        self.matcher.set_input(&grammar);
        self.grammar_doc.set_text(&grammar);
        self.input_doc.set_text(&input);
        self.scheduler.mark_grammar_changed();
        self.scheduler.mark_input_changed();
        self.schedule(Duration::ZERO);
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grammar_source(&self) -> &str {
        self.grammar_doc.text()
    }

    pub fn input_source(&self) -> &str {
        self.input_doc.text()
    }

    pub fn grammar_document(&self) -> &TextDocument {
        &self.grammar_doc
    }

    pub fn input_document(&self) -> &TextDocument {
        &self.input_doc
    }

    pub fn options(&self) -> &OptionFlags {
        &self.options
    }

    pub fn start_rule(&self) -> Option<&str> {
        self.start_rule.as_deref()
    }

    pub fn grammar(&self) -> Option<&Rc<Grammar>> {
        self.scheduler.grammar()
    }

    pub fn grammar_error(&self) -> Option<&GrammarError> {
        self.scheduler.grammar_error()
    }

    pub fn current_trace(&self) -> Option<&Rc<Trace>> {
        self.scheduler.current_trace()
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> RefreshStats {
        self.scheduler.stats()
    }

    pub fn matcher(&self) -> &IncrementalMatcher {
        &self.matcher
    }

    pub fn editor_bus(&mut self) -> &mut EventBus<EditorEvent> {
        &mut self.editor_bus
    }

    pub fn semantics_bus(&mut self) -> &mut EventBus<SemanticsEvent> {
        &mut self.semantics_bus
    }

    pub fn example_bus(&mut self) -> &mut EventBus<ExampleEvent> {
        &mut self.example_bus
    }

    /// Replace the whole grammar source.
    pub fn set_grammar_source(&mut self, text: &str) -> Result<(), BusError> {
        if !self.grammar_doc.set_text(text) {
            return Ok(());
        }
        self.matcher.set_input(text);
        self.grammar_edited()
    }

    /// Apply an editor change to the grammar source.
    pub fn edit_grammar(&mut self, change: &DocumentChange) -> anyhow::Result<()> {
        self.matcher.apply_change(&self.grammar_doc, change)?;
        self.grammar_doc.apply(change)?;
        self.grammar_edited()?;
        Ok(())
    }

    /// Replace the byte range `from..to` of the grammar source.
    pub fn edit_grammar_range(&mut self, from: usize, to: usize, text: &str) -> anyhow::Result<()> {
        self.matcher.replace_input_range(from, to, text)?;
        self.grammar_doc.replace_range(from, to, text)?;
        self.grammar_edited()?;
        Ok(())
    }

    fn grammar_edited(&mut self) -> Result<(), BusError> {
        self.scheduler.mark_grammar_changed();
        self.schedule(self.edit_delay());
        self.editor_bus.emit(EditorEvent::GrammarEditorChanged {
            version: self.grammar_doc.version(),
        })
    }

    /// Replace the whole input source.
    pub fn set_input_source(&mut self, text: &str) -> Result<(), BusError> {
        if !self.input_doc.set_text(text) {
            return Ok(());
        }
        self.input_edited()
    }

    pub fn edit_input(&mut self, change: &DocumentChange) -> anyhow::Result<()> {
        self.input_doc.apply(change)?;
        self.input_edited()?;
        Ok(())
    }

    pub fn edit_input_range(&mut self, from: usize, to: usize, text: &str) -> anyhow::Result<()> {
        self.input_doc.replace_range(from, to, text)?;
        self.input_edited()?;
        Ok(())
    }

    fn input_edited(&mut self) -> Result<(), BusError> {
        self.scheduler.mark_input_changed();
        self.schedule(self.edit_delay());
        self.editor_bus.emit(EditorEvent::InputEditorChanged {
            version: self.input_doc.version(),
        })
    }

    /// Toggle an option. Setting `showFailures` by hand overrides the value
    /// derived from the trace until one of the sources changes.
    pub fn set_option(&mut self, name: &str, value: bool) -> Result<(), BusError> {
        if name == SHOW_FAILURES {
            self.scheduler.set_explicit_failure_display(value);
        }
        self.options.set(name, value);
        self.schedule(self.option_delay());
        self.editor_bus.emit(EditorEvent::OptionChanged(name.to_string()))
    }

    /// Select the start rule for tracing. `None` means the grammar's default.
    pub fn set_start_rule(&mut self, rule: Option<&str>) {
        self.start_rule = rule.map(str::to_string);
        self.schedule(self.option_delay());
    }

    fn edit_delay(&self) -> Duration {
        Duration::from_millis(self.config.refresh.edit_delay_ms)
    }

    fn option_delay(&self) -> Duration {
        Duration::from_millis(self.config.refresh.option_delay_ms)
    }

    fn schedule(&mut self, delay: Duration) {
        self.scheduler.schedule(self.time_source.now(), delay);
    }

    /// Time left before the pending refresh is due.
    pub fn time_until_refresh(&self) -> Option<Duration> {
        self.scheduler.task().remaining(self.time_source.now())
    }

    /// Run the refresh if it is due.
    pub fn poll(&mut self) -> anyhow::Result<Option<CycleReport>> {
        if self.scheduler.is_due(self.time_source.now()) {
            self.refresh_now().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Run the pending refresh immediately, if there is one.
    pub fn flush(&mut self) -> anyhow::Result<Option<CycleReport>> {
        if self.scheduler.task().is_pending() {
            self.refresh_now().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Run a refresh cycle now and persist the sources.
    pub fn refresh_now(&mut self) -> anyhow::Result<CycleReport> {
        let report = self
            .scheduler
            .run_cycle(CycleContext {
                matcher: &mut self.matcher,
                bus: &mut self.editor_bus,
                options: &mut self.options,
                grammar_source: self.grammar_doc.text(),
                input_source: self.input_doc.text(),
                input_version: self.input_doc.version(),
                start_rule: self.start_rule.as_deref(),
            })
            .context("refresh cycle failed")?;
        self.persist(report.flags.grammar_changed);
        Ok(report)
    }

    fn persist(&mut self, grammar_changed: bool) {
        if let Err(e) = self.store.set(INPUT_KEY, self.input_doc.text()) {
            tracing::warn!("Failed to save input: {}", e);
        }
        if grammar_changed {
            if let Err(e) = self.store.set(GRAMMAR_KEY, self.grammar_doc.text()) {
                tracing::warn!("Failed to save grammar: {}", e);
            }
        }
    }
}
