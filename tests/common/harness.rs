// Workbench driven by a virtual clock, recording every editor event

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use workbench::app::{CycleReport, Workbench};
use workbench::config::Config;
use workbench::model::events::{editor, BusEvent, EditorEvent};
use workbench::services::storage::{KeyValueStore, MemoryStore, GRAMMAR_KEY, INPUT_KEY};
use workbench::services::time_source::TestTimeSource;

pub struct WorkbenchHarness {
    pub workbench: Workbench,
    pub clock: Arc<TestTimeSource>,
    events: Rc<RefCell<Vec<EditorEvent>>>,
}

impl WorkbenchHarness {
    /// A workbench restored from a store holding `grammar` and `input`.
    /// Nothing has been refreshed yet.
    pub fn new(grammar: &str, input: &str) -> Self {
        let store = MemoryStore::with_values([(GRAMMAR_KEY, grammar), (INPUT_KEY, input)]);
        Self::with_store(Config::default(), Box::new(store))
    }

    pub fn with_store(config: Config, store: Box<dyn KeyValueStore>) -> Self {
        super::tracing::init_tracing_from_env();
        let clock = TestTimeSource::shared();
        let mut workbench = Workbench::open(config, clock.clone(), store).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        for def in editor::ALL {
            let events = Rc::clone(&events);
            workbench
                .editor_bus()
                .on(
                    def.name,
                    Box::new(move |event: &EditorEvent| {
                        events.borrow_mut().push(event.clone());
                        Ok(())
                    }),
                )
                .unwrap();
        }

        Self {
            workbench,
            clock,
            events,
        }
    }

    /// Advance past the edit debounce and run the refresh if one is due.
    pub fn settle(&mut self) -> Option<CycleReport> {
        let delay = self.workbench.config().refresh.edit_delay_ms;
        self.clock.advance_ms(delay);
        self.workbench.poll().unwrap()
    }

    pub fn take_events(&self) -> Vec<EditorEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn take_event_names(&self) -> Vec<String> {
        self.take_events()
            .iter()
            .map(|event| event.name().to_string())
            .collect()
    }
}
