//! Typed publish/subscribe bus that validates events before dispatch.

use std::fmt;

use serde_json::{json, Value};

use super::events::{BusEvent, EventDef};

/// Callback subscribed to a single event name
pub type Handler<E> = Box<dyn FnMut(&E) -> anyhow::Result<()>>;

#[derive(Debug)]
pub enum BusError {
    UnregisteredEvent(String),
    ArityMismatch {
        event: String,
        expected: usize,
        actual: usize,
    },
    AlreadyRegistered(String),
    /// One or more handlers failed; every handler still ran
    HandlerFailed {
        event: String,
        failures: Vec<anyhow::Error>,
    },
}

impl BusError {
    /// Errors caused by the emitter breaking the bus contract, as opposed to
    /// a handler failing.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, BusError::HandlerFailed { .. })
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::UnregisteredEvent(name) => write!(f, "Unregistered event: {name}"),
            BusError::ArityMismatch {
                event,
                expected,
                actual,
            } => write!(
                f,
                "Event {event} expects {expected} argument(s) but was emitted with {actual}"
            ),
            BusError::AlreadyRegistered(name) => write!(f, "Event {name} is already registered"),
            BusError::HandlerFailed { event, failures } => {
                write!(f, "{} handler(s) failed for event {event}", failures.len())?;
                if let Some(first) = failures.first() {
                    write!(f, ": {first:#}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for BusError {}

#[derive(Debug, Clone)]
struct Registration {
    name: String,
    description: String,
    params: Vec<String>,
}

/// Registry of declared events and their subscribers.
pub struct EventBus<E> {
    registrations: Vec<Registration>,
    handlers: Vec<(String, Handler<E>)>,
}

impl<E: BusEvent> EventBus<E> {
    /// Create a bus with the category's catalog already registered
    pub fn new() -> Self {
        let mut bus = Self::empty();
        for def in E::catalog() {
            bus.registrations.push(Registration {
                name: def.name.to_string(),
                description: def.description.to_string(),
                params: def.params.iter().map(|p| p.to_string()).collect(),
            });
        }
        bus
    }

    /// Create a bus with no registered events
    pub fn empty() -> Self {
        Self {
            registrations: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Register a batch of events. Nothing is registered if any name is
    /// already known or repeated within the batch.
    pub fn register_events(&mut self, defs: &[EventDef]) -> Result<(), BusError> {
        for (i, def) in defs.iter().enumerate() {
            if self.is_registered(def.name) || defs[..i].iter().any(|d| d.name == def.name) {
                return Err(BusError::AlreadyRegistered(def.name.to_string()));
            }
        }
        for def in defs {
            self.register_event(def.name, def.params, def.description)?;
        }
        Ok(())
    }

    /// Register a single event with its parameter names
    pub fn register_event(
        &mut self,
        name: &str,
        params: &[&str],
        description: &str,
    ) -> Result<(), BusError> {
        if self.is_registered(name) {
            return Err(BusError::AlreadyRegistered(name.to_string()));
        }
        self.registrations.push(Registration {
            name: name.to_string(),
            description: description.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        });
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registration(name).is_some()
    }

    fn registration(&self, name: &str) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.name == name)
    }

    /// Get all registered event names, in registration order
    pub fn event_names(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.name.as_str()).collect()
    }

    /// Subscribe to a registered event
    pub fn on(&mut self, name: &str, handler: Handler<E>) -> Result<(), BusError> {
        if !self.is_registered(name) {
            return Err(BusError::UnregisteredEvent(name.to_string()));
        }
        self.handlers.push((name.to_string(), handler));
        Ok(())
    }

    /// Get count of handlers subscribed to an event
    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.iter().filter(|(n, _)| n == name).count()
    }

    /// Validate `event` and run its handlers in subscription order.
    pub fn emit(&mut self, event: E) -> Result<(), BusError> {
        let name = event.name();
        let registration = self
            .registration(name)
            .ok_or_else(|| BusError::UnregisteredEvent(name.to_string()))?;
        if registration.params.len() != event.arity() {
            return Err(BusError::ArityMismatch {
                event: name.to_string(),
                expected: registration.params.len(),
                actual: event.arity(),
            });
        }

        let mut failures = Vec::new();
        for (subscribed, handler) in self.handlers.iter_mut() {
            if subscribed != name {
                continue;
            }
            if let Err(e) = handler(&event) {
                tracing::warn!("Handler for event '{}' failed: {:#}", name, e);
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BusError::HandlerFailed {
                event: name.to_string(),
                failures,
            })
        }
    }

    /// Get schema for all registered events as JSON
    pub fn schema(&self) -> Value {
        let mut events = serde_json::Map::new();
        for r in &self.registrations {
            events.insert(
                r.name.clone(),
                json!({
                    "description": r.description,
                    "params": r.params,
                }),
            );
        }
        Value::Object(events)
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::events::{ExampleEvent, NamedEvent};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let mut bus: EventBus<ExampleEvent> = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = log.clone();
            bus.on(
                "add:example",
                Box::new(move |e| {
                    if let ExampleEvent::AddExample(id) = e {
                        log.borrow_mut().push(format!("{tag}:{id}"));
                    }
                    Ok(())
                }),
            )
            .unwrap();
        }
        bus.emit(ExampleEvent::AddExample("x".into())).unwrap();
        assert_eq!(*log.borrow(), vec!["first:x", "second:x"]);
    }

    #[test]
    fn test_failing_handler_does_not_stop_others() {
        let mut bus: EventBus<ExampleEvent> = EventBus::new();
        let ran = Rc::new(RefCell::new(0));
        bus.on("remove:example", Box::new(|_| anyhow::bail!("boom")))
            .unwrap();
        let counter = ran.clone();
        bus.on(
            "remove:example",
            Box::new(move |_| {
                *counter.borrow_mut() += 1;
                Ok(())
            }),
        )
        .unwrap();

        let err = bus
            .emit(ExampleEvent::RemoveExample("x".into()))
            .unwrap_err();
        assert!(!err.is_contract_violation());
        match err {
            BusError::HandlerFailed { event, failures } => {
                assert_eq!(event, "remove:example");
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*ran.borrow(), 1);
    }

    #[test]
    fn test_named_events_are_checked() {
        let mut bus: EventBus<NamedEvent> = EventBus::new();
        assert!(matches!(
            bus.emit(NamedEvent::new("custom:thing", vec![])),
            Err(BusError::UnregisteredEvent(_))
        ));
        assert!(matches!(
            bus.on("custom:thing", Box::new(|_| Ok(()))),
            Err(BusError::UnregisteredEvent(_))
        ));

        bus.register_event("custom:thing", &["a", "b"], "").unwrap();
        assert!(matches!(
            bus.register_event("custom:thing", &[], ""),
            Err(BusError::AlreadyRegistered(_))
        ));
        match bus.emit(NamedEvent::new("custom:thing", vec![json!(1)])) {
            Err(BusError::ArityMismatch {
                expected, actual, ..
            }) => assert_eq!((expected, actual), (2, 1)),
            other => panic!("unexpected result: {other:?}"),
        }
        bus.emit(NamedEvent::new("custom:thing", vec![json!(1), json!(2)]))
            .unwrap();
    }

    #[test]
    fn test_register_events_is_all_or_nothing() {
        let mut bus: EventBus<NamedEvent> = EventBus::empty();
        let defs = [
            EventDef {
                name: "a:one",
                description: "",
                params: &[],
            },
            EventDef {
                name: "a:one",
                description: "",
                params: &["x"],
            },
        ];
        assert!(bus.register_events(&defs).is_err());
        assert!(bus.event_names().is_empty());
    }
}
