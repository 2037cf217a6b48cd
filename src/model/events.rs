//! Event catalogs for the workbench buses.
//!
//! Every event a bus can carry is declared up front with its ordered parameter
//! names. Each category is an enum implementing [`BusEvent`] so handlers get
//! typed payloads; [`NamedEvent`] covers names only known at runtime.

use std::rc::Rc;

use serde_json::{json, Value};

use crate::app::grammar_builder::GrammarError;
use crate::primitives::grammar::{Failure, Grammar, MatchResult, Trace};

/// Event definition with name and ordered parameter names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDef {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
}

impl EventDef {
    pub fn schema(&self) -> Value {
        json!({
            "description": self.description,
            "params": self.params,
        })
    }
}

/// An event that can travel over an [`EventBus`](super::bus::EventBus).
pub trait BusEvent {
    /// Namespaced event name, e.g. "parse:grammar"
    fn name(&self) -> &str;

    /// Number of arguments the event carries
    fn arity(&self) -> usize;

    /// Events registered on a freshly created bus for this category
    fn catalog() -> &'static [EventDef]
    where
        Self: Sized;
}

// ===== Editor Events =====

pub mod editor {
    use super::EventDef;

    pub const CHANGE_INPUT_EDITOR: EventDef = EventDef {
        name: "change:inputEditor",
        description: "The input editor contents changed",
        params: &["version"],
    };

    pub const CHANGE_GRAMMAR_EDITOR: EventDef = EventDef {
        name: "change:grammarEditor",
        description: "The grammar editor contents changed",
        params: &["version"],
    };

    pub const CHANGE_GRAMMAR: EventDef = EventDef {
        name: "change:grammar",
        description: "A refresh picked up a new grammar source",
        params: &["grammarSource"],
    };

    pub const CHANGE_INPUT: EventDef = EventDef {
        name: "change:input",
        description: "A refresh picked up a new input source",
        params: &["inputSource"],
    };

    pub const PARSE_GRAMMAR: EventDef = EventDef {
        name: "parse:grammar",
        description: "The grammar source was parsed and built",
        params: &["matchResult", "grammar", "err"],
    };

    pub const PARSE_INPUT: EventDef = EventDef {
        name: "parse:input",
        description: "The input was traced against the current grammar",
        params: &["matchResult", "trace"],
    };

    pub const PEEK_FAILURE: EventDef = EventDef {
        name: "peek:failure",
        description: "A failure is being hovered",
        params: &["failure"],
    };

    pub const UNPEEK_FAILURE: EventDef = EventDef {
        name: "unpeek:failure",
        description: "A failure is no longer hovered",
        params: &[],
    };

    pub const GOTO_FAILURE: EventDef = EventDef {
        name: "goto:failure",
        description: "Jump to a failure location",
        params: &["failure"],
    };

    pub const PEEK_RULE_DEFINITION: EventDef = EventDef {
        name: "peek:ruleDefinition",
        description: "A rule definition is being hovered",
        params: &["ruleName"],
    };

    pub const UNPEEK_RULE_DEFINITION: EventDef = EventDef {
        name: "unpeek:ruleDefinition",
        description: "A rule definition is no longer hovered",
        params: &[],
    };

    pub const CHANGE_OPTION: EventDef = EventDef {
        name: "change:option",
        description: "An option flag was toggled",
        params: &["optionName"],
    };

    pub const ALL: &[EventDef] = &[
        CHANGE_INPUT_EDITOR,
        CHANGE_GRAMMAR_EDITOR,
        CHANGE_GRAMMAR,
        CHANGE_INPUT,
        PARSE_GRAMMAR,
        PARSE_INPUT,
        PEEK_FAILURE,
        UNPEEK_FAILURE,
        GOTO_FAILURE,
        PEEK_RULE_DEFINITION,
        UNPEEK_RULE_DEFINITION,
        CHANGE_OPTION,
    ];
}

// ===== Semantics Events =====

pub mod semantics {
    use super::EventDef;

    pub const ADD_OPERATION: EventDef = EventDef {
        name: "add:operation",
        description: "A semantic operation or attribute was added",
        params: &["type", "name", "optArguments"],
    };

    pub const SELECT_OPERATION: EventDef = EventDef {
        name: "select:operation",
        description: "A semantic operation was selected",
        params: &["operationName"],
    };

    pub const SAVE_ACTION: EventDef = EventDef {
        name: "save:action",
        description: "A semantic action body was saved",
        params: &["operation", "key", "args", "body"],
    };

    pub const ADD_SEMANTIC_EDITOR: EventDef = EventDef {
        name: "add:semanticEditor",
        description: "An editor for a semantic operation was opened",
        params: &["type", "name"],
    };

    pub const ALL: &[EventDef] = &[
        ADD_OPERATION,
        SELECT_OPERATION,
        SAVE_ACTION,
        ADD_SEMANTIC_EDITOR,
    ];
}

// ===== Example Events =====

pub mod examples {
    use super::EventDef;

    pub const ADD_EXAMPLE: EventDef = EventDef {
        name: "add:example",
        description: "An example input was added",
        params: &["id"],
    };

    pub const SET_EXAMPLE: EventDef = EventDef {
        name: "set:example",
        description: "An example input changed",
        params: &["id", "oldValue", "newValue"],
    };

    pub const SET_SELECTED: EventDef = EventDef {
        name: "set:selected",
        description: "An example was selected",
        params: &["id"],
    };

    pub const REMOVE_EXAMPLE: EventDef = EventDef {
        name: "remove:example",
        description: "An example input was removed",
        params: &["id"],
    };

    pub const ALL: &[EventDef] = &[ADD_EXAMPLE, SET_EXAMPLE, SET_SELECTED, REMOVE_EXAMPLE];
}

/// Schema for a catalog as JSON, keyed by event name
pub fn catalog_schema(catalog: &[EventDef]) -> Value {
    let mut events = serde_json::Map::new();
    for event in catalog {
        events.insert(event.name.to_string(), event.schema());
    }
    Value::Object(events)
}

#[derive(Debug, Clone)]
pub enum EditorEvent {
    InputEditorChanged { version: u64 },
    GrammarEditorChanged { version: u64 },
    GrammarChanged { source: Rc<str> },
    InputChanged { source: Rc<str> },
    GrammarParsed {
        result: Rc<MatchResult>,
        grammar: Option<Rc<Grammar>>,
        error: Option<GrammarError>,
    },
    InputParsed {
        result: Rc<MatchResult>,
        trace: Rc<Trace>,
    },
    PeekFailure(Failure),
    UnpeekFailure,
    GotoFailure(Failure),
    PeekRuleDefinition(String),
    UnpeekRuleDefinition,
    OptionChanged(String),
}

impl EditorEvent {
    fn def(&self) -> &'static EventDef {
        use editor::*;
        match self {
            EditorEvent::InputEditorChanged { .. } => &CHANGE_INPUT_EDITOR,
            EditorEvent::GrammarEditorChanged { .. } => &CHANGE_GRAMMAR_EDITOR,
            EditorEvent::GrammarChanged { .. } => &CHANGE_GRAMMAR,
            EditorEvent::InputChanged { .. } => &CHANGE_INPUT,
            EditorEvent::GrammarParsed { .. } => &PARSE_GRAMMAR,
            EditorEvent::InputParsed { .. } => &PARSE_INPUT,
            EditorEvent::PeekFailure(_) => &PEEK_FAILURE,
            EditorEvent::UnpeekFailure => &UNPEEK_FAILURE,
            EditorEvent::GotoFailure(_) => &GOTO_FAILURE,
            EditorEvent::PeekRuleDefinition(_) => &PEEK_RULE_DEFINITION,
            EditorEvent::UnpeekRuleDefinition => &UNPEEK_RULE_DEFINITION,
            EditorEvent::OptionChanged(_) => &CHANGE_OPTION,
        }
    }
}

impl BusEvent for EditorEvent {
    fn name(&self) -> &str {
        self.def().name
    }

    fn arity(&self) -> usize {
        match self {
            EditorEvent::UnpeekFailure | EditorEvent::UnpeekRuleDefinition => 0,
            EditorEvent::GrammarParsed { .. } => 3,
            EditorEvent::InputParsed { .. } => 2,
            _ => 1,
        }
    }

    fn catalog() -> &'static [EventDef] {
        editor::ALL
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticsEvent {
    AddOperation {
        kind: String,
        name: String,
        arguments: Option<Vec<String>>,
    },
    SelectOperation(String),
    SaveAction {
        operation: String,
        key: String,
        args: Vec<String>,
        body: String,
    },
    AddSemanticEditor { kind: String, name: String },
}

impl BusEvent for SemanticsEvent {
    fn name(&self) -> &str {
        match self {
            SemanticsEvent::AddOperation { .. } => semantics::ADD_OPERATION.name,
            SemanticsEvent::SelectOperation(_) => semantics::SELECT_OPERATION.name,
            SemanticsEvent::SaveAction { .. } => semantics::SAVE_ACTION.name,
            SemanticsEvent::AddSemanticEditor { .. } => semantics::ADD_SEMANTIC_EDITOR.name,
        }
    }

    fn arity(&self) -> usize {
        match self {
            SemanticsEvent::AddOperation { .. } => 3,
            SemanticsEvent::SelectOperation(_) => 1,
            SemanticsEvent::SaveAction { .. } => 4,
            SemanticsEvent::AddSemanticEditor { .. } => 2,
        }
    }

    fn catalog() -> &'static [EventDef] {
        semantics::ALL
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExampleEvent {
    AddExample(String),
    SetExample {
        id: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    SetSelected(String),
    RemoveExample(String),
}

impl BusEvent for ExampleEvent {
    fn name(&self) -> &str {
        match self {
            ExampleEvent::AddExample(_) => examples::ADD_EXAMPLE.name,
            ExampleEvent::SetExample { .. } => examples::SET_EXAMPLE.name,
            ExampleEvent::SetSelected(_) => examples::SET_SELECTED.name,
            ExampleEvent::RemoveExample(_) => examples::REMOVE_EXAMPLE.name,
        }
    }

    fn arity(&self) -> usize {
        match self {
            ExampleEvent::SetExample { .. } => 3,
            _ => 1,
        }
    }

    fn catalog() -> &'static [EventDef] {
        examples::ALL
    }
}

/// An event whose name is only known at runtime. Names must be registered
/// on the bus before use; the argument count is checked on every emission.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedEvent {
    pub name: String,
    pub args: Vec<Value>,
}

impl NamedEvent {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl BusEvent for NamedEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.args.len()
    }

    fn catalog() -> &'static [EventDef] {
        &[]
    }
}
