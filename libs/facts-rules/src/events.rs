//! Engine event feed
//!
//! Listeners are plain callbacks invoked synchronously, in registration
//! order. A listener error is returned to whoever triggered the event; when
//! that is a fact assertion, the assertion is rolled back.

use std::fmt;
use std::sync::Arc;

use crate::engine::RulesEngine;
use crate::facts::ChangeSet;
use crate::rule_set::RegisteredRule;

/// Event kinds a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A fact assertion was applied
    Change,
    /// A rule's condition was evaluated
    Process,
    /// A rule's action ran
    Fire,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Change => "change",
            EventKind::Process => "process",
            EventKind::Fire => "fire",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload passed to listeners
#[derive(Debug, Clone, Copy)]
pub enum EngineEvent<'a> {
    Change(&'a ChangeSet),
    Process(&'a RegisteredRule),
    Fire(&'a RegisteredRule),
}

impl EngineEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::Change(_) => EventKind::Change,
            EngineEvent::Process(_) => EventKind::Process,
            EngineEvent::Fire(_) => EventKind::Fire,
        }
    }
}

/// Handle returned on registration, used to remove a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type ListenerFn =
    dyn Fn(&RulesEngine, &EngineEvent<'_>) -> anyhow::Result<()> + Send + Sync;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, EventKind, Arc<ListenerFn>)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, kind: EventKind, listener: Arc<ListenerFn>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, kind, listener));
        id
    }

    pub(crate) fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|(entry_id, entry_kind, _)| !(*entry_id == id && *entry_kind == kind));
        self.entries.len() != before
    }

    pub(crate) fn for_kind(&self, kind: EventKind) -> impl Iterator<Item = &ListenerFn> {
        self.entries
            .iter()
            .filter(move |(_, entry_kind, _)| *entry_kind == kind)
            .map(|(_, _, listener)| listener.as_ref())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
