//! This module defines the element graph: every translated BPMN element indexed by its ID,
//! together with navigation helpers over sequence flows.
//!
//! All lookups are total. An unknown ID yields `None` or an empty list, never a panic.

mod element;

pub use element::{Element, ElementBody, ElementKind, EventBranch, EventTrigger, XorBranch};

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct ElementGraph {
    elements: HashMap<String, Element, ahash::RandomState>,
}

impl ElementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element. A duplicate ID replaces the earlier element.
    pub fn add(&mut self, element: Element) {
        if let Some(previous) = self.elements.insert(element.id.clone(), element) {
            warn!(id = %previous.id, "duplicate element id, keeping the later element");
        }
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements of one kind, sorted by ID
    pub fn elements_of_type(&self, kind: ElementKind) -> Vec<&Element> {
        self.sorted(|element| element.kind() == kind)
    }

    pub fn target_of_sequence_flow(&self, id: &str) -> Option<&str> {
        match &self.get(id)?.body {
            ElementBody::SequenceFlow { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn element_after_sequence_flow(&self, id: &str) -> Option<&Element> {
        self.target_of_sequence_flow(id).and_then(|target| self.get(target))
    }

    /// Start events of a process, excluding those that open one of its event sub-processes
    pub fn start_events_of(&self, process_id: &str) -> Vec<&Element> {
        self.sorted(|element| {
            element.kind().is_start_event()
                && element.sub_process.is_none()
                && element.process_id.as_deref() == Some(process_id)
        })
    }

    /// Start events of every process, excluding those of event sub-processes
    pub fn all_start_events(&self) -> Vec<&Element> {
        self.sorted(|element| element.kind().is_start_event() && element.sub_process.is_none())
    }

    pub fn event_subprocesses_of(&self, process_id: &str) -> Vec<&Element> {
        self.sorted(|element| {
            element.kind() == ElementKind::EventSubProcess && element.process_id.as_deref() == Some(process_id)
        })
    }

    pub fn participants_by_id(&self) -> BTreeMap<&str, &Element> {
        self.elements
            .values()
            .filter(|element| element.kind() == ElementKind::Participant)
            .map(|element| (element.id.as_str(), element))
            .collect()
    }

    /// The participant whose pool executes the given process
    pub fn participant_of_process(&self, process_id: &str) -> Option<&Element> {
        self.participants_by_id()
            .into_values()
            .find(|participant| participant.process_id.as_deref() == Some(process_id))
    }

    pub fn collaboration(&self) -> Option<&Element> {
        self.elements_of_type(ElementKind::Collaboration).into_iter().next()
    }

    fn sorted(&self, predicate: impl Fn(&Element) -> bool) -> Vec<&Element> {
        let mut elements = self.elements.values().filter(|element| predicate(element)).collect::<Vec<_>>();
        elements.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        elements
    }
}

impl FromIterator<Element> for ElementGraph {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        let mut graph = ElementGraph::new();
        for element in iter {
            graph.add(element);
        }
        graph
    }
}
