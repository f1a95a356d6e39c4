//! This module computes which participants must hold a location reference to which others.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::graph::{ElementBody, ElementGraph, ElementKind};

/// Participant id → ids of the participants it needs to address
pub type Interactions = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default)]
pub struct InteractionAnalyzer {
    interactions: Interactions,
}

impl InteractionAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the relation from scratch
    pub fn analyze(&mut self, graph: &ElementGraph) -> &Interactions {
        self.interactions.clear();
        self.message_flows(graph);
        self.signal_catches(graph);
        &self.interactions
    }

    /// Participants the given one needs references to
    pub fn references_of(&self, participant_id: &str) -> Option<&BTreeSet<String>> {
        self.interactions.get(participant_id)
    }

    /// A sender needs a reference to the receiver of each of its messages
    fn message_flows(&mut self, graph: &ElementGraph) {
        for flow in graph.elements_of_type(ElementKind::MessageFlow) {
            let ElementBody::MessageFlow { sender_id, receiver_id, .. } = &flow.body else {
                continue;
            };
            match (sender_id, receiver_id) {
                (Some(sender), Some(receiver)) if sender != receiver => {
                    self.interactions.entry(sender.clone()).or_default().insert(receiver.clone());
                }
                (Some(_), Some(_)) => {}
                _ => warn!(id = %flow.id, "message flow with an unknown participant is ignored"),
            }
        }
    }

    /// A signal catcher needs a reference to the participant that throws the signal
    fn signal_catches(&mut self, graph: &ElementGraph) {
        let participants = graph.participants_by_id();
        let catches = [ElementKind::SignalStart, ElementKind::SignalCatch]
            .into_iter()
            .flat_map(|kind| graph.elements_of_type(kind));

        for catch in catches {
            let Some(sender) = catch.signal_sender() else { continue };
            if sender == "self" {
                continue;
            }
            let Some(catcher) = catch.process_id.as_deref().and_then(|process| graph.participant_of_process(process))
            else {
                warn!(id = %catch.id, "signal catch event belongs to no participant");
                continue;
            };
            if catcher.name.as_deref() == Some(sender) {
                continue;
            }
            let Some(owner) = participants.values().find(|participant| participant.name.as_deref() == Some(sender))
            else {
                warn!(id = %catch.id, sender = %sender, "no participant with this name");
                continue;
            };
            self.interactions.entry(catcher.id.clone()).or_default().insert(owner.id.clone());
        }
    }
}
