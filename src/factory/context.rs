//! Per-request lookup tables over a parsed document.

use std::collections::HashMap;

use crate::bpmn::{Definitions, EventDefinition, FlowNode, MessageFlow, NodeKind, Participant, Process, SequenceFlow};

type Map<K, V> = HashMap<K, V, ahash::RandomState>;

/// Where a flow node sits in the document
#[derive(Debug, Clone, Copy)]
pub struct NodeEntry<'doc> {
    pub node: &'doc FlowNode,
    /// The top-level process the node belongs to, even when it is nested in a sub-process
    pub process: &'doc Process,
    /// The innermost sub-process around the node, if any
    pub sub_process: Option<&'doc FlowNode>,
}

/// ID-indexed views of one document, built once before any element is created
#[derive(Debug)]
pub struct ParseContext<'doc> {
    definitions: &'doc Definitions,
    nodes: Map<&'doc str, NodeEntry<'doc>>,
    flows: Map<&'doc str, &'doc SequenceFlow>,
    processes: Map<&'doc str, &'doc Process>,
    participants: Map<&'doc str, &'doc Participant>,
    participant_by_process: Map<&'doc str, &'doc Participant>,
    signal_throwers: Map<&'doc str, &'doc str>,
    message_flows_by_source: Map<&'doc str, &'doc MessageFlow>,
    message_flows_by_target: Map<&'doc str, &'doc MessageFlow>,
}

impl<'doc> ParseContext<'doc> {
    pub fn new(definitions: &'doc Definitions) -> Self {
        let mut context = ParseContext {
            definitions,
            nodes: Map::default(),
            flows: Map::default(),
            processes: Map::default(),
            participants: Map::default(),
            participant_by_process: Map::default(),
            signal_throwers: Map::default(),
            message_flows_by_source: Map::default(),
            message_flows_by_target: Map::default(),
        };

        for process in &definitions.processes {
            context.processes.entry(process.id.as_str()).or_insert(process);
            context.index_scope(process, process, None);
        }

        for collaboration in &definitions.collaborations {
            for participant in &collaboration.participants {
                context.participants.entry(participant.id.as_str()).or_insert(participant);
                if let Some(process_ref) = &participant.process_ref {
                    context.participant_by_process.entry(process_ref.as_str()).or_insert(participant);
                }
            }
            for flow in &collaboration.message_flows {
                context.message_flows_by_source.entry(flow.source_ref.as_str()).or_insert(flow);
                context.message_flows_by_target.entry(flow.target_ref.as_str()).or_insert(flow);
            }
        }

        context
    }

    /// Index the nodes and flows of a process or sub-process, descending into nested sub-processes
    fn index_scope(&mut self, scope: &'doc Process, process: &'doc Process, sub_process: Option<&'doc FlowNode>) {
        for flow in &scope.sequence_flows {
            self.flows.entry(flow.id.as_str()).or_insert(flow);
        }
        for node in &scope.nodes {
            self.nodes.entry(node.id.as_str()).or_insert(NodeEntry { node, process, sub_process });
            match &node.kind {
                NodeKind::IntermediateThrowEvent(EventDefinition::Signal { signal_ref: Some(signal) })
                | NodeKind::EndEvent(EventDefinition::Signal { signal_ref: Some(signal) }) => {
                    // Only the first throwing event of a signal counts as its sender
                    self.signal_throwers.entry(signal.as_str()).or_insert(node.id.as_str());
                }
                NodeKind::SubProcess { content, .. } => self.index_scope(content, process, Some(node)),
                _ => {}
            }
        }
    }

    pub fn definitions(&self) -> &'doc Definitions {
        self.definitions
    }

    pub fn node(&self, id: &str) -> Option<NodeEntry<'doc>> {
        self.nodes.get(id).copied()
    }

    pub fn flow(&self, id: &str) -> Option<&'doc SequenceFlow> {
        self.flows.get(id).copied()
    }

    pub fn process(&self, id: &str) -> Option<&'doc Process> {
        self.processes.get(id).copied()
    }

    /// The node a sequence flow leads to
    pub fn target_of(&self, flow_id: &str) -> Option<NodeEntry<'doc>> {
        self.flow(flow_id).and_then(|flow| self.node(&flow.target_ref))
    }

    /// The node a sequence flow comes from
    pub fn source_of(&self, flow_id: &str) -> Option<NodeEntry<'doc>> {
        self.flow(flow_id).and_then(|flow| self.node(&flow.source_ref))
    }

    pub fn participant_of_process(&self, process_id: &str) -> Option<&'doc Participant> {
        self.participant_by_process.get(process_id).copied()
    }

    /// Resolve a message-flow reference, which points either at a participant or at a flow node
    pub fn participant_for_ref(&self, reference: &str) -> Option<&'doc Participant> {
        self.participants
            .get(reference)
            .copied()
            .or_else(|| self.node(reference).and_then(|entry| self.participant_of_process(&entry.process.id)))
    }

    /// The first event that throws the given signal
    pub fn signal_thrower(&self, signal_ref: &str) -> Option<NodeEntry<'doc>> {
        self.signal_throwers.get(signal_ref).and_then(|thrower| self.node(thrower))
    }

    pub fn message_flow_from(&self, source_ref: &str) -> Option<&'doc MessageFlow> {
        self.message_flows_by_source.get(source_ref).copied()
    }

    pub fn message_flow_to(&self, target_ref: &str) -> Option<&'doc MessageFlow> {
        self.message_flows_by_target.get(target_ref).copied()
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::bpmn::parse_definitions;

    const SIGNALS: &str = r#"<definitions id="D">
  <collaboration id="C">
    <participant id="P_Alice" name="Alice" processRef="Proc_A" />
    <participant id="P_Bob" name="Bob" processRef="Proc_B" />
    <messageFlow id="MF_1" sourceRef="Throw_1" targetRef="P_Bob" />
  </collaboration>
  <process id="Proc_A">
    <intermediateThrowEvent id="Throw_1" name="notify">
      <incoming>F1</incoming>
      <outgoing>F2</outgoing>
      <signalEventDefinition signalRef="Signal_Go" />
    </intermediateThrowEvent>
  </process>
  <process id="Proc_B">
    <intermediateCatchEvent id="Catch_1" name="wait">
      <incoming>F3</incoming>
      <outgoing>F4</outgoing>
      <signalEventDefinition signalRef="Signal_Go" />
    </intermediateCatchEvent>
  </process>
</definitions>"#;

    #[test]
    fn test_signal_thrower_resolves_to_participant() -> Result<(), Box<dyn Error>> {
        let definitions = parse_definitions(SIGNALS)?;
        let context = ParseContext::new(&definitions);
        let thrower = context.signal_thrower("Signal_Go").ok_or("no thrower")?;
        assert_eq!(thrower.node.id, "Throw_1");
        let sender = context.participant_of_process(&thrower.process.id).ok_or("no sender")?;
        assert_eq!(sender.name.as_deref(), Some("Alice"));
        assert!(context.signal_thrower("Signal_Unknown").is_none());
        Ok(())
    }

    #[test]
    fn test_message_flow_refs_resolve_to_participants() -> Result<(), Box<dyn Error>> {
        let definitions = parse_definitions(SIGNALS)?;
        let context = ParseContext::new(&definitions);
        assert_eq!(context.message_flow_from("Throw_1").map(|flow| flow.id.as_str()), Some("MF_1"));
        assert_eq!(context.participant_for_ref("Throw_1").map(|p| p.id.as_str()), Some("P_Alice"));
        assert_eq!(context.participant_for_ref("P_Bob").map(|p| p.id.as_str()), Some("P_Bob"));
        assert!(context.participant_for_ref("nothing").is_none());
        Ok(())
    }
}
