//! This module defines the data structures for BPMN 2.0 documents and provides a parser for BPMN 2.0 XML files.
//!
//! Only the semantic part of a document is modelled. The diagram interchange subtree
//! (`bpmndi:BPMNDiagram`) has no counterpart here and is skipped during deserialization.

mod parse;

pub use parse::parse_definitions;

/// The kinds of task the translator accepts. All of them are translated the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Task,
    ScriptTask,
    UserTask,
    ServiceTask,
    SendTask,
    ReceiveTask,
    ManualTask,
    BusinessRuleTask,
}

/// The payload definition of an event. An event without a definition is a "none" event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDefinition {
    None,
    Message { message_ref: Option<String> },
    Signal { signal_ref: Option<String> },
    Timer { duration: Option<String> },
}

/// What a flow node is, together with the data that only this kind carries
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    StartEvent(EventDefinition),
    IntermediateCatchEvent(EventDefinition),
    IntermediateThrowEvent(EventDefinition),
    EndEvent(EventDefinition),
    Task(TaskKind),
    CallActivity { called_element: Option<String> },
    SubProcess { triggered_by_event: bool, content: Box<Process> },
    ExclusiveGateway,
    ParallelGateway,
    EventBasedGateway,
}

/// A node of a process: an event, an activity or a gateway
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub name: Option<String>,
    pub kind: NodeKind,
    /// IDs of the incoming sequence flows, in document order
    pub incoming: Vec<String>,
    /// IDs of the outgoing sequence flows, in document order
    pub outgoing: Vec<String>,
}

impl FlowNode {
    pub fn is_exclusive_gateway(&self) -> bool {
        matches!(self.kind, NodeKind::ExclusiveGateway)
    }

    pub fn is_parallel_gateway(&self) -> bool {
        matches!(self.kind, NodeKind::ParallelGateway)
    }

    /// A split has exactly one incoming and more than one outgoing flow
    pub fn is_split(&self) -> bool {
        self.incoming.len() == 1 && self.outgoing.len() > 1
    }

    /// A merge has more incoming flows than outgoing ones
    pub fn is_merge(&self) -> bool {
        self.incoming.len() > 1 && self.outgoing.len() <= 1
    }
}

/// A sequence flow connects a source node to a target node inside one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFlow {
    pub id: String,
    pub source_ref: String,
    pub target_ref: String,
    /// The trimmed text of the condition expression, if there is a non-empty one
    pub condition: Option<String>,
}

/// A process (or the content of a sub-process): its flow nodes and sequence flows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Process {
    pub id: String,
    pub name: Option<String>,
    pub nodes: Vec<FlowNode>,
    pub sequence_flows: Vec<SequenceFlow>,
}

/// A pool of a collaboration, optionally bound to the process it executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: Option<String>,
    pub process_ref: Option<String>,
}

/// A message flow crosses pools: its references point at flow nodes or at participants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFlow {
    pub id: String,
    pub name: Option<String>,
    pub source_ref: String,
    pub target_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collaboration {
    pub id: String,
    pub participants: Vec<Participant>,
    pub message_flows: Vec<MessageFlow>,
}

/// The root of a BPMN 2.0 document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Definitions {
    pub id: String,
    pub collaborations: Vec<Collaboration>,
    pub processes: Vec<Process>,
}
