//! This module converts the parsed BPMN document into the element graph.
//!
//! Every flow node is validated and turned into a typed [`Element`]. Gateways go through the
//! resolver in [`gateway`], which classifies them and precomputes their branches.

mod context;
mod gateway;

pub use context::{NodeEntry, ParseContext};

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::bpmn::{Collaboration, Definitions, EventDefinition, FlowNode, MessageFlow, NodeKind, Participant, Process};
use crate::config::TranslatorConfig;
use crate::error::ValidationError;
use crate::graph::{Element, ElementBody, ElementGraph};
use crate::Result;

/// Build the element graph of a whole document
pub fn build_graph(definitions: &Definitions, config: &TranslatorConfig) -> Result<ElementGraph> {
    ElementFactory::new(definitions, config).build()
}

/// Creates elements from flow nodes. Gateway resolutions are memoized, so a gateway that was
/// resolved while walking the branches of another one is not resolved twice.
#[derive(Debug)]
pub struct ElementFactory<'doc> {
    context: ParseContext<'doc>,
    max_depth: usize,
    gateways: HashMap<String, Option<Element>, ahash::RandomState>,
    resolving: HashSet<String, ahash::RandomState>,
}

impl<'doc> ElementFactory<'doc> {
    pub fn new(definitions: &'doc Definitions, config: &TranslatorConfig) -> Self {
        ElementFactory {
            context: ParseContext::new(definitions),
            max_depth: config.max_nesting_depth,
            gateways: HashMap::default(),
            resolving: HashSet::default(),
        }
    }

    /// Create every element of the document: collaborations first, then the processes
    pub fn build(mut self) -> Result<ElementGraph> {
        let mut graph = ElementGraph::new();
        let definitions = self.context.definitions();
        for collaboration in &definitions.collaborations {
            self.add_collaboration(collaboration, &mut graph);
        }
        for process in &definitions.processes {
            self.add_scope(process, process, None, &mut graph)?;
        }
        debug!(elements = graph.len(), "element graph built");
        Ok(graph)
    }

    fn add_collaboration(&self, collaboration: &'doc Collaboration, graph: &mut ElementGraph) {
        for participant in &collaboration.participants {
            let mut element = Element::new(participant.id.clone(), ElementBody::Participant)
                .with_name(participant_label(participant));
            if let Some(process_ref) = &participant.process_ref {
                let process_name = self.context.process(process_ref).and_then(|process| process.name.clone());
                element = element.in_process(process_ref.clone(), process_name);
            }
            graph.add(element);
        }
        for flow in &collaboration.message_flows {
            graph.add(self.message_flow(flow));
        }
        let participants = collaboration.participants.iter().map(|participant| participant.id.clone()).collect();
        graph.add(Element::new(collaboration.id.clone(), ElementBody::Collaboration { participants }));
    }

    fn message_flow(&self, flow: &'doc MessageFlow) -> Element {
        let sender = self.context.participant_for_ref(&flow.source_ref);
        let receiver = self.context.participant_for_ref(&flow.target_ref);
        if sender.is_none() || receiver.is_none() {
            warn!(id = %flow.id, "message flow does not connect two known participants");
        }
        let body = ElementBody::MessageFlow {
            sender_id: sender.map(|participant| participant.id.clone()),
            sender_name: sender.map(participant_label),
            receiver_id: receiver.map(|participant| participant.id.clone()),
            receiver_name: receiver.map(participant_label),
            source_ref: flow.source_ref.clone(),
            target_ref: flow.target_ref.clone(),
        };
        Element { name: flow.name.clone(), ..Element::new(flow.id.clone(), body) }
    }

    /// Add the sequence flows and nodes of a process or of an event sub-process
    fn add_scope(
        &mut self,
        scope: &'doc Process,
        process: &'doc Process,
        sub_process: Option<&'doc FlowNode>,
        graph: &mut ElementGraph,
    ) -> Result<()> {
        for flow in &scope.sequence_flows {
            let body = ElementBody::SequenceFlow {
                source: flow.source_ref.clone(),
                target: flow.target_ref.clone(),
            };
            graph.add(Element {
                sub_process: sub_process.map(|node| node.id.clone()),
                ..Element::new(flow.id.clone(), body).in_process(process.id.clone(), process.name.clone())
            });
        }
        for node in &scope.nodes {
            let entry = NodeEntry { node, process, sub_process };
            if let Some(element) = self.create_element(entry)? {
                graph.add(element);
            }
            if let NodeKind::SubProcess { triggered_by_event: true, content } = &node.kind {
                self.add_scope(content, process, Some(node), graph)?;
            }
        }
        Ok(())
    }

    /// Create the element for one flow node.
    /// `None` means the node has no element of its own, e.g. a merge gateway.
    pub fn create_element(&mut self, entry: NodeEntry<'doc>) -> Result<Option<Element>> {
        let node = entry.node;
        let element = match &node.kind {
            NodeKind::StartEvent(definition) => self.start_event(entry, definition)?,
            NodeKind::IntermediateCatchEvent(definition) => match self.catch_event(entry, definition)? {
                Some(element) => element,
                None => return Ok(None),
            },
            NodeKind::IntermediateThrowEvent(definition) => match self.throw_event(entry, definition)? {
                Some(element) => element,
                None => return Ok(None),
            },
            NodeKind::EndEvent(definition) => self.end_event(entry, definition)?,
            NodeKind::Task(_) => {
                self.required_incoming(node)?;
                let outgoing = self.required_outgoing(node)?;
                let name = required_name(node)?;
                located(entry, ElementBody::ScriptTask).with_name(name).with_outgoing(outgoing)
            }
            NodeKind::CallActivity { called_element } => {
                self.required_incoming(node)?;
                let outgoing = self.required_outgoing(node)?;
                required_name(node)?;
                let called = called_element
                    .clone()
                    .ok_or_else(|| ValidationError::MissingCalledElement(node.id.clone()))?;
                located(entry, ElementBody::CallActivity { called }).with_outgoing(outgoing)
            }
            NodeKind::SubProcess { triggered_by_event: true, content } => {
                let start_event = content
                    .nodes
                    .iter()
                    .find(|inner| matches!(inner.kind, NodeKind::StartEvent(_)))
                    .map(|inner| inner.id.clone());
                if start_event.is_none() {
                    warn!(id = %node.id, "event sub-process has no start event");
                }
                let elements = content.nodes.iter().map(|inner| inner.id.clone()).collect();
                located(entry, ElementBody::EventSubProcess { start_event, elements })
            }
            NodeKind::SubProcess { triggered_by_event: false, .. } => {
                warn!(id = %node.id, "embedded sub-processes are not translated");
                return Ok(None);
            }
            NodeKind::ExclusiveGateway | NodeKind::ParallelGateway | NodeKind::EventBasedGateway => {
                return self.gateway(entry, 0);
            }
        };
        debug!(id = %element.id, kind = ?element.kind(), "created element");
        Ok(Some(element))
    }

    fn start_event(&self, entry: NodeEntry<'doc>, definition: &EventDefinition) -> Result<Element> {
        let node = entry.node;
        let outgoing = self.required_outgoing(node)?;
        required_name(node)?;
        let body = match definition {
            EventDefinition::None => ElementBody::NoneStart,
            EventDefinition::Message { message_ref } => ElementBody::MessageStart {
                message_id: self.message_id(node, message_ref, self.context.message_flow_to(&node.id))?,
            },
            EventDefinition::Signal { signal_ref } => {
                let signal_id = required_signal(node, signal_ref)?;
                let sender = self.signal_sender(&signal_id);
                ElementBody::SignalStart { signal_id, sender }
            }
            EventDefinition::Timer { duration } => ElementBody::TimerStart {
                duration_ms: required_duration(node, duration)?,
            },
        };
        Ok(located(entry, body).with_outgoing(outgoing))
    }

    fn catch_event(&self, entry: NodeEntry<'doc>, definition: &EventDefinition) -> Result<Option<Element>> {
        let node = entry.node;
        self.required_incoming(node)?;
        let outgoing = self.required_outgoing(node)?;
        required_name(node)?;
        let body = match definition {
            EventDefinition::None => {
                warn!(id = %node.id, "intermediate catch event without a definition is not translated");
                return Ok(None);
            }
            EventDefinition::Message { message_ref } => ElementBody::MessageCatch {
                message_id: self.message_id(node, message_ref, self.context.message_flow_to(&node.id))?,
            },
            EventDefinition::Signal { signal_ref } => {
                let signal_id = required_signal(node, signal_ref)?;
                let sender = self.signal_sender(&signal_id);
                ElementBody::SignalCatch { signal_id, sender }
            }
            EventDefinition::Timer { duration } => ElementBody::TimerCatch {
                duration_ms: required_duration(node, duration)?,
            },
        };
        Ok(Some(located(entry, body).with_outgoing(outgoing)))
    }

    fn throw_event(&self, entry: NodeEntry<'doc>, definition: &EventDefinition) -> Result<Option<Element>> {
        let node = entry.node;
        self.required_incoming(node)?;
        let outgoing = self.required_outgoing(node)?;
        required_name(node)?;
        let body = match definition {
            EventDefinition::Message { message_ref } => {
                let (message_id, message_flow, receiver) = self.outgoing_message(node, message_ref)?;
                ElementBody::MessageThrow { message_id, message_flow, receiver }
            }
            EventDefinition::Signal { signal_ref } => ElementBody::SignalThrow {
                signal_id: required_signal(node, signal_ref)?,
            },
            EventDefinition::None | EventDefinition::Timer { .. } => {
                warn!(id = %node.id, "intermediate throw event without a message or signal is not translated");
                return Ok(None);
            }
        };
        Ok(Some(located(entry, body).with_outgoing(outgoing)))
    }

    fn end_event(&self, entry: NodeEntry<'doc>, definition: &EventDefinition) -> Result<Element> {
        let node = entry.node;
        self.required_incoming(node)?;
        required_name(node)?;
        let body = match definition {
            EventDefinition::None | EventDefinition::Timer { .. } => ElementBody::NoneEnd,
            EventDefinition::Message { message_ref } => {
                let (message_id, message_flow, receiver) = self.outgoing_message(node, message_ref)?;
                ElementBody::MessageEnd { message_id, message_flow, receiver }
            }
            EventDefinition::Signal { signal_ref } => ElementBody::SignalEnd {
                signal_id: required_signal(node, signal_ref)?,
            },
        };
        Ok(located(entry, body))
    }

    /// Message id, message flow id and receiving participant of a throwing message event
    fn outgoing_message(
        &self,
        node: &FlowNode,
        message_ref: &Option<String>,
    ) -> Result<(String, String, Option<String>)> {
        let flow = self
            .context
            .message_flow_from(&node.id)
            .ok_or_else(|| ValidationError::MissingMessageFlow(node.id.clone()))?;
        let receiver = self.context.participant_for_ref(&flow.target_ref).map(participant_label);
        if receiver.is_none() {
            warn!(id = %node.id, target = %flow.target_ref, "message flow target belongs to no participant");
        }
        let message_id = self.message_id(node, message_ref, Some(flow))?;
        Ok((message_id, flow.id.clone(), receiver))
    }

    /// The `messageRef` of the definition, or else the id of the linked message flow
    fn message_id(&self, node: &FlowNode, message_ref: &Option<String>, flow: Option<&MessageFlow>) -> Result<String> {
        message_ref
            .clone()
            .or_else(|| flow.map(|flow| flow.id.clone()))
            .ok_or_else(|| ValidationError::MissingMessageRef(node.id.clone()).into())
    }

    /// Name of the participant throwing a signal, or `self` when the sender is unknown
    fn signal_sender(&self, signal_id: &str) -> String {
        let Some(thrower) = self.context.signal_thrower(signal_id) else {
            warn!(signal = %signal_id, "signal is never thrown, assuming the catching process");
            return "self".to_string();
        };
        match self.context.participant_of_process(&thrower.process.id) {
            Some(participant) => participant_label(participant),
            None => {
                warn!(
                    signal = %signal_id,
                    thrower = %thrower.node.id,
                    process = %thrower.process.id,
                    "process throwing this signal belongs to no participant, assuming the catching process"
                );
                "self".to_string()
            }
        }
    }

    fn required_outgoing(&self, node: &FlowNode) -> Result<String> {
        let outgoing = node
            .outgoing
            .first()
            .ok_or_else(|| ValidationError::MissingOutgoing(node.id.clone()))?;
        if self.context.flow(outgoing).is_none() {
            return Err(ValidationError::UnknownSequenceFlow(outgoing.clone()).into());
        }
        Ok(outgoing.clone())
    }

    fn required_incoming(&self, node: &FlowNode) -> Result<()> {
        if node.incoming.is_empty() {
            return Err(ValidationError::MissingIncoming(node.id.clone()).into());
        }
        Ok(())
    }
}

/// An element for a flow node, carrying the node's id, name and enclosing process
fn located(entry: NodeEntry<'_>, body: ElementBody) -> Element {
    Element {
        id: entry.node.id.clone(),
        name: entry.node.name.clone(),
        outgoing_edge: None,
        process_id: Some(entry.process.id.clone()),
        process_name: entry.process.name.clone(),
        sub_process: entry.sub_process.map(|sub_process| sub_process.id.clone()),
        body,
    }
}

/// Participants are referred to by name, falling back to their id
fn participant_label(participant: &Participant) -> String {
    participant.name.clone().unwrap_or_else(|| participant.id.clone())
}

fn required_name(node: &FlowNode) -> Result<String> {
    node.name
        .clone()
        .ok_or_else(|| ValidationError::MissingName(node.id.clone()).into())
}

fn required_signal(node: &FlowNode, signal_ref: &Option<String>) -> Result<String> {
    signal_ref
        .clone()
        .ok_or_else(|| ValidationError::MissingSignalRef(node.id.clone()).into())
}

fn required_duration(node: &FlowNode, duration: &Option<String>) -> Result<u64> {
    let value = duration
        .as_deref()
        .ok_or_else(|| ValidationError::MissingDuration(node.id.clone()))?;
    parse_duration_ms(value).ok_or_else(|| {
        ValidationError::InvalidDuration {
            id: node.id.clone(),
            value: value.to_string(),
        }
        .into()
    })
}

/// Parse a timer duration: plain milliseconds (`5000`) or an ISO-8601 duration (`PT5S`, `P1DT2H`)
pub fn parse_duration_ms(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Ok(milliseconds) = text.parse::<u64>() {
        return Some(milliseconds);
    }
    let rest = text.strip_prefix(&['P', 'p'][..])?;
    let (date, time) = rest.split_once(&['T', 't'][..]).unwrap_or((rest, ""));

    const DATE_UNITS: [(char, f64); 2] = [('W', 604_800_000.0), ('D', 86_400_000.0)];
    const TIME_UNITS: [(char, f64); 3] = [('H', 3_600_000.0), ('M', 60_000.0), ('S', 1_000.0)];

    let mut total = 0.0;
    let mut components = 0;
    for (part, units) in [(date, &DATE_UNITS[..]), (time, &TIME_UNITS[..])] {
        // Units must appear in their canonical order, each at most once
        let mut remaining = units.iter();
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let unit = c.to_ascii_uppercase();
            let (_, factor) = remaining.by_ref().find(|(candidate, _)| *candidate == unit)?;
            let value = number.parse::<f64>().ok()?;
            total += value * factor;
            components += 1;
            number.clear();
        }
        if !number.is_empty() {
            return None;
        }
    }
    (components > 0).then(|| total.round() as u64)
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::bpmn::parse_definitions;
    use crate::error::Error as TranslateError;
    use crate::graph::ElementKind;

    fn graph_of(xml: &str) -> Result<ElementGraph, TranslateError> {
        let definitions = parse_definitions(xml)?;
        build_graph(&definitions, &TranslatorConfig::default())
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_ms("5000"), Some(5000));
        assert_eq!(parse_duration_ms(" PT5S "), Some(5000));
        assert_eq!(parse_duration_ms("PT1M30S"), Some(90_000));
        assert_eq!(parse_duration_ms("P1DT1H"), Some(90_000_000));
        assert_eq!(parse_duration_ms("PT0.5S"), Some(500));
        assert_eq!(parse_duration_ms("PT"), None);
        assert_eq!(parse_duration_ms("PT5"), None);
        assert_eq!(parse_duration_ms("PT5S1M"), None);
        assert_eq!(parse_duration_ms("five seconds"), None);
    }

    #[test]
    fn test_linear_process() -> Result<(), Box<dyn Error>> {
        let graph = graph_of(
            r#"<definitions id="D">
  <process id="P" name="Main">
    <startEvent id="Start" name="go"><outgoing>F1</outgoing></startEvent>
    <scriptTask id="Task" name="Do Work"><incoming>F1</incoming><outgoing>F2</outgoing></scriptTask>
    <endEvent id="End" name="done"><incoming>F2</incoming></endEvent>
    <sequenceFlow id="F1" sourceRef="Start" targetRef="Task" />
    <sequenceFlow id="F2" sourceRef="Task" targetRef="End" />
  </process>
</definitions>"#,
        )?;
        let start = graph.get("Start").ok_or("no start")?;
        assert_eq!(start.kind(), ElementKind::NoneStart);
        assert_eq!(start.outgoing_edge.as_deref(), Some("F1"));
        assert_eq!(start.process_name.as_deref(), Some("Main"));
        assert_eq!(graph.get("Task").map(Element::kind), Some(ElementKind::ScriptTask));
        assert_eq!(graph.get("End").map(Element::kind), Some(ElementKind::NoneEnd));
        assert_eq!(graph.target_of_sequence_flow("F2"), Some("End"));
        Ok(())
    }

    #[test]
    fn test_missing_name_is_rejected() -> Result<(), Box<dyn Error>> {
        let result = graph_of(
            r#"<definitions id="D">
  <process id="P">
    <startEvent id="Start"><outgoing>F1</outgoing></startEvent>
    <sequenceFlow id="F1" sourceRef="Start" targetRef="Start" />
  </process>
</definitions>"#,
        );
        match result {
            Err(TranslateError::Validation(ValidationError::MissingName(id))) => assert_eq!(id, "Start"),
            other => panic!("expected a missing name error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_invalid_timer_duration_is_rejected() {
        let result = graph_of(
            r#"<definitions id="D">
  <process id="P">
    <startEvent id="Start" name="tick">
      <outgoing>F1</outgoing>
      <timerEventDefinition><timeDuration>soon</timeDuration></timerEventDefinition>
    </startEvent>
    <sequenceFlow id="F1" sourceRef="Start" targetRef="Start" />
  </process>
</definitions>"#,
        );
        assert!(matches!(
            result,
            Err(TranslateError::Validation(ValidationError::InvalidDuration { ref value, .. })) if value == "soon"
        ));
    }

    #[test]
    fn test_message_throw_requires_message_flow() {
        let result = graph_of(
            r#"<definitions id="D">
  <process id="P">
    <intermediateThrowEvent id="Throw" name="send">
      <incoming>F1</incoming><outgoing>F2</outgoing>
      <messageEventDefinition messageRef="Msg" />
    </intermediateThrowEvent>
    <sequenceFlow id="F1" sourceRef="Throw" targetRef="Throw" />
    <sequenceFlow id="F2" sourceRef="Throw" targetRef="Throw" />
  </process>
</definitions>"#,
        );
        assert!(matches!(
            result,
            Err(TranslateError::Validation(ValidationError::MissingMessageFlow(ref id))) if id == "Throw"
        ));
    }

    #[test]
    fn test_unthrown_signal_defaults_to_self() -> Result<(), Box<dyn Error>> {
        let graph = graph_of(
            r#"<definitions id="D">
  <process id="P">
    <startEvent id="Start" name="on signal">
      <outgoing>F1</outgoing>
      <signalEventDefinition signalRef="Lonely" />
    </startEvent>
    <sequenceFlow id="F1" sourceRef="Start" targetRef="Start" />
  </process>
</definitions>"#,
        )?;
        assert_eq!(graph.get("Start").and_then(Element::signal_sender), Some("self"));
        Ok(())
    }

    #[test]
    fn test_signal_thrown_outside_any_participant_defaults_to_self() -> Result<(), Box<dyn Error>> {
        let graph = graph_of(
            r#"<definitions id="D">
  <collaboration id="C">
    <participant id="PB" name="Bob" processRef="B" />
  </collaboration>
  <process id="A">
    <endEvent id="Raise" name="raise">
      <incoming>A1</incoming>
      <signalEventDefinition signalRef="Alarm" />
    </endEvent>
    <sequenceFlow id="A1" sourceRef="Raise" targetRef="Raise" />
  </process>
  <process id="B">
    <startEvent id="Start" name="on alarm">
      <outgoing>B1</outgoing>
      <signalEventDefinition signalRef="Alarm" />
    </startEvent>
    <sequenceFlow id="B1" sourceRef="Start" targetRef="Start" />
  </process>
</definitions>"#,
        )?;
        assert_eq!(graph.get("Start").and_then(Element::signal_sender), Some("self"));
        assert_eq!(graph.get("Raise").map(Element::kind), Some(ElementKind::SignalEnd));
        Ok(())
    }

    #[test]
    fn test_message_catch_falls_back_to_message_flow_id() -> Result<(), Box<dyn Error>> {
        let graph = graph_of(
            r#"<definitions id="D">
  <collaboration id="C">
    <participant id="PA" name="Alice" processRef="A" />
    <participant id="PB" name="Bob" processRef="B" />
    <messageFlow id="MF" sourceRef="PA" targetRef="Catch" />
  </collaboration>
  <process id="B">
    <intermediateCatchEvent id="Catch" name="wait">
      <incoming>F1</incoming><outgoing>F2</outgoing>
      <messageEventDefinition />
    </intermediateCatchEvent>
    <sequenceFlow id="F1" sourceRef="Catch" targetRef="Catch" />
    <sequenceFlow id="F2" sourceRef="Catch" targetRef="Catch" />
  </process>
</definitions>"#,
        )?;
        let catch = graph.get("Catch").ok_or("no catch event")?;
        assert_eq!(catch.body, ElementBody::MessageCatch { message_id: "MF".to_string() });
        let flow = graph.get("MF").ok_or("no message flow")?;
        match &flow.body {
            ElementBody::MessageFlow { sender_id, receiver_id, .. } => {
                assert_eq!(sender_id.as_deref(), Some("PA"));
                assert_eq!(receiver_id.as_deref(), Some("PB"));
            }
            other => panic!("expected a message flow, got {:?}", other),
        }
        Ok(())
    }
}
