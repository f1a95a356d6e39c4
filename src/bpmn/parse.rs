//! This module is responsible for parsing BPMN 2.0 XML files into the document model.
//!
//! Element names are matched by their local name, so `bpmn:`, `bpmn2:` and unprefixed
//! documents all parse the same way.

use serde::{Deserialize, Deserializer};

use crate::bpmn::{
    Collaboration, Definitions, EventDefinition, FlowNode, MessageFlow, NodeKind, Participant, Process,
    SequenceFlow, TaskKind,
};
use crate::Result;

/// Parse a complete BPMN 2.0 XML document
pub fn parse_definitions(xml: &str) -> Result<Definitions> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Trim an optional text value and treat empty strings as absent
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn trimmed(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|value| value.trim().to_string()).collect()
}

/// The text content of an expression-like element, e.g. `<conditionExpression>` or `<timeDuration>`
#[derive(Debug, Deserialize)]
struct Expression {
    #[serde(rename = "$text", default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageEventDefinition {
    #[serde(rename = "@messageRef", default)]
    message_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignalEventDefinition {
    #[serde(rename = "@signalRef", default)]
    signal_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimerEventDefinition {
    #[serde(rename = "timeDuration", default)]
    time_duration: Option<Expression>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "incoming", default)]
    incoming: Vec<String>,
    #[serde(rename = "outgoing", default)]
    outgoing: Vec<String>,
    #[serde(rename = "messageEventDefinition", default)]
    message: Option<MessageEventDefinition>,
    #[serde(rename = "signalEventDefinition", default)]
    signal: Option<SignalEventDefinition>,
    #[serde(rename = "timerEventDefinition", default)]
    timer: Option<TimerEventDefinition>,
}

impl Event {
    /// Events carry at most one definition in practice; message wins over signal over timer
    fn definition(&mut self) -> EventDefinition {
        if let Some(message) = self.message.take() {
            EventDefinition::Message { message_ref: non_empty(message.message_ref) }
        } else if let Some(signal) = self.signal.take() {
            EventDefinition::Signal { signal_ref: non_empty(signal.signal_ref) }
        } else if let Some(timer) = self.timer.take() {
            EventDefinition::Timer {
                duration: non_empty(timer.time_duration.and_then(|expression| expression.text)),
            }
        } else {
            EventDefinition::None
        }
    }

    fn into_node(mut self, kind: fn(EventDefinition) -> NodeKind) -> FlowNode {
        let definition = self.definition();
        FlowNode {
            id: self.id,
            name: non_empty(self.name),
            kind: kind(definition),
            incoming: trimmed(self.incoming),
            outgoing: trimmed(self.outgoing),
        }
    }
}

/// Tasks, gateways and call activities only need these fields
#[derive(Debug, Deserialize)]
struct Node {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@calledElement", default)]
    called_element: Option<String>,
    #[serde(rename = "incoming", default)]
    incoming: Vec<String>,
    #[serde(rename = "outgoing", default)]
    outgoing: Vec<String>,
}

impl Node {
    fn into_node(self, kind: NodeKind) -> FlowNode {
        FlowNode {
            id: self.id,
            name: non_empty(self.name),
            kind,
            incoming: trimmed(self.incoming),
            outgoing: trimmed(self.outgoing),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SequenceFlowXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@sourceRef")]
    source_ref: String,
    #[serde(rename = "@targetRef")]
    target_ref: String,
    #[serde(rename = "conditionExpression", default)]
    condition: Option<Expression>,
}

/// A process, or the content of a sub-process, as it appears in the XML file.
/// Every kind of child element gets its own list; they are merged into one node list afterwards.
#[derive(Debug, Deserialize)]
struct ProcessXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@triggeredByEvent", default)]
    triggered_by_event: Option<String>,
    #[serde(rename = "incoming", default)]
    incoming: Vec<String>,
    #[serde(rename = "outgoing", default)]
    outgoing: Vec<String>,
    #[serde(rename = "startEvent", default)]
    start_events: Vec<Event>,
    #[serde(rename = "intermediateCatchEvent", default)]
    catch_events: Vec<Event>,
    #[serde(rename = "intermediateThrowEvent", default)]
    throw_events: Vec<Event>,
    #[serde(rename = "endEvent", default)]
    end_events: Vec<Event>,
    #[serde(rename = "task", default)]
    tasks: Vec<Node>,
    #[serde(rename = "scriptTask", default)]
    script_tasks: Vec<Node>,
    #[serde(rename = "userTask", default)]
    user_tasks: Vec<Node>,
    #[serde(rename = "serviceTask", default)]
    service_tasks: Vec<Node>,
    #[serde(rename = "sendTask", default)]
    send_tasks: Vec<Node>,
    #[serde(rename = "receiveTask", default)]
    receive_tasks: Vec<Node>,
    #[serde(rename = "manualTask", default)]
    manual_tasks: Vec<Node>,
    #[serde(rename = "businessRuleTask", default)]
    business_rule_tasks: Vec<Node>,
    #[serde(rename = "callActivity", default)]
    call_activities: Vec<Node>,
    #[serde(rename = "subProcess", default)]
    sub_processes: Vec<ProcessXml>,
    #[serde(rename = "exclusiveGateway", default)]
    exclusive_gateways: Vec<Node>,
    #[serde(rename = "parallelGateway", default)]
    parallel_gateways: Vec<Node>,
    #[serde(rename = "eventBasedGateway", default)]
    event_based_gateways: Vec<Node>,
    #[serde(rename = "sequenceFlow", default)]
    sequence_flows: Vec<SequenceFlowXml>,
}

#[derive(Debug, Deserialize)]
struct ParticipantXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@processRef", default)]
    process_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageFlowXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@sourceRef")]
    source_ref: String,
    #[serde(rename = "@targetRef")]
    target_ref: String,
}

#[derive(Debug, Deserialize)]
struct CollaborationXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "participant", default)]
    participants: Vec<ParticipantXml>,
    #[serde(rename = "messageFlow", default)]
    message_flows: Vec<MessageFlowXml>,
}

/// The root element of a BPMN 2.0 XML file.
/// This is the type we deserialize the XML file into, and then convert into [`Definitions`].
#[derive(Debug, Deserialize)]
struct DefinitionsXml {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "collaboration", default)]
    collaborations: Vec<CollaborationXml>,
    #[serde(rename = "process", default)]
    processes: Vec<ProcessXml>,
}

/// Convert a deserialized process into the document model, flattening the per-tag lists
impl From<ProcessXml> for Process {
    fn from(xml: ProcessXml) -> Self {
        macro_rules! push {
            ($nodes:ident, $iter:expr, $kind:expr) => {
                for node in $iter {
                    $nodes.push(node.into_node($kind));
                }
            };
        }

        let mut nodes = Vec::new();
        push!(nodes, xml.start_events, NodeKind::StartEvent);
        push!(nodes, xml.catch_events, NodeKind::IntermediateCatchEvent);
        push!(nodes, xml.throw_events, NodeKind::IntermediateThrowEvent);
        push!(nodes, xml.end_events, NodeKind::EndEvent);
        push!(nodes, xml.tasks, NodeKind::Task(TaskKind::Task));
        push!(nodes, xml.script_tasks, NodeKind::Task(TaskKind::ScriptTask));
        push!(nodes, xml.user_tasks, NodeKind::Task(TaskKind::UserTask));
        push!(nodes, xml.service_tasks, NodeKind::Task(TaskKind::ServiceTask));
        push!(nodes, xml.send_tasks, NodeKind::Task(TaskKind::SendTask));
        push!(nodes, xml.receive_tasks, NodeKind::Task(TaskKind::ReceiveTask));
        push!(nodes, xml.manual_tasks, NodeKind::Task(TaskKind::ManualTask));
        push!(nodes, xml.business_rule_tasks, NodeKind::Task(TaskKind::BusinessRuleTask));
        push!(nodes, xml.exclusive_gateways, NodeKind::ExclusiveGateway);
        push!(nodes, xml.parallel_gateways, NodeKind::ParallelGateway);
        push!(nodes, xml.event_based_gateways, NodeKind::EventBasedGateway);

        // The called element is the only attribute that differs between call activities and tasks
        for mut node in xml.call_activities {
            let called_element = non_empty(node.called_element.take());
            nodes.push(node.into_node(NodeKind::CallActivity { called_element }));
        }

        for mut sub_process in xml.sub_processes {
            let triggered_by_event = sub_process
                .triggered_by_event
                .take()
                .is_some_and(|value| value.trim() == "true");
            let incoming = trimmed(std::mem::take(&mut sub_process.incoming));
            let outgoing = trimmed(std::mem::take(&mut sub_process.outgoing));
            let content = Process::from(sub_process);
            nodes.push(FlowNode {
                id: content.id.clone(),
                name: content.name.clone(),
                kind: NodeKind::SubProcess { triggered_by_event, content: Box::new(content) },
                incoming,
                outgoing,
            });
        }

        let sequence_flows = xml
            .sequence_flows
            .into_iter()
            .map(|flow| SequenceFlow {
                id: flow.id,
                source_ref: flow.source_ref,
                target_ref: flow.target_ref,
                condition: non_empty(flow.condition.and_then(|expression| expression.text)),
            })
            .collect();

        Process {
            id: xml.id,
            name: non_empty(xml.name),
            nodes,
            sequence_flows,
        }
    }
}

impl From<DefinitionsXml> for Definitions {
    fn from(xml: DefinitionsXml) -> Self {
        let collaborations = xml
            .collaborations
            .into_iter()
            .map(|collaboration| Collaboration {
                id: collaboration.id,
                participants: collaboration
                    .participants
                    .into_iter()
                    .map(|participant| Participant {
                        id: participant.id,
                        name: non_empty(participant.name),
                        process_ref: non_empty(participant.process_ref),
                    })
                    .collect(),
                message_flows: collaboration
                    .message_flows
                    .into_iter()
                    .map(|flow| MessageFlow {
                        id: flow.id,
                        name: non_empty(flow.name),
                        source_ref: flow.source_ref,
                        target_ref: flow.target_ref,
                    })
                    .collect(),
            })
            .collect();
        Definitions {
            id: xml.id,
            collaborations,
            processes: xml.processes.into_iter().map(Process::from).collect(),
        }
    }
}

/// To deserialize a BPMN document, we first deserialize the XML file into a DefinitionsXml struct
/// and then convert this struct into the document model
impl<'de> Deserialize<'de> for Definitions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DefinitionsXml::deserialize(deserializer).map(Into::into)
    }
}
