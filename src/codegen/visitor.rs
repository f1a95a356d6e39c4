//! Emission of XKlaim code for single elements and for linear process bodies.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

use tracing::{debug, warn};

use super::{identifier, indent};
use crate::config::TranslatorConfig;
use crate::graph::{Element, ElementBody, ElementGraph, EventBranch, EventTrigger};

/// Emits code for the elements of one participant's process.
/// The reference map turns participant names into the location variables of the enclosing `proc`.
#[derive(Debug, Clone)]
pub struct Visitor<'g> {
    graph: &'g ElementGraph,
    config: &'g TranslatorConfig,
    participant: Option<String>,
    references: BTreeMap<String, String>,
}

impl<'g> Visitor<'g> {
    pub fn new(graph: &'g ElementGraph, config: &'g TranslatorConfig) -> Self {
        Visitor {
            graph,
            config,
            participant: None,
            references: BTreeMap::new(),
        }
    }

    /// Emit code on behalf of a participant that holds references to the named participants
    pub fn for_participant<I, S>(mut self, participant: &str, referenced: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participant = Some(participant.to_string());
        self.references = referenced
            .into_iter()
            .map(Into::into)
            .map(|name| {
                let variable = super::reference_name(&name, &self.config.reference_suffix);
                (name, variable)
            })
            .collect();
        self
    }

    /// Participant name → location variable
    pub fn references(&self) -> &BTreeMap<String, String> {
        &self.references
    }

    /// The location variables sorted by name, as they appear in parameter and argument lists
    pub fn reference_variables(&self) -> Vec<&str> {
        let mut variables = self.references.values().map(String::as_str).collect::<Vec<_>>();
        variables.sort_unstable();
        variables
    }

    /// Where messages for a participant are sent: its location variable, `self` for the
    /// participant itself, `null` when it cannot be addressed
    fn receiver_location(&self, receiver: Option<&str>) -> String {
        match receiver {
            Some(name) if self.references.contains_key(name) => self.references[name].clone(),
            Some(name) if self.participant.as_deref() == Some(name) => "self".to_string(),
            _ => {
                debug!(receiver = ?receiver, "message receiver is not addressable");
                "null".to_string()
            }
        }
    }

    /// Where a signal is read from: the sender's location variable, otherwise `self`
    fn sender_location(&self, sender: &str) -> String {
        self.references.get(sender).cloned().unwrap_or_else(|| "self".to_string())
    }

    /// Emit the code of one element. Gateways include their branches and the `out` of their merge.
    pub fn visit(&self, element: &Element) -> String {
        let out = out_token(element.outgoing_edge.as_deref());
        match &element.body {
            ElementBody::NoneStart => out,
            ElementBody::MessageStart { message_id } | ElementBody::MessageCatch { message_id } => {
                format!("in('{}')@self\n{}", message_id, out)
            }
            ElementBody::SignalStart { signal_id, sender } | ElementBody::SignalCatch { signal_id, sender } => {
                format!("read('{}')@{}\n{}", signal_id, self.sender_location(sender), out)
            }
            ElementBody::TimerStart { duration_ms } | ElementBody::TimerCatch { duration_ms } => {
                format!("Thread.sleep({})\n{}", duration_ms, out)
            }
            ElementBody::MessageThrow { message_id, receiver, .. } => {
                format!("out('{}')@{}\n{}", message_id, self.receiver_location(receiver.as_deref()), out)
            }
            ElementBody::MessageEnd { message_id, receiver, .. } => {
                format!("out('{}')@{}\n", message_id, self.receiver_location(receiver.as_deref()))
            }
            ElementBody::SignalThrow { signal_id } => format!("{}{}", self.publish_signal(signal_id), out),
            ElementBody::SignalEnd { signal_id } => self.publish_signal(signal_id),
            ElementBody::NoneEnd => String::new(),
            ElementBody::ScriptTask => {
                let name = element.name.as_deref().unwrap_or(&element.id);
                spawn(&identifier(name), element.outgoing_edge.as_deref())
            }
            ElementBody::CallActivity { called } => spawn(&identifier(called), element.outgoing_edge.as_deref()),
            ElementBody::EventSubProcess { .. } => format!(
                "eval(new {}({}))@self\n",
                identifier(element.name.as_deref().unwrap_or(&element.id)),
                self.reference_variables().join(", ")
            ),
            ElementBody::SequenceFlow { .. } => format!("in('{}')@self\n", element.id),
            ElementBody::XorSplit { branches } => {
                let mut code = String::new();
                for (index, branch) in branches.iter().enumerate() {
                    let opening = match index {
                        0 => format!("if({}){{\n", branch.condition),
                        _ => "} else {\n".to_string(),
                    };
                    code.push_str(&opening);
                    code.push_str(&indent(&self.branch(&branch.elements), 1));
                }
                if !branches.is_empty() {
                    code.push_str("}\n");
                }
                code + &out
            }
            ElementBody::AndSplit { branches } => {
                let mut code = branches.iter().map(|branch| self.branch(branch)).collect::<String>();
                code.push_str(&out);
                code
            }
            ElementBody::Loop { condition, elements, exit_edge } => format!(
                "while({}){{\n{}}}\n{}",
                condition,
                indent(&self.branch(elements), 1),
                out_token(Some(exit_edge))
            ),
            ElementBody::EventBased { branches } => self.event_race(element, branches) + &out,
            ElementBody::MessageFlow { .. } | ElementBody::Participant | ElementBody::Collaboration { .. } => {
                String::new()
            }
        }
    }

    /// Publish a signal, hold it for a while and withdraw it again
    fn publish_signal(&self, signal_id: &str) -> String {
        format!(
            "out('{signal}')@self\nThread.sleep({hold})\nin('{signal}')@self\n",
            signal = signal_id,
            hold = self.config.signal_hold_ms
        )
    }

    /// A polling loop that runs the branch of whichever event fires first
    fn event_race(&self, gateway: &Element, branches: &[EventBranch]) -> String {
        let name = identifier(&gateway.id);
        let fired = format!("{}_fired", name);
        let mut code = format!("var {} = false\n", fired);

        for branch in branches {
            if let EventTrigger::Timer { duration_ms } = branch.trigger {
                let _ = writeln!(
                    code,
                    "val {}_{}_deadline = System.currentTimeMillis() + {}",
                    name, branch.key, duration_ms
                );
            }
        }

        let _ = writeln!(code, "while(!{}){{", fired);
        for (index, branch) in branches.iter().enumerate() {
            let guard = match &branch.trigger {
                EventTrigger::Message { message_id } => {
                    format!("in('{}')@self within {}", message_id, self.config.event_poll_ms)
                }
                EventTrigger::Signal { signal_id, sender } => format!(
                    "read('{}')@{} within {}",
                    signal_id,
                    self.sender_location(sender),
                    self.config.event_poll_ms
                ),
                EventTrigger::Timer { .. } => {
                    format!("System.currentTimeMillis() >= {}_{}_deadline", name, branch.key)
                }
                EventTrigger::Default => "true".to_string(),
            };
            let opening = if index == 0 {
                format!("if({}){{\n", guard)
            } else {
                format!("}} else if({}){{\n", guard)
            };
            let mut body = self.branch(&branch.elements);
            let _ = writeln!(body, "{} = true", fired);
            code.push_str(&indent(&opening, 1));
            code.push_str(&indent(&body, 2));
        }
        if !branches.is_empty() {
            code.push_str(&indent("}\n", 1));
        }
        code.push_str("}\n");
        code
    }

    /// Emit the elements of a branch, each followed by the token of its outgoing flow
    fn branch(&self, elements: &[String]) -> String {
        let mut code = String::new();
        for id in elements {
            let Some(element) = self.graph.get(id) else {
                warn!(id = %id, "branch element is missing from the graph");
                let _ = writeln!(code, "// untranslated element '{}'", id);
                break;
            };
            code.push_str(&self.visit(element));
            if let Some(edge) = &element.outgoing_edge {
                code.push_str(&format!("in('{}')@self\n", edge));
            }
        }
        code
    }

    /// Emit a process body by following outgoing flows from a start element.
    /// Each element is followed by the token of the flow to the next one. The walk ends at an
    /// element without outgoing flow or at an element that was already emitted.
    pub fn translate_body(&self, start: &Element) -> String {
        let mut code = String::new();
        let mut visited = HashSet::new();
        let mut current = start;

        loop {
            visited.insert(current.id.as_str());
            code.push_str(&self.visit(current));

            let Some(edge) = current.outgoing_edge.as_deref() else { break };
            let Some(target) = self.graph.target_of_sequence_flow(edge) else {
                warn!(flow = %edge, "outgoing flow is missing from the graph");
                let _ = writeln!(code, "// unknown sequence flow '{}'", edge);
                break;
            };
            let Some(next) = self.graph.get(target) else {
                warn!(id = %target, "flow target has no translation");
                let _ = writeln!(code, "// untranslated element '{}'", target);
                break;
            };
            if visited.contains(next.id.as_str()) {
                break;
            }
            let _ = writeln!(code, "in('{}')@self", edge);
            current = next;
        }
        code
    }
}

fn out_token(edge: Option<&str>) -> String {
    edge.map(|edge| format!("out('{}')@self\n", edge)).unwrap_or_default()
}

/// Spawn a placeholder process that hands the token on to the given flow
fn spawn(process: &str, edge: Option<&str>) -> String {
    format!("eval(new {}('{}'))@self\n", process, edge.unwrap_or_default())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::graph::XorBranch;

    fn task(id: &str, name: &str, outgoing: &str) -> Element {
        Element::new(id, ElementBody::ScriptTask).with_name(name).with_outgoing(outgoing)
    }

    #[test]
    fn test_none_start() {
        let graph = ElementGraph::new();
        let config = TranslatorConfig::default();
        let visitor = Visitor::new(&graph, &config);
        let start = Element::new("e1", ElementBody::NoneStart).with_outgoing("f1");
        assert_eq!(visitor.visit(&start), "out('f1')@self\n");
    }

    #[test]
    fn test_message_start() {
        let graph = ElementGraph::new();
        let config = TranslatorConfig::default();
        let visitor = Visitor::new(&graph, &config);
        let start = Element::new("e1", ElementBody::MessageStart { message_id: "m1".into() }).with_outgoing("f1");
        assert_eq!(visitor.visit(&start), "in('m1')@self\nout('f1')@self\n");
    }

    #[test]
    fn test_locations() {
        let graph = ElementGraph::new();
        let config = TranslatorConfig::default();
        let visitor = Visitor::new(&graph, &config).for_participant("Alice", ["Bob Builder"]);
        let throw = Element::new(
            "t",
            ElementBody::MessageThrow { message_id: "m".into(), message_flow: "mf".into(), receiver: Some("Bob Builder".into()) },
        )
        .with_outgoing("f");
        assert_eq!(visitor.visit(&throw), "out('m')@bobbuilderLoc\nout('f')@self\n");
        let catch = Element::new("c", ElementBody::SignalCatch { signal_id: "s".into(), sender: "Carol".into() })
            .with_outgoing("g");
        assert_eq!(visitor.visit(&catch), "read('s')@self\nout('g')@self\n");
        let end = Element::new(
            "e",
            ElementBody::MessageEnd { message_id: "m".into(), message_flow: "mf".into(), receiver: Some("Dave".into()) },
        );
        assert_eq!(visitor.visit(&end), "out('m')@null\n");
    }

    #[test]
    fn test_signal_throw() {
        let graph = ElementGraph::new();
        let config = TranslatorConfig { signal_hold_ms: 250, ..TranslatorConfig::default() };
        let visitor = Visitor::new(&graph, &config);
        let throw = Element::new("t", ElementBody::SignalThrow { signal_id: "go".into() }).with_outgoing("f");
        assert_eq!(
            visitor.visit(&throw),
            "out('go')@self\nThread.sleep(250)\nin('go')@self\nout('f')@self\n"
        );
    }

    #[test]
    fn test_exclusive_split() {
        let graph: ElementGraph = [task("A", "Ship", "fa"), task("B", "Bill", "fb")].into_iter().collect();
        let config = TranslatorConfig::default();
        let visitor = Visitor::new(&graph, &config);
        let split = Element::new(
            "X",
            ElementBody::XorSplit {
                branches: vec![
                    XorBranch { condition: "x>0".into(), elements: vec!["A".into()] },
                    XorBranch { condition: "x<=0".into(), elements: vec!["B".into()] },
                ],
            },
        )
        .with_outgoing("merged");
        assert_eq!(
            visitor.visit(&split),
            "if(x>0){\n  eval(new Ship('fa'))@self\n  in('fa')@self\n} else {\n  eval(new Bill('fb'))@self\n  in('fb')@self\n}\nout('merged')@self\n"
        );
    }

    #[test]
    fn test_loop() {
        let graph: ElementGraph = [task("b1", "Count", "back")].into_iter().collect();
        let config = TranslatorConfig::default();
        let visitor = Visitor::new(&graph, &config);
        let looped = Element::new(
            "L",
            ElementBody::Loop { condition: "i<10".into(), elements: vec!["b1".into()], exit_edge: "f_exit".into() },
        )
        .with_outgoing("f_exit");
        assert_eq!(
            visitor.visit(&looped),
            "while(i<10){\n  eval(new Count('back'))@self\n  in('back')@self\n}\nout('f_exit')@self\n"
        );
    }

    #[test]
    fn test_event_race() {
        let graph: ElementGraph = [task("T", "React", "ft")].into_iter().collect();
        let config = TranslatorConfig::default();
        let visitor = Visitor::new(&graph, &config);
        let race = Element::new(
            "Race",
            ElementBody::EventBased {
                branches: vec![
                    EventBranch {
                        key: "message".into(),
                        event: "E1".into(),
                        trigger: EventTrigger::Message { message_id: "m".into() },
                        elements: vec!["T".into()],
                    },
                    EventBranch {
                        key: "timer".into(),
                        event: "E2".into(),
                        trigger: EventTrigger::Timer { duration_ms: 500 },
                        elements: vec![],
                    },
                ],
            },
        )
        .with_outgoing("fm");
        assert_eq!(
            visitor.visit(&race),
            "var Race_fired = false
val Race_timer_deadline = System.currentTimeMillis() + 500
while(!Race_fired){
  if(in('m')@self within 100){
    eval(new React('ft'))@self
    in('ft')@self
    Race_fired = true
  } else if(System.currentTimeMillis() >= Race_timer_deadline){
    Race_fired = true
  }
}
out('fm')@self
"
        );
    }

    #[test]
    fn test_body_stops_at_missing_and_visited_elements() {
        let graph: ElementGraph = [
            Element::new("S", ElementBody::NoneStart).with_outgoing("f1"),
            Element::new("f1", ElementBody::SequenceFlow { source: "S".into(), target: "T".into() }),
            task("T", "Work", "f2"),
            Element::new("f2", ElementBody::SequenceFlow { source: "T".into(), target: "Gone".into() }),
        ]
        .into_iter()
        .collect();
        let config = TranslatorConfig::default();
        let visitor = Visitor::new(&graph, &config);
        let start = graph.get("S").expect("start element");
        assert_eq!(
            visitor.translate_body(start),
            "out('f1')@self\nin('f1')@self\neval(new Work('f2'))@self\n// untranslated element 'Gone'\n"
        );
    }
}
