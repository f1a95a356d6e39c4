//! This module generates XKlaim code from the element graph.
//!
//! The [`Generator`] assembles the `net` declaration and one `proc` per participant, using a
//! [`Visitor`] per participant to emit the process bodies. Placeholder stubs are produced for
//! call activities and tasks, whose behaviour the diagram does not describe.

mod optimizer;
mod visitor;

pub use optimizer::{optimize, optimize_code, peephole_pass};
pub use visitor::Visitor;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::Serialize;
use tracing::{debug, warn};

use crate::analyzer::Interactions;
use crate::config::TranslatorConfig;
use crate::graph::{Element, ElementBody, ElementGraph, ElementKind};

/// A named `proc` definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessCode {
    pub name: String,
    pub code: String,
}

/// Everything generated for one diagram
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranslationResult {
    /// The `net` declaration, or a marker comment when the diagram has no collaboration
    pub collaboration: String,
    pub processes: Vec<ProcessCode>,
    /// Stubs keyed by called process name
    pub call_activities: BTreeMap<String, String>,
    /// Stubs keyed by task name
    pub script_tasks: BTreeMap<String, String>,
    /// Event sub-process `proc`s keyed by their name
    pub event_sub_processes: BTreeMap<String, String>,
    pub participants: Vec<String>,
}

impl TranslationResult {
    pub fn process(&self, name: &str) -> Option<&str> {
        self.processes
            .iter()
            .find(|process| process.name == name)
            .map(|process| process.code.as_str())
    }
}

/// The complete XKlaim program: the net, the participants' procs, then all stubs
impl Display for TranslationResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "{}", self.collaboration)?;
        let procs = self
            .processes
            .iter()
            .map(|process| &process.code)
            .chain(self.event_sub_processes.values())
            .chain(self.call_activities.values())
            .chain(self.script_tasks.values());
        for code in procs {
            writeln!(f, "{}", code)?;
        }
        Ok(())
    }
}

/// Keep ASCII letters, digits and underscores; an identifier must not start with a digit
pub fn identifier(name: &str) -> String {
    let mut identifier = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>();
    if identifier.is_empty() || identifier.starts_with(|c: char| c.is_ascii_digit()) {
        identifier.insert(0, '_');
    }
    identifier
}

/// The location variable for a participant, e.g. `Bob's Shop` becomes `bobsshopLoc`
pub fn reference_name(participant: &str, suffix: &str) -> String {
    let mut name = participant
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect::<String>();
    name.push_str(suffix);
    name
}

/// Indent every non-empty line by two spaces per level
pub fn indent(code: &str, levels: usize) -> String {
    let padding = "  ".repeat(levels);
    code.lines()
        .map(|line| {
            if line.is_empty() {
                "\n".to_string()
            } else {
                format!("{}{}\n", padding, line)
            }
        })
        .collect()
}

/// The stub every call activity and task spawns: it only hands the token on
fn stub(name: &str) -> String {
    format!("proc {}(String edge) {{\n  // write your code here\n  out(edge)@self\n}}\n", name)
}

/// The name of the `proc` executing a process
fn process_name(id: &str, name: Option<&str>) -> String {
    identifier(name.unwrap_or(id))
}

/// A participant's setup: who it is and which other participants it needs to address
#[derive(Debug)]
struct Setup<'g> {
    participant: &'g Element,
    name: String,
    node: String,
    /// Names of the referenced participants
    referenced: Vec<String>,
}

pub struct Generator<'g> {
    graph: &'g ElementGraph,
    config: &'g TranslatorConfig,
    interactions: &'g Interactions,
}

impl<'g> Generator<'g> {
    pub fn new(graph: &'g ElementGraph, config: &'g TranslatorConfig, interactions: &'g Interactions) -> Self {
        Generator { graph, config, interactions }
    }

    pub fn generate(&self) -> TranslationResult {
        let mut result = TranslationResult {
            call_activities: self.call_activity_stubs(),
            script_tasks: self.script_task_stubs(),
            ..TranslationResult::default()
        };

        match self.graph.collaboration() {
            Some(collaboration) => self.collaboration(collaboration, &mut result),
            None => {
                debug!("no collaboration, translating every process with a start event");
                result.collaboration = "// no collaboration in diagram".to_string();
                self.standalone_processes(&mut result);
            }
        }
        result
    }

    /// The participants of a collaboration, sorted by name, with their references
    fn setups(&self, collaboration: &'g Element) -> Vec<Setup<'g>> {
        let ElementBody::Collaboration { participants } = &collaboration.body else {
            return Vec::new();
        };
        let by_id = self.graph.participants_by_id();
        let label = |participant: &Element| participant.name.clone().unwrap_or_else(|| participant.id.clone());

        let mut setups = participants
            .iter()
            .filter_map(|id| {
                let participant = by_id.get(id.as_str()).copied();
                if participant.is_none() {
                    warn!(id = %id, "collaboration refers to an unknown participant");
                }
                participant
            })
            .map(|participant| {
                let referenced = self
                    .interactions
                    .get(&participant.id)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| by_id.get(id.as_str()).map(|&other| label(other)))
                    .collect();
                let name = label(participant);
                Setup { participant, node: identifier(&name), name, referenced }
            })
            .collect::<Vec<_>>();
        setups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.participant.id.cmp(&b.participant.id)));
        setups
    }

    fn collaboration(&self, collaboration: &'g Element, result: &mut TranslationResult) {
        let setups = self.setups(collaboration);
        let nodes = setups
            .iter()
            .map(|setup| (setup.name.as_str(), setup.node.as_str()))
            .collect::<BTreeMap<_, _>>();

        let mut net = format!("net {} physical \"{}\" {{\n", identifier(&collaboration.id), self.config.network_address);
        for setup in &setups {
            let visitor = Visitor::new(self.graph, self.config).for_participant(&setup.name, setup.referenced.clone());
            let Some(process_id) = setup.participant.process_id.as_deref() else {
                warn!(id = %setup.participant.id, "participant has no process");
                net.push_str(&indent(&format!("node {} {{\n}}\n", setup.node), 1));
                continue;
            };

            // Node arguments follow the order of the location variables
            let mut arguments = visitor
                .references()
                .iter()
                .map(|(name, variable)| {
                    let node = nodes.get(name.as_str()).map(|node| node.to_string());
                    (variable.clone(), node.unwrap_or_else(|| identifier(name)))
                })
                .collect::<Vec<_>>();
            arguments.sort();
            let arguments = arguments.into_iter().map(|(_, node)| node).collect::<Vec<_>>().join(", ");

            let name = process_name(process_id, setup.participant.process_name.as_deref());
            net.push_str(&indent(
                &format!("node {} {{\n  eval(new {}({}))@self\n}}\n", setup.node, name, arguments),
                1,
            ));

            result.processes.push(ProcessCode {
                code: self.process(&visitor, &name, process_id),
                name,
            });
            self.event_sub_processes(&visitor, process_id, result);
        }
        net.push_str("}\n");

        result.collaboration = net;
        result.participants = setups.into_iter().map(|setup| setup.name).collect();
    }

    /// Without a collaboration, every process with a start event becomes a `proc` without parameters
    fn standalone_processes(&self, result: &mut TranslationResult) {
        let mut processes = BTreeMap::new();
        for start in self.graph.all_start_events() {
            if let Some(process_id) = start.process_id.as_deref() {
                processes.entry(process_id).or_insert(start.process_name.as_deref());
            }
        }
        for (process_id, declared_name) in processes {
            let visitor = Visitor::new(self.graph, self.config);
            let name = process_name(process_id, declared_name);
            result.processes.push(ProcessCode {
                code: self.process(&visitor, &name, process_id),
                name,
            });
            self.event_sub_processes(&visitor, process_id, result);
        }
    }

    fn header(&self, visitor: &Visitor<'_>, name: &str) -> String {
        let parameters = visitor
            .reference_variables()
            .into_iter()
            .map(|variable| format!("Locality {}", variable))
            .collect::<Vec<_>>()
            .join(", ");
        format!("proc {}({}) {{\n", name, parameters)
    }

    /// The `proc` of a process: event sub-process invocations, then the body from each start event
    fn process(&self, visitor: &Visitor<'_>, name: &str, process_id: &str) -> String {
        let mut body = String::new();
        for sub_process in self.graph.event_subprocesses_of(process_id) {
            body.push_str(&visitor.visit(sub_process));
        }
        let starts = self.graph.start_events_of(process_id);
        if starts.is_empty() {
            warn!(process = %process_id, "process has no start event");
            body.push_str(&format!("// no start event in process '{}'\n", process_id));
        }
        for start in starts {
            body.push_str(&visitor.translate_body(start));
        }
        self.finish(&self.header(visitor, name), &body)
    }

    fn event_sub_processes(&self, visitor: &Visitor<'_>, process_id: &str, result: &mut TranslationResult) {
        for sub_process in self.graph.event_subprocesses_of(process_id) {
            let ElementBody::EventSubProcess { start_event, .. } = &sub_process.body else {
                continue;
            };
            let name = identifier(sub_process.name.as_deref().unwrap_or(&sub_process.id));
            let body = match start_event.as_deref().and_then(|id| self.graph.get(id)) {
                Some(start) => visitor.translate_body(start),
                None => format!("// no start event in process '{}'\n", sub_process.id),
            };
            let code = self.finish(&self.header(visitor, &name), &body);
            result.event_sub_processes.insert(name, code);
        }
    }

    fn finish(&self, header: &str, body: &str) -> String {
        let body = if self.config.optimize { optimize_code(body) } else { body.to_string() };
        format!("{}{}}}\n", header, indent(&body, 1))
    }

    fn call_activity_stubs(&self) -> BTreeMap<String, String> {
        self.graph
            .elements_of_type(ElementKind::CallActivity)
            .into_iter()
            .filter_map(|element| match &element.body {
                ElementBody::CallActivity { called } => Some(identifier(called)),
                _ => None,
            })
            .map(|name| {
                let code = stub(&name);
                (name, code)
            })
            .collect()
    }

    fn script_task_stubs(&self) -> BTreeMap<String, String> {
        self.graph
            .elements_of_type(ElementKind::ScriptTask)
            .into_iter()
            .map(|element| identifier(element.name.as_deref().unwrap_or(&element.id)))
            .map(|name| {
                let code = stub(&name);
                (name, code)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("Check Order"), "CheckOrder");
        assert_eq!(identifier("2nd-step"), "_2ndstep");
        assert_eq!(identifier("already_ok"), "already_ok");
        assert_eq!(identifier("!!"), "_");
    }

    #[test]
    fn test_reference_name() {
        assert_eq!(reference_name("Bob's Shop", "Loc"), "bobsshopLoc");
        assert_eq!(reference_name("alice", "Ref"), "aliceRef");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\n\nb\n", 2), "    a\n\n    b\n");
    }

    #[test]
    fn test_missing_start_event_marker() {
        let graph: ElementGraph = [
            Element::new("PA", ElementBody::Participant).with_name("Alice").in_process("A", Some("Alice Process".into())),
            Element::new("C", ElementBody::Collaboration { participants: vec!["PA".into()] }),
        ]
        .into_iter()
        .collect();
        let config = TranslatorConfig::default();
        let interactions = Interactions::new();
        let result = Generator::new(&graph, &config, &interactions).generate();
        assert_eq!(
            result.collaboration,
            "net C physical \"localhost:9999\" {\n  node Alice {\n    eval(new AliceProcess())@self\n  }\n}\n"
        );
        assert_eq!(
            result.process("AliceProcess"),
            Some("proc AliceProcess() {\n  // no start event in process 'A'\n}\n")
        );
        assert_eq!(result.participants, vec!["Alice".to_string()]);
    }

    #[test]
    fn test_display_and_json() {
        let result = TranslationResult {
            collaboration: "// no collaboration in diagram".into(),
            processes: vec![ProcessCode { name: "P".into(), code: "proc P() {\n}\n".into() }],
            call_activities: BTreeMap::from([("Billing".to_string(), stub("Billing"))]),
            ..TranslationResult::default()
        };
        assert_eq!(
            result.to_string(),
            "// no collaboration in diagram\nproc P() {\n}\n\nproc Billing(String edge) {\n  // write your code here\n  out(edge)@self\n}\n\n"
        );
        let json = serde_json::to_value(&result).expect("serializable");
        assert_eq!(json["processes"][0]["name"], "P");
        assert!(json["script_tasks"].as_object().map_or(false, |tasks| tasks.is_empty()));
    }
}
