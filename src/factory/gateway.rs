//! This module classifies gateways and resolves their branches.
//!
//! An exclusive gateway is read in one of three ways depending on its shape:
//!
//! - a split (one incoming, several outgoing flows) is a binary decision,
//! - a merge whose outgoing flow reaches a split with one conditioned and one plain flow is a loop header,
//! - the split behind an exclusive merge, with one conditioned and one plain flow, is the loop
//!   tail and gets no element of its own, even when the loop itself turns out to be malformed.
//!
//! Branches are walked forward from each outgoing flow. A nested split met on the way is
//! resolved first, and the walk jumps past the merge that closes it.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use super::{located, required_duration, required_signal, ElementFactory, NodeEntry};
use crate::bpmn::{EventDefinition, FlowNode, NodeKind, SequenceFlow};
use crate::error::{StructuralError, ValidationError};
use crate::graph::{Element, ElementBody, EventBranch, EventTrigger, XorBranch};
use crate::Result;

/// The kind of merge gateway that closes a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeKind {
    Exclusive,
    Parallel,
}

impl MergeKind {
    fn closes(self, node: &FlowNode) -> bool {
        node.is_merge()
            && match self {
                MergeKind::Exclusive => node.is_exclusive_gateway(),
                MergeKind::Parallel => node.is_parallel_gateway(),
            }
    }
}

/// The result of walking one branch
#[derive(Debug, Default)]
struct Branch<'doc> {
    elements: Vec<String>,
    /// The merge gateway the walk stopped at, if it stopped at one
    merge: Option<&'doc FlowNode>,
}

impl<'doc> ElementFactory<'doc> {
    /// Resolve a gateway, or return the memoized resolution.
    /// `depth` counts how many gateways enclose this one in the current walk.
    pub(super) fn gateway(&mut self, entry: NodeEntry<'doc>, depth: usize) -> Result<Option<Element>> {
        let id = &entry.node.id;
        if let Some(resolved) = self.gateways.get(id) {
            return Ok(resolved.clone());
        }
        // Merges are only checked for loops and do not add a nesting level
        let nests = entry.node.is_split() || matches!(entry.node.kind, NodeKind::EventBasedGateway);
        if nests && depth > self.max_depth {
            return Err(StructuralError::NestingTooDeep { id: id.clone(), limit: self.max_depth }.into());
        }
        if !self.resolving.insert(id.clone()) {
            return Err(StructuralError::BranchCycle { id: id.clone(), element: id.clone() }.into());
        }

        let resolved = match entry.node.kind {
            NodeKind::ExclusiveGateway => self.exclusive_gateway(entry, depth),
            NodeKind::ParallelGateway if entry.node.is_split() => self.parallel_split(entry, depth).map(Some),
            NodeKind::EventBasedGateway => self.event_based_gateway(entry, depth).map(Some),
            _ => Ok(None),
        };
        self.resolving.remove(id);

        let resolved = resolved?;
        debug!(id = %id, resolved = resolved.is_some(), "resolved gateway");
        self.gateways.insert(id.clone(), resolved.clone());
        Ok(resolved)
    }

    fn exclusive_gateway(&mut self, entry: NodeEntry<'doc>, depth: usize) -> Result<Option<Element>> {
        let node = entry.node;
        if node.is_split() {
            if self.is_loop_tail(node) {
                debug!(id = %node.id, "exclusive split closes a loop");
                return Ok(None);
            }
            return self.exclusive_split(entry, depth).map(Some);
        }
        if node.is_merge() {
            return Ok(self.resolve_loop(entry));
        }
        Ok(None)
    }

    /// A split is the tail of a loop when its incoming flow comes from an exclusive merge and it
    /// has the loop's flow shape. Whether the loop body is valid is up to the header.
    fn is_loop_tail(&self, node: &FlowNode) -> bool {
        let Some(source) = node.incoming.first().and_then(|flow| self.context.source_of(flow)) else {
            return false;
        };
        source.node.is_exclusive_gateway() && source.node.is_merge() && self.loop_flows(node).is_some()
    }

    /// The conditioned (repeat) and plain (exit) flow of a loop tail; `None` unless the split has
    /// exactly one of each
    fn loop_flows(&self, split: &FlowNode) -> Option<(&'doc SequenceFlow, &'doc SequenceFlow)> {
        if !split.is_exclusive_gateway() || split.outgoing.len() != 2 {
            return None;
        }
        let flows = split.outgoing.iter().filter_map(|id| self.context.flow(id)).collect::<Vec<_>>();
        let (conditioned, plain): (Vec<_>, Vec<_>) = flows.into_iter().partition(|flow| flow.condition.is_some());
        match (conditioned.as_slice(), plain.as_slice()) {
            ([repeat], [exit]) => Some((*repeat, *exit)),
            _ => None,
        }
    }

    /// The outgoing flows of a gateway, sorted by target id
    fn sorted_flows(&self, node: &FlowNode) -> Result<Vec<&'doc SequenceFlow>> {
        let mut flows = node
            .outgoing
            .iter()
            .map(|id| {
                self.context
                    .flow(id)
                    .ok_or_else(|| ValidationError::UnknownSequenceFlow(id.clone()).into())
            })
            .collect::<Result<Vec<_>>>()?;
        flows.sort_by(|a, b| a.target_ref.cmp(&b.target_ref));
        Ok(flows)
    }

    fn exclusive_split(&mut self, entry: NodeEntry<'doc>, depth: usize) -> Result<Element> {
        let node = entry.node;
        if node.outgoing.len() != 2 {
            return Err(StructuralError::XorArity { id: node.id.clone(), branches: node.outgoing.len() }.into());
        }

        let mut branches = Vec::with_capacity(2);
        let mut merges = Vec::with_capacity(2);
        for flow in self.sorted_flows(node)? {
            let condition = flow.condition.clone().ok_or_else(|| ValidationError::MissingCondition {
                gateway: node.id.clone(),
                flow: flow.id.clone(),
            })?;
            if branches.iter().any(|branch: &XorBranch| branch.condition == condition) {
                return Err(StructuralError::DuplicateCondition { id: node.id.clone(), condition }.into());
            }
            let branch = self.walk_branch(&node.id, &flow.id, MergeKind::Exclusive, depth)?;
            merges.extend(branch.merge);
            branches.push(XorBranch { condition, elements: branch.elements });
        }

        let outgoing = self.shared_merge(&node.id, &merges).and_then(|merge| merge.outgoing.first().cloned());
        let mut element = located(entry, ElementBody::XorSplit { branches });
        element.outgoing_edge = outgoing;
        Ok(element)
    }

    fn parallel_split(&mut self, entry: NodeEntry<'doc>, depth: usize) -> Result<Element> {
        let node = entry.node;
        let mut branches = Vec::with_capacity(node.outgoing.len());
        let mut merges = Vec::with_capacity(node.outgoing.len());
        for flow in self.sorted_flows(node)? {
            let branch = self.walk_branch(&node.id, &flow.id, MergeKind::Parallel, depth)?;
            merges.extend(branch.merge);
            branches.push(branch.elements);
        }

        let outgoing = self.shared_merge(&node.id, &merges).and_then(|merge| merge.outgoing.first().cloned());
        let mut element = located(entry, ElementBody::AndSplit { branches });
        element.outgoing_edge = outgoing;
        Ok(element)
    }

    /// The merge that closes a split. Branches that end in an end event have no merge.
    fn shared_merge(&self, gateway: &str, merges: &[&'doc FlowNode]) -> Option<&'doc FlowNode> {
        let first = merges.first().copied()?;
        if merges.iter().any(|merge| merge.id != first.id) {
            warn!(id = %gateway, merge = %first.id, "branches close at different merges, using the first one");
        }
        Some(first)
    }

    /// Walk a branch from the given flow until a closing merge, an end event or a dead end
    fn walk_branch(&mut self, gateway: &str, flow: &str, closing: MergeKind, depth: usize) -> Result<Branch<'doc>> {
        let mut branch = Branch::default();
        let mut visited = HashSet::new();
        let mut flow = flow.to_string();

        loop {
            if self.context.flow(&flow).is_none() {
                return Err(ValidationError::UnknownSequenceFlow(flow).into());
            }
            let Some(target) = self.context.target_of(&flow) else {
                warn!(gateway = %gateway, flow = %flow, "sequence flow leads to an unknown element");
                break;
            };
            let node = target.node;

            // Loop headers are merges too, so they are checked before the closing merge
            if node.is_exclusive_gateway() && node.is_merge() {
                if let Some(looped) = self.gateway(target, depth + 1)? {
                    if !visited.insert(node.id.clone()) {
                        return Err(StructuralError::BranchCycle { id: gateway.to_string(), element: node.id.clone() }.into());
                    }
                    branch.elements.push(node.id.clone());
                    match looped.outgoing_edge {
                        Some(exit) => {
                            flow = exit;
                            continue;
                        }
                        None => break,
                    }
                }
            }
            if closing.closes(node) {
                branch.merge = Some(node);
                break;
            }
            if node.is_merge() {
                warn!(gateway = %gateway, merge = %node.id, "branch runs into a merge of another kind");
                break;
            }
            if !visited.insert(node.id.clone()) {
                return Err(StructuralError::BranchCycle { id: gateway.to_string(), element: node.id.clone() }.into());
            }

            match node.kind {
                NodeKind::ExclusiveGateway | NodeKind::ParallelGateway | NodeKind::EventBasedGateway => {
                    let nested = self.gateway(target, depth + 1)?;
                    branch.elements.push(node.id.clone());
                    match nested.and_then(|element| element.outgoing_edge) {
                        Some(next) => flow = next,
                        None => break,
                    }
                }
                NodeKind::EndEvent(_) => {
                    branch.elements.push(node.id.clone());
                    break;
                }
                _ => {
                    branch.elements.push(node.id.clone());
                    match node.outgoing.first() {
                        Some(next) => flow = next.clone(),
                        None => break,
                    }
                }
            }
        }
        Ok(branch)
    }

    /// Resolve a loop from its header merge. An unrecognized shape yields `None`.
    fn resolve_loop(&self, entry: NodeEntry<'doc>) -> Option<Element> {
        let merge = entry.node;
        let split = merge.outgoing.first().and_then(|flow| self.context.target_of(flow))?.node;
        if !split.is_exclusive_gateway() || split.outgoing.len() != 2 {
            debug!(id = %merge.id, "exclusive merge is not a loop header");
            return None;
        }
        let Some((repeat, exit)) = self.loop_flows(split) else {
            warn!(id = %merge.id, "loop needs exactly one conditioned and one plain flow");
            return None;
        };
        let condition = repeat.condition.clone()?;

        // The body runs from the conditioned target back to the header
        let mut elements = Vec::new();
        let mut visited = HashSet::new();
        let mut current = repeat.target_ref.as_str();
        while current != merge.id {
            let Some(body) = self.context.node(current) else {
                warn!(id = %merge.id, element = %current, "loop body leads to an unknown element");
                return None;
            };
            if !visited.insert(current) {
                warn!(id = %merge.id, element = %current, "loop body never returns to its header");
                return None;
            }
            elements.push(current.to_string());
            current = match body.node.outgoing.first().and_then(|flow| self.context.flow(flow)) {
                Some(flow) => flow.target_ref.as_str(),
                None => {
                    warn!(id = %merge.id, element = %current, "loop body ends before returning to its header");
                    return None;
                }
            };
        }
        if elements.is_empty() {
            warn!(id = %merge.id, "loop body is empty");
            return None;
        }

        let exit_edge = exit.id.clone();
        let mut element = located(entry, ElementBody::Loop { condition, elements, exit_edge: exit_edge.clone() });
        element.outgoing_edge = Some(exit_edge);
        Some(element)
    }

    fn event_based_gateway(&mut self, entry: NodeEntry<'doc>, depth: usize) -> Result<Element> {
        let node = entry.node;
        let flows = self.sorted_flows(node)?;
        if flows.len() < 2 {
            return Err(StructuralError::EventGatewayArity { id: node.id.clone(), branches: flows.len() }.into());
        }

        let mut branches = Vec::with_capacity(flows.len());
        let mut seen = BTreeMap::<&'static str, usize>::new();
        let mut terminals = BTreeMap::<&'doc str, (usize, &'doc FlowNode)>::new();
        for flow in flows {
            let Some(event) = self.context.node(&flow.target_ref) else {
                warn!(id = %node.id, target = %flow.target_ref, "event-based gateway leads to an unknown element");
                continue;
            };
            let trigger = self.trigger_of(event.node)?;
            let next = self.required_outgoing(event.node)?;
            let walked = self.walk_branch(&node.id, &next, MergeKind::Exclusive, depth)?;
            if let Some(merge) = walked.merge {
                terminals.entry(merge.id.as_str()).or_insert((0, merge)).0 += 1;
            }

            let kind = trigger.kind_key();
            let count = seen.entry(kind).or_insert(0);
            let key = if *count == 0 { kind.to_string() } else { format!("{}_{}", kind, count) };
            *count += 1;

            branches.push(EventBranch { key, event: event.node.id.clone(), trigger, elements: walked.elements });
        }

        // The most frequent terminal closes the race, provided more than one branch reaches it
        let merge = terminals
            .values()
            .filter(|(count, _)| *count > 1)
            .max_by(|(a, x), (b, y)| a.cmp(b).then_with(|| y.id.cmp(&x.id)))
            .map(|(_, merge)| *merge);
        if merge.is_none() {
            debug!(id = %node.id, "event-based gateway has no shared merge");
        }

        let mut element = located(entry, ElementBody::EventBased { branches });
        element.outgoing_edge = merge.and_then(|merge| merge.outgoing.first().cloned());
        Ok(element)
    }

    /// What the event behind an event-based gateway waits for
    fn trigger_of(&self, node: &FlowNode) -> Result<EventTrigger> {
        let trigger = match &node.kind {
            NodeKind::IntermediateCatchEvent(EventDefinition::Message { message_ref }) => EventTrigger::Message {
                message_id: self.message_id(node, message_ref, self.context.message_flow_to(&node.id))?,
            },
            NodeKind::IntermediateCatchEvent(EventDefinition::Signal { signal_ref }) => {
                let signal_id = required_signal(node, signal_ref)?;
                let sender = self.signal_sender(&signal_id);
                EventTrigger::Signal { signal_id, sender }
            }
            NodeKind::IntermediateCatchEvent(EventDefinition::Timer { duration }) => EventTrigger::Timer {
                duration_ms: required_duration(node, duration)?,
            },
            _ => EventTrigger::Default,
        };
        Ok(trigger)
    }
}
