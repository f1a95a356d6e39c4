//! The typed elements stored in the graph.

/// A condition-guarded branch of an exclusive split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorBranch {
    pub condition: String,
    /// Element IDs in traversal order, nested gateways included by their own ID
    pub elements: Vec<String>,
}

/// What a catching event behind an event-based gateway waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTrigger {
    Message { message_id: String },
    Signal { signal_id: String, sender: String },
    Timer { duration_ms: u64 },
    Default,
}

impl EventTrigger {
    /// The key a branch is filed under before collisions are resolved
    pub fn kind_key(&self) -> &'static str {
        match self {
            EventTrigger::Message { .. } => "message",
            EventTrigger::Signal { .. } => "signal",
            EventTrigger::Timer { .. } => "timer",
            EventTrigger::Default => "default",
        }
    }
}

/// One racing branch of an event-based gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBranch {
    /// `message`, `signal`, `timer` or `default`, suffixed with `_1`, `_2`, ... on collisions
    pub key: String,
    /// ID of the catching event that opens the branch
    pub event: String,
    pub trigger: EventTrigger,
    /// Elements after the catching event, in traversal order
    pub elements: Vec<String>,
}

/// The payload of an element, one variant per kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementBody {
    NoneStart,
    MessageStart { message_id: String },
    SignalStart { signal_id: String, sender: String },
    TimerStart { duration_ms: u64 },
    MessageCatch { message_id: String },
    SignalCatch { signal_id: String, sender: String },
    TimerCatch { duration_ms: u64 },
    /// `receiver` is the name of the participant the linked message flow points at
    MessageThrow { message_id: String, message_flow: String, receiver: Option<String> },
    SignalThrow { signal_id: String },
    NoneEnd,
    MessageEnd { message_id: String, message_flow: String, receiver: Option<String> },
    SignalEnd { signal_id: String },
    /// Script tasks and every other task kind
    ScriptTask,
    CallActivity { called: String },
    EventSubProcess { start_event: Option<String>, elements: Vec<String> },
    SequenceFlow { source: String, target: String },
    XorSplit { branches: Vec<XorBranch> },
    /// Branches are in the order of their sorted target IDs; the index is the ordinal
    AndSplit { branches: Vec<Vec<String>> },
    Loop { condition: String, elements: Vec<String>, exit_edge: String },
    EventBased { branches: Vec<EventBranch> },
    MessageFlow {
        sender_id: Option<String>,
        sender_name: Option<String>,
        receiver_id: Option<String>,
        receiver_name: Option<String>,
        source_ref: String,
        target_ref: String,
    },
    Participant,
    Collaboration { participants: Vec<String> },
}

/// The kind of an element without its payload, used for lookups by type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    NoneStart,
    MessageStart,
    SignalStart,
    TimerStart,
    MessageCatch,
    SignalCatch,
    TimerCatch,
    MessageThrow,
    SignalThrow,
    NoneEnd,
    MessageEnd,
    SignalEnd,
    ScriptTask,
    CallActivity,
    EventSubProcess,
    SequenceFlow,
    XorSplit,
    AndSplit,
    Loop,
    EventBased,
    MessageFlow,
    Participant,
    Collaboration,
}

impl ElementKind {
    pub fn is_start_event(self) -> bool {
        matches!(
            self,
            ElementKind::NoneStart | ElementKind::MessageStart | ElementKind::SignalStart | ElementKind::TimerStart
        )
    }

    /// Gateways whose emission covers their branches and the merge behind them
    pub fn is_complex_gateway(self) -> bool {
        matches!(
            self,
            ElementKind::XorSplit | ElementKind::AndSplit | ElementKind::Loop | ElementKind::EventBased
        )
    }
}

/// A node of the element graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub id: String,
    pub name: Option<String>,
    /// The sequence flow this element hands its token to. For gateways this is the flow
    /// leaving the merge (or the loop exit).
    pub outgoing_edge: Option<String>,
    pub process_id: Option<String>,
    pub process_name: Option<String>,
    /// ID of the event sub-process this element lives in, if any
    pub sub_process: Option<String>,
    pub body: ElementBody,
}

impl Element {
    pub fn new(id: impl Into<String>, body: ElementBody) -> Self {
        Element {
            id: id.into(),
            name: None,
            outgoing_edge: None,
            process_id: None,
            process_name: None,
            sub_process: None,
            body,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_outgoing(mut self, edge: impl Into<String>) -> Self {
        self.outgoing_edge = Some(edge.into());
        self
    }

    pub fn in_process(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.process_id = Some(id.into());
        self.process_name = name;
        self
    }

    pub fn kind(&self) -> ElementKind {
        match &self.body {
            ElementBody::NoneStart => ElementKind::NoneStart,
            ElementBody::MessageStart { .. } => ElementKind::MessageStart,
            ElementBody::SignalStart { .. } => ElementKind::SignalStart,
            ElementBody::TimerStart { .. } => ElementKind::TimerStart,
            ElementBody::MessageCatch { .. } => ElementKind::MessageCatch,
            ElementBody::SignalCatch { .. } => ElementKind::SignalCatch,
            ElementBody::TimerCatch { .. } => ElementKind::TimerCatch,
            ElementBody::MessageThrow { .. } => ElementKind::MessageThrow,
            ElementBody::SignalThrow { .. } => ElementKind::SignalThrow,
            ElementBody::NoneEnd => ElementKind::NoneEnd,
            ElementBody::MessageEnd { .. } => ElementKind::MessageEnd,
            ElementBody::SignalEnd { .. } => ElementKind::SignalEnd,
            ElementBody::ScriptTask => ElementKind::ScriptTask,
            ElementBody::CallActivity { .. } => ElementKind::CallActivity,
            ElementBody::EventSubProcess { .. } => ElementKind::EventSubProcess,
            ElementBody::SequenceFlow { .. } => ElementKind::SequenceFlow,
            ElementBody::XorSplit { .. } => ElementKind::XorSplit,
            ElementBody::AndSplit { .. } => ElementKind::AndSplit,
            ElementBody::Loop { .. } => ElementKind::Loop,
            ElementBody::EventBased { .. } => ElementKind::EventBased,
            ElementBody::MessageFlow { .. } => ElementKind::MessageFlow,
            ElementBody::Participant => ElementKind::Participant,
            ElementBody::Collaboration { .. } => ElementKind::Collaboration,
        }
    }

    /// The signal sender recorded on a signal start or catch event
    pub fn signal_sender(&self) -> Option<&str> {
        match &self.body {
            ElementBody::SignalStart { sender, .. } | ElementBody::SignalCatch { sender, .. } => Some(sender),
            _ => None,
        }
    }
}
