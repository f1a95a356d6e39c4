//! This module defines the error types for the translator.
//!
//! Validation and structural errors abort a translation request. Lookups that merely
//! enrich the output (a participant name, a signal sender) never fail: they are logged
//! with `tracing::warn!` and replaced by a default.

use thiserror::Error;

/// A required attribute, edge or child definition is missing or malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("element '{0}' has no outgoing sequence flow")]
    MissingOutgoing(String),
    #[error("element '{0}' has no incoming sequence flow")]
    MissingIncoming(String),
    #[error("element '{0}' requires a name")]
    MissingName(String),
    #[error("sequence flow '{flow}' leaving gateway '{gateway}' has no condition expression")]
    MissingCondition { gateway: String, flow: String },
    #[error("timer event '{0}' has no duration")]
    MissingDuration(String),
    #[error("timer event '{id}' has an invalid duration '{value}'")]
    InvalidDuration { id: String, value: String },
    #[error("call activity '{0}' has no called element")]
    MissingCalledElement(String),
    #[error("message event '{0}' has no linked message flow")]
    MissingMessageFlow(String),
    #[error("message event '{0}' names no message and has no message flow")]
    MissingMessageRef(String),
    #[error("signal event '{0}' has no signal reference")]
    MissingSignalRef(String),
    #[error("sequence flow '{0}' does not exist")]
    UnknownSequenceFlow(String),
}

/// A gateway topology outside of the shapes the resolver understands
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("exclusive gateway '{id}' has {branches} branches, exactly two are required")]
    XorArity { id: String, branches: usize },
    #[error("exclusive gateway '{id}' uses the condition '{condition}' on more than one branch")]
    DuplicateCondition { id: String, condition: String },
    #[error("event-based gateway '{id}' has {branches} branches, at least two are required")]
    EventGatewayArity { id: String, branches: usize },
    #[error("gateway '{id}' is nested deeper than {limit} levels")]
    NestingTooDeep { id: String, limit: usize },
    #[error("a branch of gateway '{id}' runs into element '{element}' twice")]
    BranchCycle { id: String, element: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("error parsing BPMN XML: {0}")]
    Parse(#[from] quick_xml::de::DeError), // The document is not well-formed BPMN XML
    #[error("invalid element: {0}")]
    Validation(#[from] ValidationError),
    #[error("unsupported gateway structure: {0}")]
    Structural(#[from] StructuralError),
    #[error("error reading input: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// The id of the element that caused a validation or structural error, if any
    pub fn element_id(&self) -> Option<&str> {
        match self {
            Error::Validation(error) => Some(match error {
                ValidationError::MissingOutgoing(id)
                | ValidationError::MissingIncoming(id)
                | ValidationError::MissingName(id)
                | ValidationError::MissingDuration(id)
                | ValidationError::MissingCalledElement(id)
                | ValidationError::MissingMessageFlow(id)
                | ValidationError::MissingMessageRef(id)
                | ValidationError::MissingSignalRef(id)
                | ValidationError::UnknownSequenceFlow(id) => id,
                ValidationError::MissingCondition { gateway, .. } => gateway,
                ValidationError::InvalidDuration { id, .. } => id,
            }),
            Error::Structural(error) => Some(match error {
                StructuralError::XorArity { id, .. }
                | StructuralError::DuplicateCondition { id, .. }
                | StructuralError::EventGatewayArity { id, .. }
                | StructuralError::NestingTooDeep { id, .. }
                | StructuralError::BranchCycle { id, .. } => id,
            }),
            Error::Parse(_) | Error::Io(_) | Error::Config(_) => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_element_id_of_structural_error() {
        let error: Error = StructuralError::XorArity { id: "Gateway_1".into(), branches: 3 }.into();
        assert_eq!(error.element_id(), Some("Gateway_1"));
        assert_eq!(
            error.to_string(),
            "unsupported gateway structure: exclusive gateway 'Gateway_1' has 3 branches, exactly two are required"
        );
    }

    #[test]
    fn test_element_id_of_validation_error() {
        let error: Error = ValidationError::MissingCondition {
            gateway: "Gateway_2".into(),
            flow: "Flow_9".into(),
        }.into();
        assert_eq!(error.element_id(), Some("Gateway_2"));
    }
}
