pub mod error;
pub mod config;
pub mod bpmn;
pub mod graph;
pub mod factory;
pub mod analyzer;
pub mod codegen;

pub use error::*;
pub use crate::config::TranslatorConfig;
pub use crate::bpmn::{parse_definitions, Definitions};
pub use crate::graph::{Element, ElementBody, ElementGraph, ElementKind};
pub use crate::analyzer::InteractionAnalyzer;
pub use crate::codegen::{Generator, TranslationResult};

use tracing::debug;

/// Translate a BPMN 2.0 XML document into XKlaim code.
/// Any validation or structural error aborts the whole translation.
pub fn translate(xml: &str, config: &TranslatorConfig) -> Result<TranslationResult> {
    let definitions = parse_definitions(xml)?;
    let graph = factory::build_graph(&definitions, config)?;

    let mut analyzer = InteractionAnalyzer::new();
    let interactions = analyzer.analyze(&graph);
    debug!(participants = interactions.len(), "interactions analyzed");

    Ok(Generator::new(&graph, config, interactions).generate())
}
