use thiserror::Error;

use crate::model::ItemType;
use crate::store::{AnswerId, NodeId};

/// Contract violations raised by [`crate::FormStore`] operations.
///
/// Validation findings are never reported through this type; see
/// [`crate::Issue`].
#[derive(Debug, Error)]
pub enum FormError {
    #[error("failed to parse resource: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("node {0} does not belong to this form")]
    UnknownNode(NodeId),
    #[error("answer {0} does not belong to this form")]
    UnknownAnswer(AnswerId),
    #[error("no item with linkId '{0}'")]
    UnknownLinkId(String),
    #[error("item '{0}' is not a question")]
    NotAQuestion(String),
    #[error("question '{0}' has no answer slot")]
    NoAnswerSlot(String),
    #[error("item '{0}' is not a repeating group")]
    NotAGroupList(String),
    #[error("item '{0}' is not an instance of a repeating group")]
    NotAGroupInstance(String),
    #[error("item '{0}' does not repeat")]
    NotRepeating(String),
    #[error("item '{link_id}' expects a {expected} answer but received {found}")]
    TypeMismatch {
        link_id: String,
        expected: ItemType,
        found: &'static str,
    },
}

/// Failures raised while compiling or evaluating a FHIRPath expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("failed to compile expression: {0}")]
    Compile(#[source] ferrum_fhirpath::Error),
    #[error("failed to evaluate expression: {0}")]
    Evaluate(#[source] ferrum_fhirpath::Error),
    #[error("expression evaluation aborted: {0}")]
    Aborted(String),
    #[error("expected a single item but the collection has {0}")]
    NotSingleton(usize),
}
