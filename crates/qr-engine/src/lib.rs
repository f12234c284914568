#![allow(missing_docs)]

mod calculate;
mod definition;
pub mod error;
pub mod expr;
pub mod model;
pub mod options;
pub mod render;
pub mod scope;
mod serialize;
pub mod store;
pub mod validate;
mod visibility;

pub use error::{ExpressionError, FormError};
pub use expr::CompiledExpression;
pub use model::{
    AnswerValue, Coding, ItemType, Quantity, Questionnaire, QuestionnaireItem,
    QuestionnaireResponse, Reference, ResponseAnswer, ResponseItem, ResponseStatus,
};
pub use options::{FormOptions, ReferenceResolution};
pub use render::{
    RenderAnswer, RenderNode, RenderPayload, RenderProgress, RenderStatus, build_render_payload,
    render_json_ui, render_text,
};
pub use scope::Scope;
pub use store::{AnswerId, AnswerRef, AnswerState, FormStore, NodeId, NodeKind, NodeRef, QuestionRef};
pub use validate::{Issue, IssueCode, IssueSeverity};

/// JSON schema of the `Questionnaire` shape accepted by [`FormStore`].
pub fn questionnaire_schema() -> schemars::Schema {
    schemars::schema_for!(Questionnaire)
}
