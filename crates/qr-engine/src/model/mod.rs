pub mod extension;
pub mod questionnaire;
pub mod response;
pub mod value;

pub use extension::{Extension, ExtensionList, ExpressionValue};
pub use questionnaire::{
    AnswerConstraint, AnswerOption, DisabledDisplay, EnableBehavior, EnableWhen,
    EnableWhenOperator, ItemInitial, ItemType, Questionnaire, QuestionnaireItem,
};
pub use response::{QuestionnaireResponse, ResponseAnswer, ResponseItem, ResponseStatus};
pub use value::{AnswerValue, Coding, Quantity, Reference};
