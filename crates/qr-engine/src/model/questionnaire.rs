use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::extension::Extension;
use crate::model::value::AnswerValue;

fn questionnaire_resource_type() -> String {
    "Questionnaire".into()
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Top-level FHIR `Questionnaire` definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    #[serde(default = "questionnaire_resource_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
}

impl Default for Questionnaire {
    fn default() -> Self {
        Self {
            resource_type: questionnaire_resource_type(),
            id: None,
            url: None,
            version: None,
            name: None,
            title: None,
            status: None,
            extension: Vec::new(),
            item: Vec::new(),
        }
    }
}

/// One entry of `Questionnaire.item`, possibly nesting further items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireItem {
    pub link_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub kind: ItemType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub repeats: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_when: Vec<EnableWhen>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_behavior: Option<EnableBehavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_display: Option<DisabledDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_constraint: Option<AnswerConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_value_set: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_option: Vec<AnswerOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial: Vec<ItemInitial>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
}

impl QuestionnaireItem {
    /// Builds a bare item; handy for programmatic questionnaires and tests.
    pub fn new(link_id: impl Into<String>, kind: ItemType) -> Self {
        Self {
            link_id: link_id.into(),
            definition: None,
            prefix: None,
            text: None,
            kind,
            required: false,
            repeats: false,
            read_only: false,
            max_length: None,
            enable_when: Vec::new(),
            enable_behavior: None,
            disabled_display: None,
            answer_constraint: None,
            answer_value_set: None,
            answer_option: Vec::new(),
            initial: Vec::new(),
            extension: Vec::new(),
            item: Vec::new(),
        }
    }
}

/// `Questionnaire.item.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    Group,
    Display,
    Question,
    Boolean,
    Decimal,
    Integer,
    Date,
    DateTime,
    Time,
    String,
    Text,
    Url,
    Coding,
    Choice,
    #[serde(rename = "open-choice")]
    OpenChoice,
    Attachment,
    Reference,
    Quantity,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Group => "group",
            ItemType::Display => "display",
            ItemType::Question => "question",
            ItemType::Boolean => "boolean",
            ItemType::Decimal => "decimal",
            ItemType::Integer => "integer",
            ItemType::Date => "date",
            ItemType::DateTime => "dateTime",
            ItemType::Time => "time",
            ItemType::String => "string",
            ItemType::Text => "text",
            ItemType::Url => "url",
            ItemType::Coding => "coding",
            ItemType::Choice => "choice",
            ItemType::OpenChoice => "open-choice",
            ItemType::Attachment => "attachment",
            ItemType::Reference => "reference",
            ItemType::Quantity => "quantity",
        }
    }

    /// Whether items of this type hold answers.
    pub fn is_question(&self) -> bool {
        !matches!(
            self,
            ItemType::Group | ItemType::Display | ItemType::Question
        )
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `enableWhen` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnableWhen {
    pub question: String,
    pub operator: EnableWhenOperator,
    /// The `answer[x]` choice, kept as raw fields.
    #[serde(flatten)]
    pub answer: Map<String, Value>,
}

impl EnableWhen {
    pub fn expected(&self) -> Option<AnswerValue> {
        AnswerValue::from_prefixed("answer", &self.answer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum EnableWhenOperator {
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum EnableBehavior {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DisabledDisplay {
    #[default]
    Hidden,
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AnswerConstraint {
    #[default]
    OptionsOnly,
    OptionsOrType,
    OptionsOrString,
}

/// One permitted answer in `answerOption`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    #[serde(default, skip_serializing_if = "is_false")]
    pub initial_selected: bool,
    /// The `value[x]` choice, kept as raw fields.
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

impl AnswerOption {
    pub fn answer(&self) -> Option<AnswerValue> {
        AnswerValue::from_prefixed("value", &self.value)
    }
}

/// One `initial` value of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemInitial {
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

impl ItemInitial {
    pub fn answer(&self) -> Option<AnswerValue> {
        AnswerValue::from_prefixed("value", &self.value)
    }
}
