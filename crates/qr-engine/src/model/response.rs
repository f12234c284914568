use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::value::AnswerValue;

fn response_resource_type() -> String {
    "QuestionnaireResponse".into()
}

/// FHIR `QuestionnaireResponse`, both as seed input and as engine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponse {
    #[serde(default = "response_resource_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire: Option<String>,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authored: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<ResponseItem>,
}

impl Default for QuestionnaireResponse {
    fn default() -> Self {
        Self {
            resource_type: response_resource_type(),
            id: None,
            meta: None,
            identifier: None,
            based_on: None,
            part_of: None,
            questionnaire: None,
            status: ResponseStatus::default(),
            subject: None,
            encounter: None,
            authored: None,
            author: None,
            source: None,
            item: Vec::new(),
        }
    }
}

/// `QuestionnaireResponse.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseStatus {
    #[default]
    InProgress,
    Completed,
    Amended,
    EnteredInError,
    Stopped,
}

/// One item of a response; groups nest `item`, questions carry `answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseItem {
    pub link_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer: Vec<ResponseAnswer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<ResponseItem>,
}

impl ResponseItem {
    pub fn new(link_id: impl Into<String>) -> Self {
        Self {
            link_id: link_id.into(),
            definition: None,
            text: None,
            answer: Vec::new(),
            item: Vec::new(),
        }
    }
}

/// One answer of a response item, with items nested under the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseAnswer {
    #[serde(flatten)]
    pub value: AnswerValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<ResponseItem>,
}
