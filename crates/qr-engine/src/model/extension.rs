use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::value::AnswerValue;

pub const HIDDEN: &str = "http://hl7.org/fhir/StructureDefinition/questionnaire-hidden";
pub const MIN_VALUE: &str = "http://hl7.org/fhir/StructureDefinition/minValue";
pub const MAX_VALUE: &str = "http://hl7.org/fhir/StructureDefinition/maxValue";
pub const MIN_LENGTH: &str = "http://hl7.org/fhir/StructureDefinition/minLength";
pub const REGEX: &str = "http://hl7.org/fhir/StructureDefinition/regex";
pub const MIN_OCCURS: &str = "http://hl7.org/fhir/StructureDefinition/questionnaire-minOccurs";
pub const MAX_OCCURS: &str = "http://hl7.org/fhir/StructureDefinition/questionnaire-maxOccurs";
pub const VARIABLE: &str = "http://hl7.org/fhir/StructureDefinition/variable";
pub const CQF_EXPRESSION: &str = "http://hl7.org/fhir/StructureDefinition/cqf-expression";
pub const CQF_CALCULATED_VALUE: &str =
    "http://hl7.org/fhir/StructureDefinition/cqf-calculatedValue";
pub const CALCULATED_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-calculatedExpression";
pub const ENABLE_WHEN_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-enableWhenExpression";
pub const INITIAL_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-initialExpression";

/// A FHIR extension. The `value[x]` choice and any `_value[x]` primitive
/// extension are kept as raw fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Extension {
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

/// A FHIR `Expression` datatype as carried by `valueExpression`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpressionValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl Extension {
    pub fn value_boolean(&self) -> Option<bool> {
        self.value.get("valueBoolean").and_then(Value::as_bool)
    }

    pub fn value_integer(&self) -> Option<i64> {
        self.value.get("valueInteger").and_then(Value::as_i64)
    }

    pub fn value_string(&self) -> Option<&str> {
        self.value.get("valueString").and_then(Value::as_str)
    }

    pub fn value_expression(&self) -> Option<ExpressionValue> {
        self.value
            .get("valueExpression")
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }

    /// The literal `value[x]` of this extension as an answer value.
    pub fn answer(&self) -> Option<AnswerValue> {
        AnswerValue::from_prefixed("value", &self.value)
    }

    /// An expression attached to the primitive `_value[x]` of this extension
    /// through `cqf-calculatedValue` or `cqf-expression`.
    pub fn calculated_value(&self) -> Option<String> {
        self.value
            .iter()
            .filter(|(key, _)| key.starts_with("_value"))
            .filter_map(|(_, raw)| raw.get("extension")?.as_array())
            .flatten()
            .filter_map(|raw| serde_json::from_value::<Extension>(raw.clone()).ok())
            .find_map(|nested| match nested.url.as_str() {
                CQF_CALCULATED_VALUE => nested.value_string().map(str::to_string),
                CQF_EXPRESSION => nested.value_expression()?.expression,
                _ => None,
            })
    }
}

/// Lookup helpers over an `extension` list.
pub trait ExtensionList {
    fn find_extension(&self, url: &str) -> Option<&Extension>;
    fn extensions<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Extension> + 'a;
}

impl ExtensionList for [Extension] {
    fn find_extension(&self, url: &str) -> Option<&Extension> {
        self.iter().find(|extension| extension.url == url)
    }

    fn extensions<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Extension> + 'a {
        self.iter().filter(move |extension| extension.url == url)
    }
}
