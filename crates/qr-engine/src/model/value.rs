use std::cmp::Ordering;
use std::fmt;

use schemars::JsonSchema;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::model::ItemType;

/// A coded value (`Coding`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Codings match on system and code; the system is ignored when either
    /// side does not carry one.
    pub fn matches(&self, other: &Coding) -> bool {
        if self.code != other.code {
            return false;
        }
        match (&self.system, &other.system) {
            (Some(system), Some(other_system)) => system == other_system,
            _ => true,
        }
    }
}

/// A measured amount (`Quantity`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Quantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A reference to another resource (`Reference`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// One answer value, the `value[x]` choice of a response answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Boolean(bool),
    /// Kept as the JSON number it was given so seeded values serialize back
    /// unchanged (`70` stays `70`, not `70.0`).
    Decimal(Number),
    Integer(i64),
    Date(String),
    DateTime(String),
    Time(String),
    String(String),
    Uri(String),
    Coding(Coding),
    Quantity(Quantity),
    Reference(Reference),
    Attachment(Value),
}

const SUFFIXES: [&str; 12] = [
    "Boolean",
    "Decimal",
    "Integer",
    "Date",
    "DateTime",
    "Time",
    "String",
    "Uri",
    "Coding",
    "Quantity",
    "Reference",
    "Attachment",
];

impl AnswerValue {
    /// Type suffix used in `value[x]` style keys.
    pub fn suffix(&self) -> &'static str {
        match self {
            AnswerValue::Boolean(_) => "Boolean",
            AnswerValue::Decimal(_) => "Decimal",
            AnswerValue::Integer(_) => "Integer",
            AnswerValue::Date(_) => "Date",
            AnswerValue::DateTime(_) => "DateTime",
            AnswerValue::Time(_) => "Time",
            AnswerValue::String(_) => "String",
            AnswerValue::Uri(_) => "Uri",
            AnswerValue::Coding(_) => "Coding",
            AnswerValue::Quantity(_) => "Quantity",
            AnswerValue::Reference(_) => "Reference",
            AnswerValue::Attachment(_) => "Attachment",
        }
    }

    /// Decodes the first `<prefix><Type>` entry of a FHIR element, e.g.
    /// `answerBoolean` for prefix `answer`.
    pub fn from_prefixed(prefix: &str, fields: &Map<String, Value>) -> Option<AnswerValue> {
        SUFFIXES.iter().find_map(|suffix| {
            let raw = fields.get(&format!("{prefix}{suffix}"))?;
            Self::decode(suffix, raw)
        })
    }

    fn decode(suffix: &str, raw: &Value) -> Option<AnswerValue> {
        let value = match suffix {
            "Boolean" => AnswerValue::Boolean(raw.as_bool()?),
            "Decimal" => AnswerValue::Decimal(raw.as_number()?.clone()),
            "Integer" => AnswerValue::Integer(raw.as_i64()?),
            "Date" => AnswerValue::Date(raw.as_str()?.to_string()),
            "DateTime" => AnswerValue::DateTime(raw.as_str()?.to_string()),
            "Time" => AnswerValue::Time(raw.as_str()?.to_string()),
            "String" => AnswerValue::String(raw.as_str()?.to_string()),
            "Uri" => AnswerValue::Uri(raw.as_str()?.to_string()),
            "Coding" => AnswerValue::Coding(serde_json::from_value(raw.clone()).ok()?),
            "Quantity" => AnswerValue::Quantity(serde_json::from_value(raw.clone()).ok()?),
            "Reference" => AnswerValue::Reference(serde_json::from_value(raw.clone()).ok()?),
            "Attachment" => AnswerValue::Attachment(raw.clone()),
            _ => return None,
        };
        Some(value)
    }

    /// The bare JSON payload of this value, without the `value[x]` key.
    pub fn to_json(&self) -> Value {
        match self {
            AnswerValue::Boolean(flag) => Value::Bool(*flag),
            AnswerValue::Decimal(number) => Value::Number(number.clone()),
            AnswerValue::Integer(number) => Value::from(*number),
            AnswerValue::Date(text)
            | AnswerValue::DateTime(text)
            | AnswerValue::Time(text)
            | AnswerValue::String(text)
            | AnswerValue::Uri(text) => Value::String(text.clone()),
            AnswerValue::Coding(coding) => serde_json::to_value(coding).unwrap_or(Value::Null),
            AnswerValue::Quantity(quantity) => {
                serde_json::to_value(quantity).unwrap_or(Value::Null)
            }
            AnswerValue::Reference(reference) => {
                serde_json::to_value(reference).unwrap_or(Value::Null)
            }
            AnswerValue::Attachment(attachment) => attachment.clone(),
        }
    }

    /// Interprets a JSON value produced by an expression as an answer for an
    /// item of the given type.
    pub fn from_json_for(kind: ItemType, raw: &Value) -> Option<AnswerValue> {
        match kind {
            ItemType::Boolean => raw.as_bool().map(AnswerValue::Boolean),
            ItemType::Integer => match raw.as_i64() {
                Some(number) => Some(AnswerValue::Integer(number)),
                None => raw
                    .as_f64()
                    .filter(|number| number.fract() == 0.0)
                    .map(|number| AnswerValue::Integer(number as i64)),
            },
            ItemType::Decimal => match raw {
                Value::Number(number) => Some(AnswerValue::Decimal(number.clone())),
                Value::String(text) => serde_json::from_str::<Number>(text.trim())
                    .ok()
                    .map(AnswerValue::Decimal),
                _ => None,
            },
            ItemType::Date => raw.as_str().map(|text| AnswerValue::Date(text.into())),
            ItemType::DateTime => raw.as_str().map(|text| AnswerValue::DateTime(text.into())),
            ItemType::Time => raw.as_str().map(|text| AnswerValue::Time(text.into())),
            ItemType::String | ItemType::Text => match raw {
                Value::String(text) => Some(AnswerValue::String(text.clone())),
                Value::Number(number) => Some(AnswerValue::String(number.to_string())),
                Value::Bool(flag) => Some(AnswerValue::String(flag.to_string())),
                _ => None,
            },
            ItemType::Url => raw.as_str().map(|text| AnswerValue::Uri(text.into())),
            ItemType::Coding | ItemType::Choice | ItemType::OpenChoice => {
                serde_json::from_value(raw.clone()).ok().map(AnswerValue::Coding)
            }
            ItemType::Quantity => match raw {
                Value::Number(number) => Some(AnswerValue::Quantity(Quantity {
                    value: number.as_f64(),
                    ..Quantity::default()
                })),
                other => serde_json::from_value(other.clone())
                    .ok()
                    .map(AnswerValue::Quantity),
            },
            ItemType::Reference => serde_json::from_value(raw.clone())
                .ok()
                .map(AnswerValue::Reference),
            ItemType::Attachment => Some(AnswerValue::Attachment(raw.clone())),
            ItemType::Group | ItemType::Display | ItemType::Question => None,
        }
    }

    /// Whether this value may be stored on an item of the given type.
    pub fn fits(&self, kind: ItemType) -> bool {
        match (kind, self) {
            (ItemType::Boolean, AnswerValue::Boolean(_)) => true,
            (ItemType::Decimal, AnswerValue::Decimal(_) | AnswerValue::Integer(_)) => true,
            (ItemType::Integer, AnswerValue::Integer(_)) => true,
            (ItemType::Date, AnswerValue::Date(_)) => true,
            (ItemType::DateTime, AnswerValue::DateTime(_) | AnswerValue::Date(_)) => true,
            (ItemType::Time, AnswerValue::Time(_)) => true,
            (ItemType::String | ItemType::Text, AnswerValue::String(_)) => true,
            (ItemType::Url, AnswerValue::Uri(_)) => true,
            (ItemType::Coding, AnswerValue::Coding(_)) => true,
            (
                ItemType::Choice | ItemType::OpenChoice,
                AnswerValue::Coding(_)
                | AnswerValue::String(_)
                | AnswerValue::Integer(_)
                | AnswerValue::Date(_)
                | AnswerValue::Time(_),
            ) => true,
            (ItemType::Quantity, AnswerValue::Quantity(_)) => true,
            (ItemType::Reference, AnswerValue::Reference(_)) => true,
            (ItemType::Attachment, AnswerValue::Attachment(_)) => true,
            _ => false,
        }
    }

    /// Widens the value to the representation the item type stores.
    pub fn coerce(self, kind: ItemType) -> AnswerValue {
        match (kind, self) {
            (ItemType::Decimal, AnswerValue::Integer(number)) => {
                AnswerValue::Decimal(Number::from(number))
            }
            (_, value) => value,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnswerValue::Decimal(number) => number.as_f64(),
            AnswerValue::Integer(number) => Some(*number as f64),
            AnswerValue::Quantity(quantity) => quantity.value,
            _ => None,
        }
    }

    /// A decimal answer from a float; `None` for NaN and infinities.
    pub fn decimal(number: f64) -> Option<AnswerValue> {
        Number::from_f64(number).map(AnswerValue::Decimal)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnswerValue::Date(text)
            | AnswerValue::DateTime(text)
            | AnswerValue::Time(text)
            | AnswerValue::String(text)
            | AnswerValue::Uri(text) => Some(text),
            _ => None,
        }
    }

    /// FHIR equality used by `enableWhen` and option matching.
    pub fn equals(&self, other: &AnswerValue) -> bool {
        match (self, other) {
            (AnswerValue::Coding(left), AnswerValue::Coding(right)) => left.matches(right),
            (AnswerValue::Quantity(left), AnswerValue::Quantity(right)) => {
                left.value == right.value && units_agree(left, right)
            }
            (AnswerValue::Integer(_) | AnswerValue::Decimal(_), _)
            | (_, AnswerValue::Integer(_) | AnswerValue::Decimal(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(left), Some(right)) => left == right,
                    _ => false,
                }
            }
            _ => match (self.as_str(), other.as_str()) {
                (Some(left), Some(right)) => left == right,
                _ => self == other,
            },
        }
    }

    /// Ordering for comparable values; `None` when the two cannot be ordered.
    pub fn compare(&self, other: &AnswerValue) -> Option<Ordering> {
        match (self, other) {
            (AnswerValue::Quantity(left), AnswerValue::Quantity(right)) => {
                if !units_agree(left, right) {
                    return None;
                }
                left.value?.partial_cmp(&right.value?)
            }
            (
                AnswerValue::Integer(_) | AnswerValue::Decimal(_),
                AnswerValue::Integer(_) | AnswerValue::Decimal(_),
            ) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            (AnswerValue::Date(left), AnswerValue::Date(right))
            | (AnswerValue::DateTime(left), AnswerValue::DateTime(right))
            | (AnswerValue::Date(left), AnswerValue::DateTime(right))
            | (AnswerValue::DateTime(left), AnswerValue::Date(right))
            | (AnswerValue::Time(left), AnswerValue::Time(right)) => {
                compare_temporal(left, right)
            }
            (AnswerValue::String(left), AnswerValue::String(right)) => Some(left.cmp(right)),
            _ => None,
        }
    }
}

fn units_agree(left: &Quantity, right: &Quantity) -> bool {
    match (&left.code, &right.code) {
        (Some(left), Some(right)) => left == right,
        _ => left.unit == right.unit,
    }
}

/// ISO-8601 strings order lexically once both are cut to the shorter
/// precision; a date compared with a date-time only looks at the date part.
fn compare_temporal(left: &str, right: &str) -> Option<Ordering> {
    let width = left.len().min(right.len());
    let left = left.get(..width)?;
    let right = right.get(..width)?;
    Some(left.cmp(right))
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Boolean(flag) => write!(f, "{flag}"),
            AnswerValue::Decimal(number) => match number.as_f64() {
                Some(float) => write!(f, "{float}"),
                None => write!(f, "{number}"),
            },
            AnswerValue::Integer(number) => write!(f, "{number}"),
            AnswerValue::Date(text)
            | AnswerValue::DateTime(text)
            | AnswerValue::Time(text)
            | AnswerValue::String(text)
            | AnswerValue::Uri(text) => f.write_str(text),
            AnswerValue::Coding(coding) => {
                let label = coding
                    .display
                    .as_deref()
                    .or(coding.code.as_deref())
                    .unwrap_or_default();
                f.write_str(label)
            }
            AnswerValue::Quantity(quantity) => {
                if let Some(value) = quantity.value {
                    write!(f, "{value}")?;
                }
                if let Some(unit) = quantity.unit.as_deref().or(quantity.code.as_deref()) {
                    write!(f, " {unit}")?;
                }
                Ok(())
            }
            AnswerValue::Reference(reference) => f.write_str(
                reference
                    .display
                    .as_deref()
                    .or(reference.reference.as_deref())
                    .unwrap_or_default(),
            ),
            AnswerValue::Attachment(attachment) => f.write_str(
                attachment
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or("attachment"),
            ),
        }
    }
}

impl Serialize for AnswerValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&format!("value{}", self.suffix()), &self.to_json())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for AnswerValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::deserialize(deserializer)?;
        AnswerValue::from_prefixed("value", &fields)
            .ok_or_else(|| D::Error::custom("answer carries no supported value[x]"))
    }
}
