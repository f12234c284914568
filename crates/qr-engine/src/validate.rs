use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::definition::{Bound, ItemDefinition};
use crate::model::{AnswerConstraint, AnswerValue, ItemType};
use crate::store::{AnswerId, FormStore, NodeBody, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
}

/// FHIR `OperationOutcome.issue.code` values used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    Required,
    Structure,
    Value,
    TooLong,
    CodeInvalid,
    Invariant,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::Required => "required",
            IssueCode::Structure => "structure",
            IssueCode::Value => "value",
            IssueCode::TooLong => "too-long",
            IssueCode::CodeInvalid => "code-invalid",
            IssueCode::Invariant => "invariant",
        }
    }
}

/// One validation finding, attached to a question or one of its answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub link_id: String,
    pub severity: IssueSeverity,
    pub code: IssueCode,
    pub diagnostics: String,
}

impl Issue {
    fn error(link_id: &str, code: IssueCode, diagnostics: impl Into<String>) -> Self {
        Self {
            link_id: link_id.to_string(),
            severity: IssueSeverity::Error,
            code,
            diagnostics: diagnostics.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.link_id, self.diagnostics)
    }
}

impl FormStore {
    /// Issues of one node: its own (required, occurrence counts) followed by
    /// those of each of its answers.
    pub(crate) fn node_issues(&self, id: NodeId) -> Vec<Issue> {
        let Some(node) = self.node_data(id) else {
            return Vec::new();
        };
        if !self.options.validate_disabled && !self.is_enabled(id) {
            return Vec::new();
        }
        let definition = self.def(node.def);
        let link_id = definition.link_id();
        let mut issues = Vec::new();

        match &node.body {
            NodeBody::Question { answers } => {
                let answered = self.stored_values(id).len();
                let revealed = self.validation_requested
                    || answers
                        .iter()
                        .filter_map(|answer| self.answer_data(*answer))
                        .any(|answer| answer.touched);
                if definition.item.required && answered == 0 && revealed {
                    issues.push(Issue::error(link_id, IssueCode::Required, "An answer is required"));
                }
                if definition.item.repeats {
                    issues.extend(occurrence_issues(definition, answered, revealed, "answers"));
                }
                for answer in answers {
                    issues.extend(self.answer_issues(*answer));
                }
            }
            NodeBody::GroupList { instances } => {
                let filled = instances
                    .iter()
                    .filter(|instance| self.holds_answers(**instance))
                    .count();
                issues.extend(occurrence_issues(
                    definition,
                    filled,
                    self.validation_requested,
                    "entries",
                ));
            }
            NodeBody::Group { .. } => {
                if definition.item.required
                    && self.validation_requested
                    && !self.holds_answers(id)
                {
                    issues.push(Issue::error(
                        link_id,
                        IssueCode::Required,
                        "At least one item in this group must be answered",
                    ));
                }
            }
            NodeBody::Display => {}
        }
        issues
    }

    /// Issues of one answer value against the item's constraints.
    pub(crate) fn answer_issues(&self, id: AnswerId) -> Vec<Issue> {
        let Some(answer) = self.answer_data(id) else {
            return Vec::new();
        };
        let Some(value) = &answer.value else {
            return Vec::new();
        };
        let Some(definition) = self.definition_of(answer.question) else {
            return Vec::new();
        };
        if !self.options.validate_disabled && !self.is_enabled(answer.question) {
            return Vec::new();
        }
        let link_id = definition.link_id();
        let kind = definition.item.kind;

        if !value.fits(kind) {
            return vec![Issue::error(
                link_id,
                IssueCode::Structure,
                format!("Expected a {kind} answer but found {}", value.suffix()),
            )];
        }

        let mut issues = Vec::new();
        if let Some(text) = text_of(value) {
            let length = text.chars().count();
            if let Some(max) = definition.item.max_length
                && length > max
            {
                issues.push(Issue::error(
                    link_id,
                    IssueCode::TooLong,
                    format!("Must be at most {max} characters"),
                ));
            }
            if let Some(min) = definition.min_length
                && length < min
            {
                issues.push(Issue::error(
                    link_id,
                    IssueCode::Value,
                    format!("Must be at least {min} characters"),
                ));
            }
            if let Some(pattern) = &definition.pattern
                && !pattern.regex.is_match(text)
            {
                issues.push(Issue::error(
                    link_id,
                    IssueCode::Invariant,
                    format!("Value does not match the pattern {}", pattern.source),
                ));
            }
        }

        if let Some(bound) = &definition.min_value
            && let Some(min) = self.resolve_bound(answer.question, definition, bound)
            && value.compare(&min) == Some(Ordering::Less)
        {
            issues.push(Issue::error(
                link_id,
                IssueCode::Value,
                format!("Value must be greater than or equal to {min}"),
            ));
        }
        if let Some(bound) = &definition.max_value
            && let Some(max) = self.resolve_bound(answer.question, definition, bound)
            && value.compare(&max) == Some(Ordering::Greater)
        {
            issues.push(Issue::error(
                link_id,
                IssueCode::Value,
                format!("Value must be less than or equal to {max}"),
            ));
        }

        if !definition.options.is_empty()
            && restricted_to_options(definition)
            && !definition.options.iter().any(|option| option.equals(value))
        {
            issues.push(Issue::error(
                link_id,
                IssueCode::CodeInvalid,
                format!("{value} is not one of the permitted options"),
            ));
        }
        issues
    }

    fn resolve_bound(
        &self,
        question: NodeId,
        definition: &ItemDefinition,
        bound: &Bound,
    ) -> Option<AnswerValue> {
        match bound {
            Bound::Fixed(value) => Some(value.clone()),
            Bound::Calculated(expression) => match self.evaluate_for(question, expression) {
                Ok(result) => result
                    .first()
                    .and_then(|raw| bound_value(definition.item.kind, raw)),
                Err(error) => {
                    tracing::warn!(
                        link_id = definition.link_id(),
                        expression = expression.source(),
                        %error,
                        "calculated bound failed; skipping the check"
                    );
                    None
                }
            },
        }
    }

    /// Whether any question at or below `id` stores a value.
    fn holds_answers(&self, id: NodeId) -> bool {
        !self.stored_values(id).is_empty()
            || self
                .child_ids(id)
                .into_iter()
                .any(|child| self.holds_answers(child))
    }
}

fn occurrence_issues(
    definition: &ItemDefinition,
    count: usize,
    revealed: bool,
    noun: &str,
) -> Vec<Issue> {
    let link_id = definition.link_id();
    let mut issues = Vec::new();
    if let Some(min) = definition.min_occurs
        && revealed
        && count < min
    {
        issues.push(Issue::error(
            link_id,
            IssueCode::Required,
            format!("At least {min} {noun} are required"),
        ));
    }
    if let Some(max) = definition.max_occurs
        && count > max
    {
        issues.push(Issue::error(
            link_id,
            IssueCode::Value,
            format!("At most {max} {noun} are allowed"),
        ));
    }
    issues
}

fn text_of(value: &AnswerValue) -> Option<&str> {
    match value {
        AnswerValue::String(text) | AnswerValue::Uri(text) => Some(text),
        _ => None,
    }
}

fn restricted_to_options(definition: &ItemDefinition) -> bool {
    definition.item.kind != ItemType::OpenChoice
        && definition.item.answer_constraint.unwrap_or_default() == AnswerConstraint::OptionsOnly
}

/// Numbers keep their own shape so a fractional bound on an integer item
/// still applies; anything else is read as the item's type.
fn bound_value(kind: ItemType, raw: &Value) -> Option<AnswerValue> {
    match raw {
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Some(AnswerValue::Integer(integer)),
            None => Some(AnswerValue::Decimal(number.clone())),
        },
        other => AnswerValue::from_json_for(kind, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::FormOptions;
    use serde_json::json;

    fn form(item: Value) -> FormStore {
        FormStore::from_json(&json!({ "item": [item] }), None).expect("form")
    }

    fn set(form: &mut FormStore, link_id: &str, value: AnswerValue) -> Vec<Issue> {
        let answer = form.first_answer(link_id).expect("answer");
        form.set_value_by_user(answer, Some(value)).expect("set");
        form.answer(answer).expect("answer").issues()
    }

    #[test]
    fn literal_bounds_report_the_bound() {
        let mut form = form(json!({
            "linkId": "age",
            "type": "integer",
            "extension": [
                { "url": "http://hl7.org/fhir/StructureDefinition/minValue", "valueInteger": 18 },
                { "url": "http://hl7.org/fhir/StructureDefinition/maxValue", "valueInteger": 65 }
            ]
        }));
        let issues = set(&mut form, "age", AnswerValue::Integer(12));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].diagnostics.contains("18"));
        let issues = set(&mut form, "age", AnswerValue::Integer(70));
        assert!(issues[0].diagnostics.contains("65"));
        assert!(set(&mut form, "age", AnswerValue::Integer(40)).is_empty());
    }

    #[test]
    fn date_bounds_compare_temporally() {
        let mut form = form(json!({
            "linkId": "onset",
            "type": "date",
            "extension": [
                { "url": "http://hl7.org/fhir/StructureDefinition/maxValue", "valueDate": "2024-12-31" }
            ]
        }));
        let issues = set(&mut form, "onset", AnswerValue::Date("2025-01-02".into()));
        assert!(issues[0].diagnostics.contains("2024-12-31"));
        assert!(set(&mut form, "onset", AnswerValue::Date("2024-06-01".into())).is_empty());
    }

    #[test]
    fn text_constraints() {
        let mut form = form(json!({
            "linkId": "code",
            "type": "string",
            "maxLength": 5,
            "extension": [
                { "url": "http://hl7.org/fhir/StructureDefinition/minLength", "valueInteger": 2 },
                { "url": "http://hl7.org/fhir/StructureDefinition/regex", "valueString": "[a-z]+" }
            ]
        }));
        let codes: Vec<IssueCode> = set(&mut form, "code", AnswerValue::String("abcdef1".into()))
            .into_iter()
            .map(|issue| issue.code)
            .collect();
        assert_eq!(codes, vec![IssueCode::TooLong, IssueCode::Invariant]);
        let codes: Vec<IssueCode> = set(&mut form, "code", AnswerValue::String("a".into()))
            .into_iter()
            .map(|issue| issue.code)
            .collect();
        assert_eq!(codes, vec![IssueCode::Value]);
        assert!(set(&mut form, "code", AnswerValue::String("abc".into())).is_empty());
    }

    #[test]
    fn options_only_rejects_unlisted_values() {
        let mut form = form(json!({
            "linkId": "size",
            "type": "choice",
            "answerOption": [{ "valueString": "S" }, { "valueString": "M" }]
        }));
        let issues = set(&mut form, "size", AnswerValue::String("XL".into()));
        assert_eq!(issues[0].code, IssueCode::CodeInvalid);
        assert!(set(&mut form, "size", AnswerValue::String("M".into())).is_empty());
    }

    #[test]
    fn open_choice_accepts_free_text() {
        let mut form = form(json!({
            "linkId": "size",
            "type": "open-choice",
            "answerOption": [{ "valueString": "S" }]
        }));
        assert!(set(&mut form, "size", AnswerValue::String("XL".into())).is_empty());
    }

    #[test]
    fn required_is_reported_after_touch_or_validate_all() {
        let mut form = form(json!({ "linkId": "name", "type": "string", "required": true }));
        let node = form.find("name").expect("name").id();
        assert!(form.node(node).expect("node").issues().is_empty());

        assert!(!form.validate_all());
        let issues = form.node(node).expect("node").issues();
        assert_eq!(issues[0].code, IssueCode::Required);

        set(&mut form, "name", AnswerValue::String("Ada".into()));
        assert!(form.validate_all());
    }

    #[test]
    fn clearing_a_required_answer_reveals_the_issue() {
        let mut form = form(json!({ "linkId": "name", "type": "string", "required": true }));
        let answer = form.first_answer("name").expect("answer");
        form.set_value_by_user(answer, None).expect("clear");
        assert_eq!(form.issues().len(), 1);
    }

    #[test]
    fn occurrence_limits_on_repeating_questions() {
        let mut form = form(json!({
            "linkId": "phone",
            "type": "string",
            "repeats": true,
            "extension": [
                { "url": "http://hl7.org/fhir/StructureDefinition/questionnaire-minOccurs", "valueInteger": 2 },
                { "url": "http://hl7.org/fhir/StructureDefinition/questionnaire-maxOccurs", "valueInteger": 2 }
            ]
        }));
        set(&mut form, "phone", AnswerValue::String("1".into()));
        let question = form.find("phone").expect("phone").id();
        assert!(form.issues()[0].diagnostics.contains("At least 2"));

        for number in ["2", "3"] {
            let answer = form.add_answer(question).expect("add");
            form.set_value_by_user(answer, Some(AnswerValue::String(number.into())))
                .expect("set");
        }
        assert!(form.issues()[0].diagnostics.contains("At most 2"));
    }

    #[test]
    fn disabled_nodes_are_skipped_unless_configured() {
        let questionnaire = json!({
            "item": [
                { "linkId": "gate", "type": "boolean" },
                {
                    "linkId": "detail",
                    "type": "string",
                    "required": true,
                    "enableWhen": [{ "question": "gate", "operator": "=", "answerBoolean": true }]
                }
            ]
        });
        let mut form = FormStore::from_json(&questionnaire, None).expect("form");
        assert!(form.validate_all());

        let options = FormOptions {
            validate_disabled: true,
            ..FormOptions::default()
        };
        let mut form =
            FormStore::from_json_with_options(&questionnaire, None, options).expect("form");
        assert!(!form.validate_all());
    }

    #[test]
    fn required_group_needs_one_answer() {
        let mut form = form(json!({
            "linkId": "contact",
            "type": "group",
            "required": true,
            "item": [{ "linkId": "contact.email", "type": "string" }]
        }));
        assert!(!form.validate_all());
        set(&mut form, "contact.email", AnswerValue::String("a@b.c".into()));
        assert!(form.validate_all());
    }
}
