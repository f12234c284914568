//! Serialization of the node tree into a `QuestionnaireResponse`.

use std::sync::Arc;

use serde_json::Value;

use crate::definition::ItemDefinition;
use crate::error::FormError;
use crate::model::{QuestionnaireResponse, ResponseAnswer, ResponseItem};
use crate::store::{FormStore, NodeBody, NodeId};

/// What a serialization pass is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// The public response: disabled nodes are left out unless configured.
    Response,
    /// Expression input: every stored answer, enablement ignored.
    Snapshot,
}

impl FormStore {
    /// The current state as a `QuestionnaireResponse`.
    ///
    /// Empty groups and unanswered questions are omitted. Items hidden by
    /// the `questionnaire-hidden` extension still serialize their answers.
    pub fn response(&self) -> QuestionnaireResponse {
        let mut response = self.header_response();
        response.item = self.serialize_nodes(&self.roots, Pass::Response);
        response
    }

    pub fn response_json(&self) -> Result<Value, FormError> {
        Ok(serde_json::to_value(self.response())?)
    }

    /// `Questionnaire.url`, else a local `Questionnaire/<id>` reference.
    pub fn questionnaire_reference(&self) -> Option<String> {
        self.questionnaire.url.clone().or_else(|| {
            self.questionnaire
                .id
                .as_ref()
                .map(|id| format!("Questionnaire/{id}"))
        })
    }

    fn header_response(&self) -> QuestionnaireResponse {
        let mut response = self.header.clone();
        if let Some(reference) = self.questionnaire_reference() {
            response.questionnaire = Some(reference);
        }
        response.status = self.status;
        response
    }

    /// `%resource` for expressions; rebuilt once per revision.
    pub(crate) fn snapshot(&self) -> Arc<Value> {
        let memo = self.memo();
        if let Some(snapshot) = memo.snapshot.borrow().as_ref() {
            return Arc::clone(snapshot);
        }
        let mut response = self.header_response();
        response.item = self.serialize_nodes(&self.roots, Pass::Snapshot);
        let snapshot = Arc::new(serde_json::to_value(&response).unwrap_or(Value::Null));
        *memo.snapshot.borrow_mut() = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// `%context` for an expression evaluated on `id`: the node's own
    /// response item, or every instance for a repeating group.
    pub(crate) fn context_json(&self, id: NodeId) -> Value {
        let Some(data) = self.node_data(id) else {
            return Value::Null;
        };
        let items = match &data.body {
            NodeBody::GroupList { instances } => self.serialize_nodes(instances, Pass::Snapshot),
            _ => {
                let item = self
                    .serialize_node(id, Pass::Snapshot)
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| item_header(self.def(data.def)));
                return serde_json::to_value(item).unwrap_or(Value::Null);
            }
        };
        serde_json::to_value(items).unwrap_or(Value::Null)
    }

    /// Whether `id` or an ancestor carries the `questionnaire-hidden`
    /// extension. Such items keep their data whatever their enablement.
    fn under_hidden_item(&self, id: NodeId) -> bool {
        self.ancestors(id)
            .into_iter()
            .filter_map(|node| self.definition_of(node))
            .any(|definition| definition.hidden)
    }

    fn serialize_nodes(&self, ids: &[NodeId], pass: Pass) -> Vec<ResponseItem> {
        ids.iter()
            .flat_map(|id| self.serialize_node(*id, pass))
            .collect()
    }

    fn serialize_node(&self, id: NodeId, pass: Pass) -> Vec<ResponseItem> {
        let Some(data) = self.node_data(id) else {
            return Vec::new();
        };
        let definition = self.def(data.def);
        if pass == Pass::Response
            && !self.options.include_disabled_in_response
            && !self.under_hidden_item(id)
            && !self.is_enabled(id)
        {
            return Vec::new();
        }
        match &data.body {
            NodeBody::Display => Vec::new(),
            NodeBody::GroupList { instances } => self.serialize_nodes(instances, pass),
            NodeBody::Group { children } => {
                let items = self.serialize_nodes(children, pass);
                if items.is_empty() {
                    return Vec::new();
                }
                vec![ResponseItem {
                    item: items,
                    ..item_header(definition)
                }]
            }
            NodeBody::Question { answers } => {
                let answers: Vec<ResponseAnswer> = answers
                    .iter()
                    .filter_map(|answer| self.answer_data(*answer))
                    .filter_map(|answer| {
                        Some(ResponseAnswer {
                            value: answer.value.clone()?,
                            item: self.serialize_nodes(&answer.children, pass),
                        })
                    })
                    .collect();
                if answers.is_empty() {
                    return Vec::new();
                }
                vec![ResponseItem {
                    answer: answers,
                    ..item_header(definition)
                }]
            }
        }
    }
}

fn item_header(definition: &ItemDefinition) -> ResponseItem {
    ResponseItem {
        definition: definition.item.definition.clone(),
        text: definition.item.text.clone(),
        ..ResponseItem::new(definition.link_id())
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{AnswerValue, ResponseStatus};
    use crate::options::FormOptions;
    use crate::store::FormStore;
    use serde_json::json;

    fn questionnaire() -> serde_json::Value {
        json!({
            "resourceType": "Questionnaire",
            "id": "intake",
            "item": [
                { "linkId": "consent", "text": "Consent given?", "type": "boolean" },
                {
                    "linkId": "details",
                    "type": "group",
                    "item": [{ "linkId": "details.name", "text": "Name", "type": "string" }]
                },
                {
                    "linkId": "reason",
                    "type": "string",
                    "enableWhen": [{ "question": "consent", "operator": "=", "answerBoolean": false }]
                }
            ]
        })
    }

    #[test]
    fn omits_unanswered_items_and_empty_groups() {
        let form = FormStore::from_json(&questionnaire(), None).expect("form");
        assert_eq!(
            form.response_json().expect("json"),
            json!({
                "resourceType": "QuestionnaireResponse",
                "questionnaire": "Questionnaire/intake",
                "status": "in-progress"
            })
        );
    }

    #[test]
    fn disabled_answers_are_kept_but_not_serialized_by_default() {
        let response = json!({
            "resourceType": "QuestionnaireResponse",
            "status": "in-progress",
            "item": [
                { "linkId": "consent", "answer": [{ "valueBoolean": true }] },
                { "linkId": "reason", "answer": [{ "valueString": "n/a" }] }
            ]
        });
        let form = FormStore::from_json(&questionnaire(), Some(&response)).expect("form");
        let items = form.response().item;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link_id, "consent");

        let options = FormOptions {
            include_disabled_in_response: true,
            ..FormOptions::default()
        };
        let form = FormStore::from_json_with_options(&questionnaire(), Some(&response), options)
            .expect("form");
        assert_eq!(form.response().item.len(), 2);
    }

    #[test]
    fn carries_metadata_and_status() {
        let response = json!({
            "resourceType": "QuestionnaireResponse",
            "id": "qr-1",
            "subject": { "reference": "Patient/p1" },
            "authored": "2024-05-01T10:00:00Z",
            "status": "in-progress"
        });
        let mut form = FormStore::from_json(&questionnaire(), Some(&response)).expect("form");
        let consent = form.first_answer("consent").expect("consent");
        form.set_value_by_user(consent, Some(AnswerValue::Boolean(true)))
            .expect("set");
        form.set_status(ResponseStatus::Completed);

        let json = form.response_json().expect("json");
        assert_eq!(json["id"], "qr-1");
        assert_eq!(json["subject"]["reference"], "Patient/p1");
        assert_eq!(json["status"], "completed");
        assert_eq!(
            json["item"],
            json!([{ "linkId": "consent", "text": "Consent given?", "answer": [{ "valueBoolean": true }] }])
        );
    }

    #[test]
    fn status_changes_reach_the_expression_snapshot() {
        let mut form = FormStore::from_json(&questionnaire(), None).expect("form");
        assert_eq!(form.snapshot()["status"], "in-progress");
        form.set_status(ResponseStatus::Completed);
        assert_eq!(form.snapshot()["status"], "completed");
    }

    #[test]
    fn response_is_stable_without_mutation() {
        let form = FormStore::from_json(&questionnaire(), None).expect("form");
        assert_eq!(form.response(), form.response());
    }
}
