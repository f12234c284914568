use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::definition::{DefId, Definitions};
use crate::error::FormError;
use crate::model::{AnswerValue, ItemType, Questionnaire, QuestionnaireResponse, ResponseItem};
use crate::options::FormOptions;
use crate::scope::Scope;
use crate::store::{
    AnswerData, AnswerId, FormStore, Memo, NodeBody, NodeData, NodeId, ParentLink,
};

type SeededAnswer<'r> = (Option<AnswerValue>, &'r [ResponseItem]);

impl FormStore {
    pub fn new(questionnaire: Questionnaire, response: Option<QuestionnaireResponse>) -> Self {
        Self::with_options(questionnaire, response, FormOptions::default())
    }

    /// Builds the node tree for `questionnaire`, seeding answers from
    /// `response` where its items match by linkId.
    pub fn with_options(
        questionnaire: Questionnaire,
        response: Option<QuestionnaireResponse>,
        options: FormOptions,
    ) -> Self {
        let definitions = Arc::new(Definitions::compile(&questionnaire));
        let questionnaire_json = serde_json::to_value(&questionnaire).unwrap_or(Value::Null);
        let mut header = response.unwrap_or_default();
        let seed = std::mem::take(&mut header.item);

        let mut form = FormStore {
            questionnaire,
            questionnaire_json: Arc::new(questionnaire_json),
            definitions: Arc::clone(&definitions),
            options,
            nodes: Vec::new(),
            answers: Vec::new(),
            roots: Vec::new(),
            scope: Scope::default(),
            status: header.status,
            header,
            validation_requested: false,
            revision: 0,
            memo: Memo::default(),
        };
        form.roots = form.build_children(definitions.roots(), None, &seed);
        form.apply_initial_expressions();
        form.recalculate();
        tracing::debug!(
            nodes = form.nodes.len(),
            answers = form.answers.len(),
            "built form"
        );
        form
    }

    pub fn from_json(questionnaire: &Value, response: Option<&Value>) -> Result<Self, FormError> {
        Self::from_json_with_options(questionnaire, response, FormOptions::default())
    }

    pub fn from_json_with_options(
        questionnaire: &Value,
        response: Option<&Value>,
        options: FormOptions,
    ) -> Result<Self, FormError> {
        let questionnaire = Questionnaire::deserialize(questionnaire)?;
        let response = response
            .map(QuestionnaireResponse::deserialize)
            .transpose()?;
        Ok(Self::with_options(questionnaire, response, options))
    }

    pub(crate) fn build_children(
        &mut self,
        defs: &[DefId],
        parent: Option<ParentLink>,
        seed: &[ResponseItem],
    ) -> Vec<NodeId> {
        let definitions = Arc::clone(&self.definitions);
        for item in seed {
            if !defs
                .iter()
                .any(|def| definitions.get(*def).link_id() == item.link_id)
            {
                tracing::warn!(
                    link_id = %item.link_id,
                    "dropping response item with no matching questionnaire item"
                );
            }
        }
        defs.iter()
            .map(|def| {
                let link_id = definitions.get(*def).link_id();
                let matching: Vec<&ResponseItem> =
                    seed.iter().filter(|item| item.link_id == link_id).collect();
                self.build_node(*def, parent, &matching)
            })
            .collect()
    }

    fn build_node(
        &mut self,
        def: DefId,
        parent: Option<ParentLink>,
        seed: &[&ResponseItem],
    ) -> NodeId {
        let definitions = Arc::clone(&self.definitions);
        let definition = definitions.get(def);
        match definition.item.kind {
            ItemType::Group if definition.item.repeats => self.build_group_list(def, parent, seed),
            ItemType::Group => {
                if seed.len() > 1 {
                    tracing::warn!(
                        link_id = definition.link_id(),
                        "non-repeating group answered more than once; keeping the first"
                    );
                }
                let children = seed.first().map(|item| item.item.as_slice());
                self.build_group(def, parent, children.unwrap_or_default())
            }
            kind if kind.is_question() => self.build_question(def, parent, seed),
            _ => self.alloc_node(def, parent, NodeBody::Display),
        }
    }

    fn build_group_list(
        &mut self,
        def: DefId,
        parent: Option<ParentLink>,
        seed: &[&ResponseItem],
    ) -> NodeId {
        let list = self.alloc_node(
            def,
            parent,
            NodeBody::GroupList {
                instances: Vec::new(),
            },
        );
        let instance_parent = Some(ParentLink::Node(list));
        let instances = if seed.is_empty() {
            let count = self.def(def).min_occurs.unwrap_or(0).max(1);
            (0..count)
                .map(|_| self.build_group(def, instance_parent, &[]))
                .collect()
        } else {
            seed.iter()
                .map(|item| self.build_group(def, instance_parent, &item.item))
                .collect()
        };
        self.set_body(list, NodeBody::GroupList { instances });
        list
    }

    pub(crate) fn build_group(
        &mut self,
        def: DefId,
        parent: Option<ParentLink>,
        seed: &[ResponseItem],
    ) -> NodeId {
        let group = self.alloc_node(
            def,
            parent,
            NodeBody::Group {
                children: Vec::new(),
            },
        );
        let definitions = Arc::clone(&self.definitions);
        let children =
            self.build_children(&definitions.get(def).children, Some(ParentLink::Node(group)), seed);
        self.set_body(group, NodeBody::Group { children });
        group
    }

    fn build_question(
        &mut self,
        def: DefId,
        parent: Option<ParentLink>,
        seed: &[&ResponseItem],
    ) -> NodeId {
        let definitions = Arc::clone(&self.definitions);
        let definition = definitions.get(def);
        let kind = definition.item.kind;
        let question = self.alloc_node(
            def,
            parent,
            NodeBody::Question {
                answers: Vec::new(),
            },
        );

        if seed.len() > 1 {
            tracing::warn!(
                link_id = definition.link_id(),
                "question answered by several response items; merging their answers"
            );
        }
        let mut seeded: Vec<SeededAnswer<'_>> = seed
            .iter()
            .flat_map(|item| item.answer.iter())
            .map(|answer| (Some(answer.value.clone()), answer.item.as_slice()))
            .collect();
        if seeded.is_empty() {
            seeded = definition
                .initial
                .iter()
                .map(|value| (Some(value.clone()), &[][..]))
                .collect();
        }
        if !definition.item.repeats && seeded.len() > 1 {
            tracing::warn!(
                link_id = definition.link_id(),
                answers = seeded.len(),
                "non-repeating question has several answers; keeping the first"
            );
            seeded.truncate(1);
        }
        if seeded.is_empty() {
            seeded.push((None, &[][..]));
        }

        let mut answers = Vec::with_capacity(seeded.len());
        for (value, children) in seeded {
            let value = value.map(|value| value.coerce(kind));
            if let Some(value) = &value
                && !value.fits(kind)
            {
                tracing::warn!(
                    link_id = definition.link_id(),
                    expected = %kind,
                    found = value.suffix(),
                    "seeded answer does not match the item type"
                );
            }
            answers.push(self.create_answer(def, question, value, children));
        }
        self.set_body(question, NodeBody::Question { answers });
        question
    }

    /// Allocates an answer slot on `question` together with the nested
    /// items its definition declares.
    pub(crate) fn create_answer(
        &mut self,
        def: DefId,
        question: NodeId,
        value: Option<AnswerValue>,
        seed: &[ResponseItem],
    ) -> AnswerId {
        self.answers.push(Some(AnswerData {
            question,
            value,
            touched: false,
            children: Vec::new(),
        }));
        let id = AnswerId(self.answers.len() - 1);
        let definitions = Arc::clone(&self.definitions);
        let children =
            self.build_children(&definitions.get(def).children, Some(ParentLink::Answer(id)), seed);
        if let Some(Some(answer)) = self.answers.get_mut(id.0) {
            answer.children = children;
        }
        id
    }

    fn alloc_node(&mut self, def: DefId, parent: Option<ParentLink>, body: NodeBody) -> NodeId {
        self.nodes.push(Some(NodeData { def, parent, body }));
        let id = NodeId(self.nodes.len() - 1);
        self.scope.register(self.definitions.get(def).link_id(), id);
        id
    }

    fn set_body(&mut self, id: NodeId, body: NodeBody) {
        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            node.body = body;
        }
    }

    /// Frees a node and everything below it, deregistering each from scope.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) {
        let Some(data) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        self.scope
            .deregister(self.definitions.get(data.def).link_id(), id);
        match data.body {
            NodeBody::Group { children: nodes } | NodeBody::GroupList { instances: nodes } => {
                for child in nodes {
                    self.remove_subtree(child);
                }
            }
            NodeBody::Question { answers } => {
                for answer in answers {
                    self.remove_answer_subtree(answer);
                }
            }
            NodeBody::Display => {}
        }
    }

    pub(crate) fn remove_answer_subtree(&mut self, id: AnswerId) {
        let Some(answer) = self.answers.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        for child in answer.children {
            self.remove_subtree(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodeKind;
    use serde_json::json;

    #[test]
    fn repeating_group_without_data_starts_with_min_occurs_instances() {
        let form = FormStore::from_json(
            &json!({
                "resourceType": "Questionnaire",
                "item": [{
                    "linkId": "med",
                    "type": "group",
                    "repeats": true,
                    "extension": [{
                        "url": "http://hl7.org/fhir/StructureDefinition/questionnaire-minOccurs",
                        "valueInteger": 2
                    }],
                    "item": [{ "linkId": "med.name", "type": "string" }]
                }]
            }),
            None,
        )
        .expect("form");
        let list = form.nodes()[0];
        assert_eq!(list.kind(), NodeKind::GroupList);
        assert_eq!(list.children().len(), 2);
        assert_eq!(form.scope().lookup_all("med.name").len(), 2);
    }

    #[test]
    fn unknown_response_items_are_dropped() {
        let form = FormStore::from_json(
            &json!({ "item": [{ "linkId": "a", "type": "string" }] }),
            Some(&json!({
                "resourceType": "QuestionnaireResponse",
                "status": "in-progress",
                "item": [
                    { "linkId": "a", "answer": [{ "valueString": "kept" }] },
                    { "linkId": "zzz", "answer": [{ "valueString": "dropped" }] }
                ]
            })),
        )
        .expect("form");
        assert!(!form.scope().contains("zzz"));
        let answer = form.first_answer("a").expect("answer");
        assert_eq!(
            form.answer(answer).expect("answer").value(),
            Some(&AnswerValue::String("kept".into()))
        );
    }

    #[test]
    fn non_repeating_question_keeps_first_seeded_answer() {
        let form = FormStore::from_json(
            &json!({ "item": [{ "linkId": "a", "type": "integer" }] }),
            Some(&json!({
                "item": [{ "linkId": "a", "answer": [{ "valueInteger": 1 }, { "valueInteger": 2 }] }]
            })),
        )
        .expect("form");
        let question = form.find("a").and_then(|node| node.as_question()).expect("question");
        assert_eq!(question.answers().len(), 1);
    }

    #[test]
    fn initial_values_seed_unanswered_questions() {
        let form = FormStore::from_json(
            &json!({ "item": [{ "linkId": "a", "type": "decimal", "initial": [{ "valueInteger": 3 }] }] }),
            None,
        )
        .expect("form");
        let answer = form.first_answer("a").expect("answer");
        assert_eq!(
            form.answer(answer).expect("answer").value(),
            Some(&AnswerValue::Decimal(3.into()))
        );
    }
}
