//! The node tree of one filled-in questionnaire.
//!
//! Nodes and answers live in two arenas owned by [`FormStore`] and are
//! addressed by [`NodeId`] / [`AnswerId`]. Derived state (enablement, the
//! `%resource` snapshot) is computed on read and memoized until the next
//! mutation bumps the form revision.

mod answer;
mod build;
mod mutate;
mod node;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::definition::{DefId, Definitions, ItemDefinition};
use crate::error::FormError;
use crate::model::{AnswerValue, Questionnaire, QuestionnaireResponse, ResponseStatus};
use crate::options::FormOptions;
use crate::scope::Scope;
use crate::validate::Issue;

pub use answer::{AnswerId, AnswerRef, AnswerState};
pub(crate) use answer::AnswerData;
pub use node::{NodeId, NodeKind, NodeRef, QuestionRef};
pub(crate) use node::{NodeBody, NodeData, ParentLink};

#[derive(Debug, Default, Clone)]
pub(crate) struct Memo {
    revision: Cell<u64>,
    pub enabled: RefCell<HashMap<NodeId, bool>>,
    /// Nodes whose enablement is being computed, outermost first.
    pub evaluating: RefCell<Vec<NodeId>>,
    pub snapshot: RefCell<Option<Arc<Value>>>,
}

#[derive(Debug, Clone)]
pub struct FormStore {
    pub(crate) questionnaire: Questionnaire,
    pub(crate) questionnaire_json: Arc<Value>,
    pub(crate) definitions: Arc<Definitions>,
    pub(crate) options: FormOptions,
    pub(crate) nodes: Vec<Option<NodeData>>,
    pub(crate) answers: Vec<Option<AnswerData>>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) scope: Scope,
    /// The initial response without items; its metadata is carried over.
    pub(crate) header: QuestionnaireResponse,
    pub(crate) status: ResponseStatus,
    pub(crate) validation_requested: bool,
    pub(crate) revision: u64,
    pub(crate) memo: Memo,
}

impl FormStore {
    pub fn questionnaire(&self) -> &Questionnaire {
        &self.questionnaire
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ResponseStatus) {
        tracing::debug!(?status, "response status changed");
        self.status = status;
        self.revision += 1;
    }

    /// Incremented by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Top-level nodes in questionnaire order.
    pub fn nodes(&self) -> Vec<NodeRef<'_>> {
        self.refs(&self.roots)
    }

    pub fn node(&self, id: NodeId) -> Result<NodeRef<'_>, FormError> {
        let data = self.node_data(id).ok_or(FormError::UnknownNode(id))?;
        Ok(NodeRef {
            form: self,
            id,
            data,
            def: self.definitions.get(data.def),
        })
    }

    /// Narrows a node to a question; any other node kind is a caller error.
    pub fn question(&self, id: NodeId) -> Result<QuestionRef<'_>, FormError> {
        let node = self.node(id)?;
        node.as_question()
            .ok_or_else(|| FormError::NotAQuestion(node.link_id().to_string()))
    }

    pub fn answer(&self, id: AnswerId) -> Result<AnswerRef<'_>, FormError> {
        let data = self.answer_data(id).ok_or(FormError::UnknownAnswer(id))?;
        Ok(AnswerRef {
            form: self,
            id,
            data,
        })
    }

    /// The first node registered under `link_id`.
    pub fn find(&self, link_id: &str) -> Option<NodeRef<'_>> {
        let id = self.scope.lookup_node(link_id)?;
        self.node(id).ok()
    }

    /// The first answer slot of the first question registered under `link_id`.
    pub fn first_answer(&self, link_id: &str) -> Result<AnswerId, FormError> {
        let id = self
            .scope
            .lookup_node(link_id)
            .ok_or_else(|| FormError::UnknownLinkId(link_id.to_string()))?;
        let question = self.question(id)?;
        question
            .answer_ids()
            .first()
            .copied()
            .ok_or_else(|| FormError::NoAnswerSlot(link_id.to_string()))
    }

    /// Every issue of every reachable node.
    pub fn issues(&self) -> Vec<Issue> {
        self.walk()
            .into_iter()
            .flat_map(|id| self.node_issues(id))
            .collect()
    }

    /// Reveals required-answer issues everywhere and reports whether the
    /// form currently has no issues.
    pub fn validate_all(&mut self) -> bool {
        self.validation_requested = true;
        let issues = self.issues();
        tracing::debug!(issues = issues.len(), "validated form");
        issues.is_empty()
    }

    pub(crate) fn node_data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)?.as_ref()
    }

    pub(crate) fn answer_data(&self, id: AnswerId) -> Option<&AnswerData> {
        self.answers.get(id.0)?.as_ref()
    }

    pub(crate) fn definition_of(&self, id: NodeId) -> Option<&ItemDefinition> {
        self.node_data(id).map(|data| self.definitions.get(data.def))
    }

    pub(crate) fn def(&self, id: DefId) -> &ItemDefinition {
        self.definitions.get(id)
    }

    pub(crate) fn refs(&self, ids: &[NodeId]) -> Vec<NodeRef<'_>> {
        ids.iter().filter_map(|id| self.node(*id).ok()).collect()
    }

    /// The node above `id`; answer-owned children report their question.
    pub(crate) fn parent_node(&self, id: NodeId) -> Option<NodeId> {
        match self.node_data(id)?.parent? {
            ParentLink::Node(parent) => Some(parent),
            ParentLink::Answer(answer) => Some(self.answer_data(answer)?.question),
        }
    }

    /// `id` followed by each of its ancestors up to a root.
    pub(crate) fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent_node(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Values currently stored on a question, in answer order.
    pub(crate) fn stored_values(&self, id: NodeId) -> Vec<&AnswerValue> {
        match self.node_data(id).map(|data| &data.body) {
            Some(NodeBody::Question { answers }) => answers
                .iter()
                .filter_map(|answer| self.answer_data(*answer)?.value.as_ref())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Direct structural children, including the children of every answer
    /// of a question.
    pub(crate) fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        match self.node_data(id).map(|data| &data.body) {
            Some(NodeBody::Group { children }) => children.clone(),
            Some(NodeBody::GroupList { instances }) => instances.clone(),
            Some(NodeBody::Question { answers }) => answers
                .iter()
                .filter_map(|answer| self.answer_data(*answer))
                .flat_map(|answer| answer.children.iter().copied())
                .collect(),
            Some(NodeBody::Display) | None => Vec::new(),
        }
    }

    /// Every live node in tree order.
    pub(crate) fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.child_ids(id).into_iter().rev());
        }
        out
    }

    /// The memo, cleared first if a mutation happened since it was filled.
    pub(crate) fn memo(&self) -> &Memo {
        if self.memo.revision.get() != self.revision {
            self.memo.enabled.borrow_mut().clear();
            self.memo.snapshot.borrow_mut().take();
            self.memo.revision.set(self.revision);
        }
        &self.memo
    }
}
