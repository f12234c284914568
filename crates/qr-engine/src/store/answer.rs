use std::fmt;

use serde::Serialize;

use crate::model::AnswerValue;
use crate::store::node::{NodeId, NodeRef, QuestionRef};
use crate::store::FormStore;
use crate::validate::Issue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnswerId(pub(crate) usize);

impl fmt::Display for AnswerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Summary of an answer slot for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    Unanswered,
    Answered,
    Invalid,
}

#[derive(Debug, Clone)]
pub(crate) struct AnswerData {
    pub question: NodeId,
    pub value: Option<AnswerValue>,
    /// Set once a user edit reaches this answer.
    pub touched: bool,
    pub children: Vec<NodeId>,
}

/// Read-only view of one answer slot.
#[derive(Clone, Copy)]
pub struct AnswerRef<'a> {
    pub(crate) form: &'a FormStore,
    pub(crate) id: AnswerId,
    pub(crate) data: &'a AnswerData,
}

impl fmt::Debug for AnswerRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerRef")
            .field("id", &self.id)
            .field("value", &self.data.value)
            .finish()
    }
}

impl<'a> AnswerRef<'a> {
    pub fn id(&self) -> AnswerId {
        self.id
    }

    pub fn value(&self) -> Option<&'a AnswerValue> {
        self.data.value.as_ref()
    }

    pub fn touched(&self) -> bool {
        self.data.touched
    }

    pub fn question(&self) -> Option<QuestionRef<'a>> {
        self.form.node(self.data.question).ok()?.as_question()
    }

    /// Items nested under this answer.
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        self.form.refs(&self.data.children)
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.form.answer_issues(self.id)
    }

    pub fn state(&self) -> AnswerState {
        match &self.data.value {
            None => AnswerState::Unanswered,
            Some(_) if self.issues().is_empty() => AnswerState::Answered,
            Some(_) => AnswerState::Invalid,
        }
    }
}
