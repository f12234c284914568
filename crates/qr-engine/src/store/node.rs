use std::fmt;
use std::ops::Deref;

use crate::definition::{DefId, ItemDefinition};
use crate::model::{AnswerValue, ItemType, QuestionnaireItem};
use crate::store::answer::{AnswerId, AnswerRef};
use crate::store::FormStore;
use crate::validate::Issue;

/// Stable handle of a node. Handles are never reused, so a handle to a
/// removed node is reported as unknown instead of aliasing a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A non-repeating group.
    Group,
    /// The container of a repeating group's instances.
    GroupList,
    Question,
    Display,
}

/// Where a node hangs in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParentLink {
    Node(NodeId),
    /// Child items of a question are owned by one of its answers.
    Answer(AnswerId),
}

#[derive(Debug, Clone)]
pub(crate) enum NodeBody {
    Group { children: Vec<NodeId> },
    GroupList { instances: Vec<NodeId> },
    Question { answers: Vec<AnswerId> },
    Display,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub def: DefId,
    pub parent: Option<ParentLink>,
    pub body: NodeBody,
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Group { .. } => NodeKind::Group,
            NodeBody::GroupList { .. } => NodeKind::GroupList,
            NodeBody::Question { .. } => NodeKind::Question,
            NodeBody::Display => NodeKind::Display,
        }
    }
}

/// Read-only view of one node.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pub(crate) form: &'a FormStore,
    pub(crate) id: NodeId,
    pub(crate) data: &'a NodeData,
    pub(crate) def: &'a ItemDefinition,
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("link_id", &self.link_id())
            .field("kind", &self.kind())
            .finish()
    }
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn link_id(&self) -> &'a str {
        self.def.link_id()
    }

    pub fn text(&self) -> Option<&'a str> {
        self.def.item.text.as_deref()
    }

    pub fn prefix(&self) -> Option<&'a str> {
        self.def.item.prefix.as_deref()
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn item_type(&self) -> ItemType {
        self.def.item.kind
    }

    /// The questionnaire item this node was built from, without children.
    pub fn definition(&self) -> &'a QuestionnaireItem {
        &self.def.item
    }

    pub fn required(&self) -> bool {
        self.def.item.required
    }

    pub fn repeats(&self) -> bool {
        self.def.item.repeats
    }

    pub fn read_only(&self) -> bool {
        self.def.item.read_only || self.def.calculated.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.form.is_enabled(self.id)
    }

    pub fn hidden(&self) -> bool {
        self.form.is_hidden(self.id)
    }

    /// Current issues of this node, including those of its answers.
    pub fn issues(&self) -> Vec<Issue> {
        self.form.node_issues(self.id)
    }

    /// The enclosing node; for items nested under an answer this is the
    /// owning question.
    pub fn parent(&self) -> Option<NodeRef<'a>> {
        let parent = self.form.parent_node(self.id)?;
        self.form.node(parent).ok()
    }

    /// Group children, or the instances of a repeating group. Questions own
    /// their children per answer, see [`AnswerRef::children`].
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        let ids = match &self.data.body {
            NodeBody::Group { children } => children.as_slice(),
            NodeBody::GroupList { instances } => instances.as_slice(),
            NodeBody::Question { .. } | NodeBody::Display => &[],
        };
        self.form.refs(ids)
    }

    pub fn as_question(&self) -> Option<QuestionRef<'a>> {
        match &self.data.body {
            NodeBody::Question { answers } => Some(QuestionRef {
                node: *self,
                answers,
            }),
            _ => None,
        }
    }

    pub fn is_question(&self) -> bool {
        self.kind() == NodeKind::Question
    }
}

/// A node known to be a question.
#[derive(Clone, Copy)]
pub struct QuestionRef<'a> {
    node: NodeRef<'a>,
    answers: &'a [AnswerId],
}

impl fmt::Debug for QuestionRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionRef")
            .field("node", &self.node)
            .field("answers", &self.answers)
            .finish()
    }
}

impl<'a> QuestionRef<'a> {
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    pub fn answer_ids(&self) -> &'a [AnswerId] {
        self.answers
    }

    pub fn answers(&self) -> Vec<AnswerRef<'a>> {
        self.answers
            .iter()
            .filter_map(|id| self.node.form.answer(*id).ok())
            .collect()
    }

    pub fn first_answer(&self) -> Option<AnswerRef<'a>> {
        let id = self.answers.first()?;
        self.node.form.answer(*id).ok()
    }

    /// `answerOption` values, if the item declares any.
    pub fn options(&self) -> &'a [AnswerValue] {
        &self.node.def.options
    }
}

impl<'a> Deref for QuestionRef<'a> {
    type Target = NodeRef<'a>;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}
