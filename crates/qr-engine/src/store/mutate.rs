use crate::error::FormError;
use crate::model::AnswerValue;
use crate::store::{AnswerId, FormStore, NodeBody, NodeId, ParentLink};

impl FormStore {
    /// Stores a user-entered value (or clears it with `None`).
    ///
    /// Integers are accepted for decimal questions and widened; any other
    /// mismatch with the item type is rejected.
    pub fn set_value_by_user(
        &mut self,
        answer: AnswerId,
        value: Option<AnswerValue>,
    ) -> Result<(), FormError> {
        let question = self
            .answer_data(answer)
            .ok_or(FormError::UnknownAnswer(answer))?
            .question;
        let definition = self
            .definition_of(question)
            .ok_or(FormError::UnknownNode(question))?;
        let kind = definition.item.kind;
        let value = match value {
            Some(value) if !value.fits(kind) => {
                return Err(FormError::TypeMismatch {
                    link_id: definition.link_id().to_string(),
                    expected: kind,
                    found: value.suffix(),
                });
            }
            Some(value) => Some(value.coerce(kind)),
            None => None,
        };
        tracing::debug!(
            link_id = definition.link_id(),
            %answer,
            value = ?value,
            "answer set by user"
        );
        if let Some(Some(slot)) = self.answers.get_mut(answer.0) {
            slot.value = value;
            slot.touched = true;
        }
        self.changed();
        Ok(())
    }

    /// Appends an empty answer slot to a repeating question.
    pub fn add_answer(&mut self, question: NodeId) -> Result<AnswerId, FormError> {
        let node = self.question(question)?;
        if !node.repeats() {
            return Err(FormError::NotRepeating(node.link_id().to_string()));
        }
        let def = node.data.def;
        let answer = self.create_answer(def, question, None, &[]);
        if let Some(NodeBody::Question { answers }) = self.body_mut(question) {
            answers.push(answer);
        }
        tracing::debug!(%question, %answer, "answer added");
        self.changed();
        Ok(answer)
    }

    /// Removes an answer slot of a repeating question. Removing the last
    /// slot leaves a fresh empty one behind.
    pub fn remove_answer(&mut self, answer: AnswerId) -> Result<(), FormError> {
        let question = self
            .answer_data(answer)
            .ok_or(FormError::UnknownAnswer(answer))?
            .question;
        let node = self.question(question)?;
        if !node.repeats() {
            return Err(FormError::NotRepeating(node.link_id().to_string()));
        }
        let def = node.data.def;

        self.remove_answer_subtree(answer);
        let mut emptied = false;
        if let Some(NodeBody::Question { answers }) = self.body_mut(question) {
            answers.retain(|candidate| *candidate != answer);
            emptied = answers.is_empty();
        }
        if emptied {
            let replacement = self.create_answer(def, question, None, &[]);
            if let Some(Some(slot)) = self.answers.get_mut(replacement.0) {
                slot.touched = true;
            }
            if let Some(NodeBody::Question { answers }) = self.body_mut(question) {
                answers.push(replacement);
            }
        }
        tracing::debug!(%question, %answer, "answer removed");
        self.changed();
        Ok(())
    }

    /// Appends an empty instance to a repeating group.
    pub fn add_group_instance(&mut self, list: NodeId) -> Result<NodeId, FormError> {
        let node = self.node(list)?;
        if !matches!(node.data.body, NodeBody::GroupList { .. }) {
            return Err(FormError::NotAGroupList(node.link_id().to_string()));
        }
        let def = node.data.def;
        let instance = self.build_group(def, Some(ParentLink::Node(list)), &[]);
        if let Some(NodeBody::GroupList { instances }) = self.body_mut(list) {
            instances.push(instance);
        }
        tracing::debug!(%list, %instance, "group instance added");
        self.changed();
        Ok(instance)
    }

    /// Removes one instance of a repeating group with everything below it.
    pub fn remove_group_instance(&mut self, instance: NodeId) -> Result<(), FormError> {
        let node = self.node(instance)?;
        let list = match node.data.parent {
            Some(ParentLink::Node(parent))
                if matches!(
                    self.node_data(parent).map(|data| &data.body),
                    Some(NodeBody::GroupList { .. })
                ) =>
            {
                parent
            }
            _ => return Err(FormError::NotAGroupInstance(node.link_id().to_string())),
        };
        self.remove_subtree(instance);
        if let Some(NodeBody::GroupList { instances }) = self.body_mut(list) {
            instances.retain(|candidate| *candidate != instance);
        }
        tracing::debug!(%list, %instance, "group instance removed");
        self.changed();
        Ok(())
    }

    pub(crate) fn body_mut(&mut self, id: NodeId) -> Option<&mut NodeBody> {
        self.nodes
            .get_mut(id.0)?
            .as_mut()
            .map(|node| &mut node.body)
    }

    /// Invalidates derived state and settles calculated values.
    pub(crate) fn changed(&mut self) {
        self.revision += 1;
        self.recalculate();
    }
}
