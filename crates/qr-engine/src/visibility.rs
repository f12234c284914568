//! Conditional enablement (`enableWhen`, `enableWhenExpression`) and the
//! derived `hidden` flag.

use std::cmp::Ordering;

use crate::expr::to_boolean;
use crate::model::{
    AnswerValue, DisabledDisplay, EnableBehavior, EnableWhen, EnableWhenOperator,
};
use crate::options::ReferenceResolution;
use crate::store::{FormStore, NodeId};

impl FormStore {
    /// Whether the node is enabled. Memoized until the next mutation; every
    /// node on an enablement cycle resolves to disabled.
    pub(crate) fn is_enabled(&self, id: NodeId) -> bool {
        let memo = self.memo();
        if let Some(enabled) = memo.enabled.borrow().get(&id) {
            return *enabled;
        }
        let cycle_start = memo.evaluating.borrow().iter().position(|node| *node == id);
        if let Some(start) = cycle_start {
            let evaluating = memo.evaluating.borrow();
            let cycle = &evaluating[start..];
            tracing::warn!(
                node = %id,
                length = cycle.len(),
                "enableWhen cycle detected; disabling its nodes"
            );
            let mut enabled = memo.enabled.borrow_mut();
            for node in cycle {
                enabled.insert(*node, false);
            }
            return false;
        }

        memo.evaluating.borrow_mut().push(id);
        let computed = self.compute_enabled(id);
        memo.evaluating.borrow_mut().pop();
        // A cycle found below this frame has already settled this node.
        *memo.enabled.borrow_mut().entry(id).or_insert(computed)
    }

    pub(crate) fn is_hidden(&self, id: NodeId) -> bool {
        let Some(definition) = self.definition_of(id) else {
            return true;
        };
        if definition.hidden {
            return true;
        }
        !self.is_enabled(id)
            && definition.item.disabled_display.unwrap_or_default() == DisabledDisplay::Hidden
    }

    fn compute_enabled(&self, id: NodeId) -> bool {
        let Some(definition) = self.definition_of(id) else {
            return false;
        };
        if let Some(parent) = self.parent_node(id)
            && !self.is_enabled(parent)
        {
            return false;
        }

        if let Some(expression) = &definition.enable_when_expression {
            return match self.evaluate_for(id, expression) {
                Ok(result) => matches!(to_boolean(&result), Ok(Some(true))),
                Err(error) => {
                    tracing::warn!(
                        link_id = definition.link_id(),
                        expression = expression.source(),
                        %error,
                        "enableWhenExpression failed; treating node as disabled"
                    );
                    false
                }
            };
        }

        let conditions = &definition.item.enable_when;
        if conditions.is_empty() {
            return true;
        }
        let mut results = conditions
            .iter()
            .map(|condition| self.condition_holds(id, condition));
        match definition.item.enable_behavior.unwrap_or_default() {
            EnableBehavior::All => results.all(|holds| holds),
            EnableBehavior::Any => results.any(|holds| holds),
        }
    }

    fn condition_holds(&self, id: NodeId, condition: &EnableWhen) -> bool {
        let Some(source) = self.resolve_reference(id, &condition.question) else {
            tracing::debug!(
                question = %condition.question,
                "enableWhen references an unknown item"
            );
            return false;
        };
        let answers: Vec<&AnswerValue> = if self.is_enabled(source) {
            self.stored_values(source)
        } else {
            Vec::new()
        };

        if condition.operator == EnableWhenOperator::Exists {
            let expected = condition
                .answer
                .get("answerBoolean")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(true);
            return !answers.is_empty() == expected;
        }
        let Some(expected) = condition.expected() else {
            return false;
        };
        if answers.is_empty() {
            return false;
        }
        let ordered = |accept: fn(Ordering) -> bool| {
            answers
                .iter()
                .any(|answer| answer.compare(&expected).is_some_and(accept))
        };
        match condition.operator {
            EnableWhenOperator::Equal => answers.iter().any(|answer| answer.equals(&expected)),
            EnableWhenOperator::NotEqual => !answers.iter().any(|answer| answer.equals(&expected)),
            EnableWhenOperator::Greater => ordered(Ordering::is_gt),
            EnableWhenOperator::Less => ordered(Ordering::is_lt),
            EnableWhenOperator::GreaterOrEqual => ordered(Ordering::is_ge),
            EnableWhenOperator::LessOrEqual => ordered(Ordering::is_le),
            EnableWhenOperator::Exists => false,
        }
    }

    /// Resolves a linkId reference made from `from`. With several candidates
    /// (repeating groups) the configured [`ReferenceResolution`] decides.
    pub(crate) fn resolve_reference(&self, from: NodeId, link_id: &str) -> Option<NodeId> {
        let candidates = self.scope.lookup_all(link_id);
        match (candidates, self.options.reference_resolution) {
            ([], _) => None,
            ([only], _) => Some(*only),
            ([first, ..], ReferenceResolution::First) => Some(*first),
            (many, ReferenceResolution::Nearest) => {
                let chain = self.ancestors(from);
                many.iter()
                    .copied()
                    .min_by_key(|candidate| {
                        self.ancestors(*candidate)
                            .iter()
                            .find_map(|ancestor| chain.iter().position(|node| node == ancestor))
                            .unwrap_or(usize::MAX)
                    })
            }
        }
    }
}
