//! Expression evaluation against the node tree: `%resource`, `%context` and
//! `variable` bindings, `calculatedExpression` and `initialExpression`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::definition::Variable;
use crate::error::ExpressionError;
use crate::expr::{Collection, CompiledExpression, Environment};
use crate::model::{AnswerValue, ItemType};
use crate::store::{AnswerId, FormStore, NodeBody, NodeId, NodeKind};

impl FormStore {
    /// Evaluates `expression` with `id` as `%context`.
    pub(crate) fn evaluate_for(
        &self,
        id: NodeId,
        expression: &CompiledExpression,
    ) -> Result<Collection, ExpressionError> {
        let resource = self.snapshot();
        let context = self.context_json(id);
        let variables = self.variables_for(id, &resource);
        let env = Environment {
            resource: &resource,
            context: &context,
            questionnaire: Some(self.questionnaire_json.as_ref()),
            variables: &variables,
        };
        expression.evaluate(&env)
    }

    /// Variables declared on the questionnaire and on `id` and its
    /// ancestors, outermost first so inner declarations may use outer ones.
    fn variables_for(&self, id: NodeId, resource: &Value) -> HashMap<String, Collection> {
        let mut variables = HashMap::new();
        self.bind(
            &mut variables,
            self.definitions.root_variables(),
            resource,
            resource,
        );
        for node in self.ancestors(id).into_iter().rev() {
            let Some(definition) = self.definition_of(node) else {
                continue;
            };
            if definition.variables.is_empty() {
                continue;
            }
            let context = self.context_json(node);
            self.bind(&mut variables, &definition.variables, &context, resource);
        }
        variables
    }

    fn bind(
        &self,
        variables: &mut HashMap<String, Collection>,
        declared: &[Variable],
        context: &Value,
        resource: &Value,
    ) {
        for variable in declared {
            let result = {
                let env = Environment {
                    resource,
                    context,
                    questionnaire: Some(self.questionnaire_json.as_ref()),
                    variables,
                };
                variable.expression.evaluate(&env)
            };
            let value = result.unwrap_or_else(|error| {
                tracing::warn!(
                    variable = %variable.name,
                    expression = variable.expression.source(),
                    %error,
                    "variable failed to evaluate"
                );
                Collection::new()
            });
            variables.insert(variable.name.clone(), value);
        }
    }

    /// Recomputes every `calculatedExpression` until no value changes or the
    /// configured number of passes is used up.
    pub(crate) fn recalculate(&mut self) {
        let definitions = Arc::clone(&self.definitions);
        let targets: Vec<NodeId> = self
            .walk()
            .into_iter()
            .filter(|id| {
                self.node_data(*id).is_some_and(|node| {
                    node.kind() == NodeKind::Question
                        && definitions.get(node.def).calculated.is_some()
                })
            })
            .collect();
        if targets.is_empty() {
            return;
        }

        let passes = self.options.max_calculation_passes;
        for pass in 0..passes {
            let mut changed = false;
            for id in &targets {
                let Some(def) = self.node_data(*id).map(|node| node.def) else {
                    continue;
                };
                let definition = definitions.get(def);
                let Some(expression) = &definition.calculated else {
                    continue;
                };
                let result = match self.evaluate_for(*id, expression) {
                    Ok(result) => result,
                    Err(error) => {
                        tracing::warn!(
                            link_id = definition.link_id(),
                            expression = expression.source(),
                            %error,
                            "calculatedExpression failed"
                        );
                        continue;
                    }
                };
                let mut values = answer_values(definition.item.kind, &result);
                if !definition.item.repeats {
                    values.truncate(1);
                }
                let current: Vec<AnswerValue> =
                    self.stored_values(*id).into_iter().cloned().collect();
                if current != values {
                    tracing::debug!(link_id = definition.link_id(), ?values, "calculated value changed");
                    self.store_values(*id, values);
                    changed = true;
                }
            }
            if !changed {
                tracing::debug!(passes = pass + 1, "calculated values settled");
                return;
            }
        }
        tracing::warn!(passes, "calculated values did not settle");
    }

    /// Seeds questions that still have no answer from `initialExpression`.
    pub(crate) fn apply_initial_expressions(&mut self) {
        let definitions = Arc::clone(&self.definitions);
        for id in self.walk() {
            let Some(node) = self.node_data(id) else {
                continue;
            };
            if node.kind() != NodeKind::Question {
                continue;
            }
            let definition = definitions.get(node.def);
            let Some(expression) = &definition.initial_expression else {
                continue;
            };
            if !self.stored_values(id).is_empty() {
                continue;
            }
            match self.evaluate_for(id, expression) {
                Ok(result) => {
                    let mut values = answer_values(definition.item.kind, &result);
                    if !definition.item.repeats {
                        values.truncate(1);
                    }
                    if !values.is_empty() {
                        self.store_values(id, values);
                    }
                }
                Err(error) => tracing::warn!(
                    link_id = definition.link_id(),
                    expression = expression.source(),
                    %error,
                    "initialExpression failed"
                ),
            }
        }
    }

    /// Replaces the answers of a question with `values`, reusing existing
    /// slots in order. A question always keeps at least one slot.
    fn store_values(&mut self, id: NodeId, values: Vec<AnswerValue>) {
        let Some((def, existing)) = self.node_data(id).and_then(|node| match &node.body {
            NodeBody::Question { answers } => Some((node.def, answers.clone())),
            _ => None,
        }) else {
            return;
        };
        let keep = values.len().max(1);
        let mut slots: Vec<AnswerId> = Vec::with_capacity(keep);
        for (index, answer) in existing.into_iter().enumerate() {
            if index >= keep {
                self.remove_answer_subtree(answer);
                continue;
            }
            if let Some(Some(slot)) = self.answers.get_mut(answer.0) {
                slot.value = values.get(index).cloned();
            }
            slots.push(answer);
        }
        for value in values.into_iter().skip(slots.len()) {
            slots.push(self.create_answer(def, id, Some(value), &[]));
        }
        if let Some(NodeBody::Question { answers }) = self.body_mut(id) {
            *answers = slots;
        }
        self.revision += 1;
    }
}

fn answer_values(kind: ItemType, result: &[Value]) -> Vec<AnswerValue> {
    result
        .iter()
        .filter_map(|raw| AnswerValue::from_json_for(kind, raw))
        .collect()
}
