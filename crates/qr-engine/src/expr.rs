//! FHIRPath evaluation for calculated bounds, calculated values, variables
//! and `enableWhenExpression`, backed by `ferrum-fhirpath`.
//!
//! Expressions are compiled once when the questionnaire is loaded. Each
//! evaluation binds `%resource`, `%context`, `%questionnaire` and the
//! declared variables, and hands results back as plain JSON values.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use ferrum_context::{DefaultFhirContext, FhirContext};
use ferrum_fhirpath::vm::Plan;
use ferrum_fhirpath::{Context, Engine, ToJson, Value as PathValue};
use serde_json::Value;

use crate::error::ExpressionError;

/// Expression results, one JSON value per collection item.
pub type Collection = Vec<Value>;

/// Bindings visible to one evaluation.
pub struct Environment<'a> {
    pub resource: &'a Value,
    pub context: &'a Value,
    pub questionnaire: Option<&'a Value>,
    pub variables: &'a HashMap<String, Collection>,
}

static ENGINE: OnceLock<Engine> = OnceLock::new();

/// Shared engine without StructureDefinitions; paths resolve structurally
/// against the response JSON.
fn engine() -> &'static Engine {
    ENGINE.get_or_init(|| {
        let context: Arc<dyn FhirContext> = Arc::new(DefaultFhirContext::from_packages(vec![]));
        Engine::new(context, None)
    })
}

/// An expression compiled once when the questionnaire is loaded.
///
/// A source that fails to compile is kept together with its error so every
/// evaluation reports it instead of silently succeeding.
#[derive(Clone)]
pub struct CompiledExpression {
    source: String,
    plan: Result<Arc<Plan>, ExpressionError>,
}

impl CompiledExpression {
    pub fn compile(source: impl Into<String>) -> Self {
        let source = source.into();
        let plan = engine()
            .compile(&source, None)
            .map_err(ExpressionError::Compile);
        if let Err(error) = &plan {
            tracing::warn!(expression = %source, %error, "failed to compile expression");
        }
        Self { source, plan }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.plan.is_ok()
    }

    /// Evaluates with `%context` as the initial focus.
    pub fn evaluate(&self, env: &Environment<'_>) -> Result<Collection, ExpressionError> {
        let plan = self.plan.as_ref().map_err(Clone::clone)?;
        let context = bind(env);
        // Integer overflow on user input panics inside the engine.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine().evaluate(plan, &context)))
            .map_err(|payload| ExpressionError::Aborted(panic_message(payload.as_ref())))?;
        let result = outcome.map_err(ExpressionError::Evaluate)?;
        Ok(result.iter().filter_map(|item| item.to_json()).collect())
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("source", &self.source)
            .field("valid", &self.is_valid())
            .finish()
    }
}

fn bind(env: &Environment<'_>) -> Context {
    let resource = PathValue::from_json(env.resource.clone());
    let mut context = Context::new(PathValue::from_json(env.context.clone()));
    context.set_variable("resource", resource.clone());
    context.set_variable("rootResource", resource);
    if let Some(questionnaire) = env.questionnaire {
        context.set_variable("questionnaire", PathValue::from_json(questionnaire.clone()));
    }
    for (name, values) in env.variables {
        context.set_variable(name.as_str(), collection_value(values));
    }
    context
}

fn collection_value(values: &[Value]) -> PathValue {
    match values {
        [] => PathValue::empty(),
        [single] => PathValue::from_json(single.clone()),
        many => PathValue::from_json(Value::Array(many.to_vec())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| text.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "engine panicked".to_string())
}

/// FHIRPath singleton evaluation of a collection in a boolean position:
/// empty is unknown, a single non-boolean item counts as `true`.
pub fn to_boolean(collection: &[Value]) -> Result<Option<bool>, ExpressionError> {
    match collection {
        [] => Ok(None),
        [single] => Ok(Some(single.as_bool().unwrap_or(true))),
        many => Err(ExpressionError::NotSingleton(many.len())),
    }
}
