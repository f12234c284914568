//! Item definitions compiled once per questionnaire.
//!
//! Every `Questionnaire.item` becomes an [`ItemDefinition`] that caches the
//! extension-derived constraints and parsed expressions the node store needs,
//! so nodes only carry a [`DefId`].

use regex::Regex;

use crate::expr::CompiledExpression;
use crate::model::extension::{
    CALCULATED_EXPRESSION, ENABLE_WHEN_EXPRESSION, HIDDEN, INITIAL_EXPRESSION, MAX_OCCURS,
    MAX_VALUE, MIN_LENGTH, MIN_OCCURS, MIN_VALUE, REGEX, VARIABLE,
};
use crate::model::{AnswerValue, Extension, ExtensionList, Questionnaire, QuestionnaireItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DefId(usize);

/// A `minValue`/`maxValue` bound.
#[derive(Debug, Clone)]
pub(crate) enum Bound {
    Fixed(AnswerValue),
    Calculated(CompiledExpression),
}

/// A named `variable` extension.
#[derive(Debug, Clone)]
pub(crate) struct Variable {
    pub name: String,
    pub expression: CompiledExpression,
}

#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    pub source: String,
    pub regex: Regex,
}

#[derive(Debug, Clone)]
pub(crate) struct ItemDefinition {
    /// The item without its nested `item` list.
    pub item: QuestionnaireItem,
    pub children: Vec<DefId>,
    pub hidden: bool,
    pub min_length: Option<usize>,
    pub pattern: Option<Pattern>,
    pub min_value: Option<Bound>,
    pub max_value: Option<Bound>,
    pub min_occurs: Option<usize>,
    pub max_occurs: Option<usize>,
    pub calculated: Option<CompiledExpression>,
    pub enable_when_expression: Option<CompiledExpression>,
    pub initial_expression: Option<CompiledExpression>,
    pub variables: Vec<Variable>,
    pub options: Vec<AnswerValue>,
    /// `initial` values, or the `initialSelected` options when there are none.
    pub initial: Vec<AnswerValue>,
}

impl ItemDefinition {
    pub fn link_id(&self) -> &str {
        &self.item.link_id
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Definitions {
    items: Vec<ItemDefinition>,
    roots: Vec<DefId>,
    variables: Vec<Variable>,
}

impl Definitions {
    pub fn compile(questionnaire: &Questionnaire) -> Self {
        let mut definitions = Definitions {
            variables: variables(&questionnaire.extension),
            ..Definitions::default()
        };
        definitions.roots = questionnaire
            .item
            .iter()
            .map(|item| definitions.compile_item(item))
            .collect();
        definitions
    }

    fn compile_item(&mut self, item: &QuestionnaireItem) -> DefId {
        let children = item
            .item
            .iter()
            .map(|child| self.compile_item(child))
            .collect();
        let extensions = item.extension.as_slice();

        let options: Vec<AnswerValue> = item
            .answer_option
            .iter()
            .filter_map(|option| option.answer())
            .collect();
        let mut initial: Vec<AnswerValue> = item
            .initial
            .iter()
            .filter_map(|initial| initial.answer())
            .collect();
        if initial.is_empty() {
            initial = item
                .answer_option
                .iter()
                .filter(|option| option.initial_selected)
                .filter_map(|option| option.answer())
                .collect();
        }

        let definition = ItemDefinition {
            item: QuestionnaireItem {
                item: Vec::new(),
                ..item.clone()
            },
            children,
            hidden: extensions
                .find_extension(HIDDEN)
                .and_then(Extension::value_boolean)
                .unwrap_or(false),
            min_length: extensions
                .find_extension(MIN_LENGTH)
                .and_then(Extension::value_integer)
                .and_then(|length| usize::try_from(length).ok()),
            pattern: extensions
                .find_extension(REGEX)
                .and_then(Extension::value_string)
                .and_then(|source| pattern(&item.link_id, source)),
            min_value: extensions.find_extension(MIN_VALUE).and_then(bound),
            max_value: extensions.find_extension(MAX_VALUE).and_then(bound),
            min_occurs: occurs(extensions, MIN_OCCURS),
            max_occurs: occurs(extensions, MAX_OCCURS),
            calculated: expression(extensions, CALCULATED_EXPRESSION),
            enable_when_expression: expression(extensions, ENABLE_WHEN_EXPRESSION),
            initial_expression: expression(extensions, INITIAL_EXPRESSION),
            variables: variables(extensions),
            options,
            initial,
        };
        self.items.push(definition);
        DefId(self.items.len() - 1)
    }

    pub fn get(&self, id: DefId) -> &ItemDefinition {
        &self.items[id.0]
    }

    pub fn roots(&self) -> &[DefId] {
        &self.roots
    }

    /// Variables declared on the questionnaire itself.
    pub fn root_variables(&self) -> &[Variable] {
        &self.variables
    }
}

/// FHIR regexes match the whole value.
fn pattern(link_id: &str, source: &str) -> Option<Pattern> {
    match Regex::new(&format!("^(?:{source})$")) {
        Ok(regex) => Some(Pattern {
            source: source.to_string(),
            regex,
        }),
        Err(error) => {
            tracing::warn!(link_id, pattern = source, %error, "ignoring invalid regex extension");
            None
        }
    }
}

fn bound(extension: &Extension) -> Option<Bound> {
    if let Some(source) = extension.calculated_value() {
        return Some(Bound::Calculated(CompiledExpression::compile(source)));
    }
    extension.answer().map(Bound::Fixed)
}

fn occurs(extensions: &[Extension], url: &str) -> Option<usize> {
    extensions
        .find_extension(url)
        .and_then(Extension::value_integer)
        .and_then(|count| usize::try_from(count).ok())
}

fn expression(extensions: &[Extension], url: &str) -> Option<CompiledExpression> {
    let value = extensions.find_extension(url)?.value_expression()?;
    if !is_fhirpath(value.language.as_deref()) {
        tracing::warn!(
            url,
            language = value.language.as_deref().unwrap_or_default(),
            "skipping expression in unsupported language"
        );
        return None;
    }
    value.expression.map(CompiledExpression::compile)
}

fn variables(extensions: &[Extension]) -> Vec<Variable> {
    extensions
        .extensions(VARIABLE)
        .filter_map(Extension::value_expression)
        .filter(|value| is_fhirpath(value.language.as_deref()))
        .filter_map(|value| {
            Some(Variable {
                name: value.name?,
                expression: CompiledExpression::compile(value.expression?),
            })
        })
        .collect()
}

fn is_fhirpath(language: Option<&str>) -> bool {
    matches!(language, None | Some("text/fhirpath"))
}
