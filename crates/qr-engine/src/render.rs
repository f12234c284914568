use serde_json::{Map, Value, json};

use crate::model::AnswerValue;
use crate::store::{FormStore, NodeKind, NodeRef};
use crate::validate::Issue;

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A required question is unanswered or an answer has issues.
    NeedInput,
    /// Every enabled question is valid.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
        }
    }
}

/// Progress counters over enabled questions.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RenderAnswer {
    pub value: Option<AnswerValue>,
    pub issues: Vec<Issue>,
    pub children: Vec<RenderNode>,
}

/// One node of the render tree.
#[derive(Debug, Clone)]
pub struct RenderNode {
    pub link_id: String,
    pub text: Option<String>,
    pub prefix: Option<String>,
    pub kind: NodeKind,
    pub item_type: String,
    pub enabled: bool,
    pub hidden: bool,
    pub required: bool,
    pub read_only: bool,
    pub repeats: bool,
    /// Issues of the node itself (required, occurrence counts).
    pub issues: Vec<Issue>,
    pub answers: Vec<RenderAnswer>,
    pub options: Vec<AnswerValue>,
    pub children: Vec<RenderNode>,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub form_id: Option<String>,
    pub form_title: Option<String>,
    pub form_version: Option<String>,
    pub status: RenderStatus,
    pub next_question_id: Option<String>,
    pub progress: RenderProgress,
    pub nodes: Vec<RenderNode>,
}

/// Build the renderer payload from the current form state.
pub fn build_render_payload(form: &FormStore) -> RenderPayload {
    let nodes: Vec<RenderNode> = form.nodes().into_iter().map(render_node).collect();

    let mut questions = Vec::new();
    collect_questions(&nodes, &mut questions);
    let total = questions.len();
    let answered = questions
        .iter()
        .filter(|question| question.answers.iter().any(|answer| answer.value.is_some()))
        .count();
    let next_question_id = questions
        .iter()
        .find(|question| !question.hidden && needs_input(question))
        .map(|question| question.link_id.clone());

    let status = if questions.iter().any(|question| needs_input(question)) {
        RenderStatus::NeedInput
    } else {
        RenderStatus::Complete
    };

    let questionnaire = form.questionnaire();
    RenderPayload {
        form_id: questionnaire.id.clone(),
        form_title: questionnaire
            .title
            .clone()
            .or_else(|| questionnaire.name.clone()),
        form_version: questionnaire.version.clone(),
        status,
        next_question_id,
        progress: RenderProgress { answered, total },
        nodes,
    }
}

fn render_node(node: NodeRef<'_>) -> RenderNode {
    let answers: Vec<RenderAnswer> = node
        .as_question()
        .map(|question| {
            question
                .answers()
                .into_iter()
                .map(|answer| RenderAnswer {
                    value: answer.value().cloned(),
                    issues: answer.issues(),
                    children: answer.children().into_iter().map(render_node).collect(),
                })
                .collect()
        })
        .unwrap_or_default();
    let answer_issues: Vec<&Issue> = answers
        .iter()
        .flat_map(|answer| answer.issues.iter())
        .collect();
    let issues = node
        .issues()
        .into_iter()
        .filter(|issue| !answer_issues.contains(&issue))
        .collect();

    RenderNode {
        link_id: node.link_id().to_string(),
        text: node.text().map(str::to_string),
        prefix: node.prefix().map(str::to_string),
        kind: node.kind(),
        item_type: node.item_type().to_string(),
        enabled: node.is_enabled(),
        hidden: node.hidden(),
        required: node.required(),
        read_only: node.read_only(),
        repeats: node.repeats(),
        issues,
        answers,
        options: node
            .as_question()
            .map(|question| question.options().to_vec())
            .unwrap_or_default(),
        children: node.children().into_iter().map(render_node).collect(),
    }
}

/// Enabled questions in tree order.
fn collect_questions<'a>(nodes: &'a [RenderNode], out: &mut Vec<&'a RenderNode>) {
    for node in nodes.iter().filter(|node| node.enabled) {
        if node.kind == NodeKind::Question {
            out.push(node);
        }
        for answer in &node.answers {
            collect_questions(&answer.children, out);
        }
        collect_questions(&node.children, out);
    }
}

fn needs_input(question: &RenderNode) -> bool {
    let unanswered = question.answers.iter().all(|answer| answer.value.is_none());
    (question.required && unanswered)
        || !question.issues.is_empty()
        || question.answers.iter().any(|answer| !answer.issues.is_empty())
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    json!({
        "form_id": payload.form_id,
        "form_title": payload.form_title,
        "form_version": payload.form_version,
        "status": payload.status.as_str(),
        "next_question_id": payload.next_question_id,
        "progress": {
            "answered": payload.progress.answered,
            "total": payload.progress.total,
        },
        "items": payload.nodes.iter().map(node_json).collect::<Vec<_>>(),
    })
}

fn node_json(node: &RenderNode) -> Value {
    let mut map = Map::new();
    map.insert("linkId".into(), Value::String(node.link_id.clone()));
    map.insert(
        "text".into(),
        node.text.clone().map(Value::String).unwrap_or(Value::Null),
    );
    if let Some(prefix) = &node.prefix {
        map.insert("prefix".into(), Value::String(prefix.clone()));
    }
    map.insert("type".into(), Value::String(node.item_type.clone()));
    map.insert("enabled".into(), Value::Bool(node.enabled));
    map.insert("hidden".into(), Value::Bool(node.hidden));
    map.insert("required".into(), Value::Bool(node.required));
    map.insert("readOnly".into(), Value::Bool(node.read_only));
    if node.kind == NodeKind::GroupList {
        map.insert("repeats".into(), Value::Bool(true));
    }
    if !node.issues.is_empty() {
        map.insert("issues".into(), issues_json(&node.issues));
    }
    if node.kind == NodeKind::Question {
        let answers = node
            .answers
            .iter()
            .map(|answer| {
                let mut entry = Map::new();
                entry.insert(
                    "value".into(),
                    answer.value.as_ref().map(AnswerValue::to_json).unwrap_or(Value::Null),
                );
                if !answer.issues.is_empty() {
                    entry.insert("issues".into(), issues_json(&answer.issues));
                }
                if !answer.children.is_empty() {
                    entry.insert(
                        "items".into(),
                        Value::Array(answer.children.iter().map(node_json).collect()),
                    );
                }
                Value::Object(entry)
            })
            .collect();
        map.insert("answers".into(), Value::Array(answers));
    }
    if !node.options.is_empty() {
        map.insert(
            "options".into(),
            Value::Array(node.options.iter().map(AnswerValue::to_json).collect()),
        );
    }
    if !node.children.is_empty() {
        map.insert(
            "items".into(),
            Value::Array(node.children.iter().map(node_json).collect()),
        );
    }
    Value::Object(map)
}

fn issues_json(issues: &[Issue]) -> Value {
    serde_json::to_value(issues).unwrap_or(Value::Null)
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Form: {} ({})",
        payload.form_title.as_deref().unwrap_or("untitled"),
        payload.form_id.as_deref().unwrap_or("-")
    ));
    lines.push(format!(
        "Status: {} ({}/{})",
        payload.status.as_str(),
        payload.progress.answered,
        payload.progress.total
    ));
    match &payload.next_question_id {
        Some(next_question) => lines.push(format!("Next question: {next_question}")),
        None => lines.push("All enabled questions are answered.".to_string()),
    }
    lines.push("Items:".to_string());
    for node in &payload.nodes {
        push_node_lines(node, 1, &mut lines);
    }
    lines.join("\n")
}

fn push_node_lines(node: &RenderNode, depth: usize, lines: &mut Vec<String>) {
    if node.hidden {
        return;
    }
    let indent = "  ".repeat(depth);
    if node.kind == NodeKind::GroupList {
        for child in &node.children {
            push_node_lines(child, depth, lines);
        }
        return;
    }

    let mut entry = format!("{indent}- {}", node.link_id);
    if let Some(text) = &node.text {
        entry.push_str(&format!(" ({text})"));
    }
    if node.required {
        entry.push_str(" [required]");
    }
    if !node.enabled {
        entry.push_str(" [disabled]");
    }
    let values: Vec<String> = node
        .answers
        .iter()
        .filter_map(|answer| answer.value.as_ref().map(ToString::to_string))
        .collect();
    if !values.is_empty() {
        entry.push_str(&format!(" = {}", values.join(", ")));
    }
    lines.push(entry);

    let issues = node
        .issues
        .iter()
        .chain(node.answers.iter().flat_map(|answer| answer.issues.iter()));
    for issue in issues {
        lines.push(format!("{indent}  ! {}", issue.diagnostics));
    }
    for answer in &node.answers {
        for child in &answer.children {
            push_node_lines(child, depth + 1, lines);
        }
    }
    for child in &node.children {
        push_node_lines(child, depth + 1, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form() -> FormStore {
        FormStore::from_json(
            &json!({
                "resourceType": "Questionnaire",
                "id": "vitals",
                "title": "Vitals",
                "item": [
                    { "linkId": "name", "text": "Name", "type": "string", "required": true },
                    { "linkId": "pulse", "text": "Pulse", "type": "integer" },
                    {
                        "linkId": "secret",
                        "type": "string",
                        "extension": [{
                            "url": "http://hl7.org/fhir/StructureDefinition/questionnaire-hidden",
                            "valueBoolean": true
                        }]
                    }
                ]
            }),
            None,
        )
        .expect("form")
    }

    #[test]
    fn payload_tracks_progress_and_next_question() {
        let mut form = form();
        let payload = build_render_payload(&form);
        assert_eq!(payload.status, RenderStatus::NeedInput);
        assert_eq!(payload.next_question_id.as_deref(), Some("name"));
        assert_eq!(payload.progress.total, 3);
        assert_eq!(payload.progress.answered, 0);

        let name = form.first_answer("name").expect("name");
        form.set_value_by_user(name, Some(AnswerValue::String("Ada".into())))
            .expect("set");
        let payload = build_render_payload(&form);
        assert_eq!(payload.status, RenderStatus::Complete);
        assert_eq!(payload.progress.answered, 1);
    }

    #[test]
    fn json_ui_lists_items_with_flags() {
        let payload = build_render_payload(&form());
        let ui = render_json_ui(&payload);
        assert_eq!(ui["form_title"], "Vitals");
        assert_eq!(ui["items"][0]["linkId"], "name");
        assert_eq!(ui["items"][0]["required"], true);
        assert_eq!(ui["items"][2]["hidden"], true);
    }

    #[test]
    fn text_skips_hidden_items() {
        let text = render_text(&build_render_payload(&form()));
        assert!(text.contains("Form: Vitals (vitals)"));
        assert!(text.contains("- name (Name) [required]"));
        assert!(!text.contains("secret"));
    }
}
