use assert_cmd::Command;
use assert_fs::prelude::*;
use serde_json::{Value, json};
use std::io::Write;

const QUESTIONNAIRE: &str = r#"{
  "resourceType": "Questionnaire",
  "id": "intake",
  "title": "Intake",
  "status": "active",
  "item": [
    { "linkId": "name", "text": "Name", "type": "string", "required": true },
    { "linkId": "age", "text": "Age", "type": "integer",
      "extension": [{ "url": "http://hl7.org/fhir/StructureDefinition/maxValue", "valueInteger": 120 }] },
    { "linkId": "smoker", "text": "Smoker?", "type": "boolean" },
    { "linkId": "packs", "text": "Packs per day", "type": "decimal",
      "enableWhen": [{ "question": "smoker", "operator": "=", "answerBoolean": true }] }
  ]
}"#;

fn qr_form() -> Command {
    Command::cargo_bin("qr-form").expect("binary")
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn response_applies_assignments() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let questionnaire = temp.child("intake.json");
    questionnaire.write_str(QUESTIONNAIRE).expect("write");

    let output = qr_form()
        .arg("response")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .args(["--set", "name=Ada", "--set", "age=36", "--set", "smoker=false"])
        .assert()
        .success()
        .get_output()
        .clone();
    let response: Value = serde_json::from_str(&stdout_of(&output)).expect("json");
    assert_eq!(response["questionnaire"], "Questionnaire/intake");
    assert_eq!(
        response["item"],
        json!([
            { "linkId": "name", "text": "Name", "answer": [{ "valueString": "Ada" }] },
            { "linkId": "age", "text": "Age", "answer": [{ "valueInteger": 36 }] },
            { "linkId": "smoker", "text": "Smoker?", "answer": [{ "valueBoolean": false }] }
        ])
    );
}

#[test]
fn response_carries_seeded_answers() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let questionnaire = temp.child("intake.json");
    questionnaire.write_str(QUESTIONNAIRE).expect("write");
    let seed = temp.child("seed.json");
    seed.write_str(
        &json!({
            "resourceType": "QuestionnaireResponse",
            "id": "qr-1",
            "status": "completed",
            "item": [{ "linkId": "name", "answer": [{ "valueString": "Grace" }] }]
        })
        .to_string(),
    )
    .expect("write");

    let output = qr_form()
        .arg("response")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .arg("--response")
        .arg(seed.path())
        .assert()
        .success()
        .get_output()
        .clone();
    let response: Value = serde_json::from_str(&stdout_of(&output)).expect("json");
    assert_eq!(response["id"], "qr-1");
    assert_eq!(response["status"], "completed");
    assert_eq!(response["item"][0]["answer"][0]["valueString"], "Grace");
}

#[test]
fn validate_reports_issues_and_fails() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let questionnaire = temp.child("intake.json");
    questionnaire.write_str(QUESTIONNAIRE).expect("write");

    let output = qr_form()
        .arg("validate")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .args(["--set", "age=130"])
        .assert()
        .failure()
        .get_output()
        .clone();
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Validation result: invalid"), "{stdout}");
    assert!(stdout.contains("name [required] - An answer is required"), "{stdout}");
    assert!(
        stdout.contains("age [value] - Value must be less than or equal to 120"),
        "{stdout}"
    );
}

#[test]
fn validate_passes_complete_forms() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let questionnaire = temp.child("intake.json");
    questionnaire.write_str(QUESTIONNAIRE).expect("write");

    let output = qr_form()
        .arg("validate")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .args(["--set", "name=Ada"])
        .assert()
        .success()
        .get_output()
        .clone();
    assert!(stdout_of(&output).contains("Validation result: valid"));
}

#[test]
fn options_file_controls_disabled_answers() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let questionnaire = temp.child("intake.json");
    questionnaire.write_str(QUESTIONNAIRE).expect("write");
    let seed = temp.child("seed.json");
    seed.write_str(
        &json!({
            "resourceType": "QuestionnaireResponse",
            "status": "in-progress",
            "item": [{ "linkId": "packs", "answer": [{ "valueDecimal": 1.5 }] }]
        })
        .to_string(),
    )
    .expect("write");
    let mut options = tempfile::NamedTempFile::new().expect("options file");
    write!(options, r#"{{ "include_disabled_in_response": true }}"#).expect("write");

    let without = qr_form()
        .arg("response")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .arg("--response")
        .arg(seed.path())
        .assert()
        .success()
        .get_output()
        .clone();
    let response: Value = serde_json::from_str(&stdout_of(&without)).expect("json");
    assert!(response.get("item").is_none());

    let with = qr_form()
        .arg("response")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .arg("--response")
        .arg(seed.path())
        .arg("--options")
        .arg(options.path())
        .assert()
        .success()
        .get_output()
        .clone();
    let response: Value = serde_json::from_str(&stdout_of(&with)).expect("json");
    assert_eq!(response["item"][0]["linkId"], "packs");
}

#[test]
fn inspect_renders_text_and_json() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let questionnaire = temp.child("intake.json");
    questionnaire.write_str(QUESTIONNAIRE).expect("write");

    let text = qr_form()
        .arg("inspect")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .assert()
        .success()
        .get_output()
        .clone();
    let text = stdout_of(&text);
    assert!(text.contains("Form: Intake (intake)"), "{text}");
    assert!(text.contains("Next question: name"), "{text}");
    assert!(!text.contains("packs"), "{text}");

    let json = qr_form()
        .arg("inspect")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .args(["--format", "json"])
        .assert()
        .success()
        .get_output()
        .clone();
    let ui: Value = serde_json::from_str(&stdout_of(&json)).expect("json");
    assert_eq!(ui["status"], "need_input");
    assert_eq!(ui["items"][3]["linkId"], "packs");
    assert_eq!(ui["items"][3]["enabled"], false);
    assert_eq!(ui["items"][3]["hidden"], true);
}

#[test]
fn unknown_link_ids_are_rejected() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let questionnaire = temp.child("intake.json");
    questionnaire.write_str(QUESTIONNAIRE).expect("write");

    let output = qr_form()
        .arg("response")
        .arg("--questionnaire")
        .arg(questionnaire.path())
        .args(["--set", "weight=80"])
        .assert()
        .failure()
        .get_output()
        .clone();
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown linkId 'weight'"));
}

#[test]
fn schema_describes_questionnaire_items() {
    let output = qr_form()
        .arg("schema")
        .assert()
        .success()
        .get_output()
        .clone();
    let schema: Value = serde_json::from_str(&stdout_of(&output)).expect("json");
    assert!(schema["properties"]["item"].is_object());
}
