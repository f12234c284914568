use serde_json::{Value, json};

use qr_engine::{AnswerState, AnswerValue, FormStore, IssueCode};

fn dosage() -> Value {
    serde_json::from_str(include_str!("fixtures/dosage.questionnaire.json")).expect("fixture")
}

#[test]
fn calculated_maximum_is_enforced_and_cleared() {
    let mut form = FormStore::from_json(&dosage(), None).expect("form");
    let dose = form.first_answer("dose").expect("dose");

    form.set_value_by_user(dose, Some(AnswerValue::Integer(55)))
        .expect("set");
    let issues = form.answer(dose).expect("answer").issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, IssueCode::Value);
    assert!(issues[0].diagnostics.contains("40"), "{}", issues[0].diagnostics);
    assert_eq!(form.answer(dose).expect("answer").state(), AnswerState::Invalid);
    assert!(!form.validate_all());

    form.set_value_by_user(dose, Some(AnswerValue::Integer(40)))
        .expect("set");
    assert!(form.answer(dose).expect("answer").issues().is_empty());
    assert_eq!(form.answer(dose).expect("answer").state(), AnswerState::Answered);
    assert!(form.validate_all());
}

#[test]
fn calculated_maximum_follows_its_source() {
    let mut form = FormStore::from_json(&dosage(), None).expect("form");
    let dose = form.first_answer("dose").expect("dose");
    let max_dose = form.first_answer("max-dose").expect("max-dose");

    form.set_value_by_user(dose, Some(AnswerValue::Integer(30)))
        .expect("set");
    assert!(form.answer(dose).expect("answer").issues().is_empty());

    form.set_value_by_user(max_dose, Some(AnswerValue::Integer(20)))
        .expect("set");
    let issues = form.answer(dose).expect("answer").issues();
    assert!(issues[0].diagnostics.contains("20"));

    form.set_value_by_user(max_dose, None).expect("clear");
    assert!(form.answer(dose).expect("answer").issues().is_empty());
}

#[test]
fn answer_state_starts_unanswered() {
    let form = FormStore::from_json(&dosage(), None).expect("form");
    let dose = form.first_answer("dose").expect("dose");
    assert_eq!(form.answer(dose).expect("answer").state(), AnswerState::Unanswered);
}

#[test]
fn validate_all_reports_required_answers_everywhere() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "item": [{
            "linkId": "visit",
            "type": "group",
            "repeats": true,
            "item": [{ "linkId": "visit.reason", "type": "string", "required": true }]
        }]
    });
    let mut form = FormStore::from_json(&questionnaire, None).expect("form");
    assert!(form.issues().is_empty());
    assert!(!form.validate_all());
    let issues = form.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].link_id, "visit.reason");
    assert_eq!(issues[0].code, IssueCode::Required);

    let reason = form.first_answer("visit.reason").expect("reason");
    form.set_value_by_user(reason, Some(AnswerValue::String("check-up".into())))
        .expect("set");
    assert!(form.validate_all());
}

#[test]
fn issues_serialize_with_fhir_codes() {
    let mut form = FormStore::from_json(&dosage(), None).expect("form");
    let dose = form.first_answer("dose").expect("dose");
    form.set_value_by_user(dose, Some(AnswerValue::Integer(41)))
        .expect("set");
    let issues = serde_json::to_value(form.issues()).expect("json");
    assert_eq!(
        issues,
        json!([{
            "linkId": "dose",
            "severity": "error",
            "code": "value",
            "diagnostics": "Value must be less than or equal to 40"
        }])
    );
}
