use serde_json::{Value, json};

use qr_engine::{AnswerValue, Coding, FormStore};

fn questionnaire(disabled_display: &str) -> Value {
    json!({
        "resourceType": "Questionnaire",
        "id": "pregnancy",
        "item": [
            {
                "linkId": "sex",
                "type": "coding",
                "answerOption": [
                    { "valueCoding": { "system": "http://hl7.org/fhir/administrative-gender", "code": "female" } },
                    { "valueCoding": { "system": "http://hl7.org/fhir/administrative-gender", "code": "male" } }
                ]
            },
            {
                "linkId": "pregnant",
                "type": "boolean",
                "disabledDisplay": disabled_display,
                "enableWhen": [{
                    "question": "sex",
                    "operator": "=",
                    "answerCoding": { "system": "http://hl7.org/fhir/administrative-gender", "code": "female" }
                }]
            }
        ]
    })
}

fn female() -> AnswerValue {
    AnswerValue::Coding(Coding::new(
        "http://hl7.org/fhir/administrative-gender",
        "female",
    ))
}

#[test]
fn hidden_display_hides_disabled_items() {
    let mut form = FormStore::from_json(&questionnaire("hidden"), None).expect("form");
    let pregnant = form.find("pregnant").expect("pregnant");
    assert!(!pregnant.is_enabled());
    assert!(pregnant.hidden());

    let sex = form.first_answer("sex").expect("sex");
    form.set_value_by_user(sex, Some(female())).expect("set");
    let pregnant = form.find("pregnant").expect("pregnant");
    assert!(pregnant.is_enabled());
    assert!(!pregnant.hidden());
}

#[test]
fn protected_display_keeps_disabled_items_visible() {
    let mut form = FormStore::from_json(&questionnaire("protected"), None).expect("form");
    let pregnant = form.find("pregnant").expect("pregnant");
    assert!(!pregnant.is_enabled());
    assert!(!pregnant.hidden());

    let sex = form.first_answer("sex").expect("sex");
    form.set_value_by_user(sex, Some(female())).expect("set");
    let pregnant = form.find("pregnant").expect("pregnant");
    assert!(pregnant.is_enabled());
    assert!(!pregnant.hidden());
}

#[test]
fn disabling_keeps_the_value_but_drops_it_from_the_response() {
    let mut form = FormStore::from_json(&questionnaire("hidden"), None).expect("form");
    let sex = form.first_answer("sex").expect("sex");
    let pregnant = form.first_answer("pregnant").expect("pregnant");
    form.set_value_by_user(sex, Some(female())).expect("set");
    form.set_value_by_user(pregnant, Some(AnswerValue::Boolean(false)))
        .expect("set");
    assert_eq!(form.response().item.len(), 2);

    form.set_value_by_user(
        sex,
        Some(AnswerValue::Coding(Coding::new(
            "http://hl7.org/fhir/administrative-gender",
            "male",
        ))),
    )
    .expect("set");
    assert_eq!(form.response().item.len(), 1);
    assert_eq!(
        form.answer(pregnant).expect("answer").value(),
        Some(&AnswerValue::Boolean(false))
    );

    form.set_value_by_user(sex, Some(female())).expect("set");
    assert_eq!(form.response().item.len(), 2);
}

#[test]
fn enable_when_expression_overrides_conditions() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "item": [
            { "linkId": "age", "type": "integer" },
            {
                "linkId": "guardian",
                "type": "string",
                "extension": [{
                    "url": "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-enableWhenExpression",
                    "valueExpression": {
                        "language": "text/fhirpath",
                        "expression": "%resource.item.where(linkId='age').answer.value < 18"
                    }
                }]
            }
        ]
    });
    let mut form = FormStore::from_json(&questionnaire, None).expect("form");
    assert!(!form.find("guardian").expect("guardian").is_enabled());

    let age = form.first_answer("age").expect("age");
    form.set_value_by_user(age, Some(AnswerValue::Integer(12)))
        .expect("set");
    assert!(form.find("guardian").expect("guardian").is_enabled());

    form.set_value_by_user(age, Some(AnswerValue::Integer(30)))
        .expect("set");
    assert!(!form.find("guardian").expect("guardian").is_enabled());
}

#[test]
fn disabled_groups_disable_their_descendants() {
    let questionnaire = json!({
        "item": [
            { "linkId": "has-job", "type": "boolean" },
            {
                "linkId": "job",
                "type": "group",
                "enableWhen": [{ "question": "has-job", "operator": "=", "answerBoolean": true }],
                "item": [{ "linkId": "job.title", "type": "string" }]
            }
        ]
    });
    let mut form = FormStore::from_json(&questionnaire, None).expect("form");
    assert!(!form.find("job.title").expect("title").is_enabled());
    let has_job = form.first_answer("has-job").expect("has-job");
    form.set_value_by_user(has_job, Some(AnswerValue::Boolean(true)))
        .expect("set");
    assert!(form.find("job.title").expect("title").is_enabled());
}
