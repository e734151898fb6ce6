use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use easipro_core::fhir_urls;
use easipro_core::models::datatypes::Coding;
use easipro_core::models::questionnaire::Questionnaire;
use easipro_core::models::response::{AnswerValue, QuestionnaireResponse, ResponseItem};
use easipro_core::models::step::{StepAnswer, StepKind, StepResult, TaskResult, encode_choice};
use easipro_instruments::adaptive::AdaptiveQuestionnaire;
use easipro_instruments::error::InstrumentError;
use easipro_instruments::session::{AdaptiveQuestionnaireTask, SessionState};
use easipro_instruments::task::{NavigableTask, Navigation};
use easipro_instruments::{Instrument, SessionContext};
use easipro_server::error::ServerError;
use easipro_server::handler::{BoxFuture, FhirRequest, RequestHandler};
use serde_json::{Value, json};

/// Replies with scripted bodies in order and records every request.
///
/// Like the CAT engine, it echoes the posted `item` list into replies that
/// do not script their own, unless built with `without_echo`.
struct ScriptedServer {
    replies: Mutex<VecDeque<Result<Value, ServerError>>>,
    requests: Mutex<Vec<FhirRequest>>,
    echo_items: bool,
}

impl ScriptedServer {
    fn with_replies(replies: Vec<Result<Value, ServerError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            echo_items: true,
        })
    }

    fn without_echo(replies: Vec<Result<Value, ServerError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            echo_items: false,
        })
    }

    fn push_reply(&self, reply: Result<Value, ServerError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn body(&self, index: usize) -> Value {
        self.requests.lock().unwrap()[index]
            .body
            .clone()
            .expect("next-q requests carry a body")
    }
}

impl RequestHandler for ScriptedServer {
    fn perform(&self, request: FhirRequest) -> BoxFuture<'_, Result<Value, ServerError>> {
        let posted = request.body.as_ref().and_then(|b| b.get("item")).cloned();
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Err(
            ServerError::Status {
                status: 500,
                body: "no scripted reply".to_string(),
            },
        ));
        let reply = match (reply, posted) {
            (Ok(mut body), Some(items)) if self.echo_items && body.get("item").is_none() => {
                body["item"] = items;
                Ok(body)
            }
            (reply, _) => reply,
        };
        Box::pin(async move { reply })
    }
}

/// Never answers within any reasonable timeout.
struct SilentServer;

impl RequestHandler for SilentServer {
    fn perform(&self, _request: FhirRequest) -> BoxFuture<'_, Result<Value, ServerError>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        })
    }
}

fn cat_questionnaire() -> Questionnaire {
    serde_json::from_value(json!({
        "resourceType": "Questionnaire",
        "id": "pf-cat",
        "title": "PROMIS Physical Function CAT",
        "status": "active",
        "extension": [{"url": fhir_urls::SDC_ADAPTIVE, "valueBoolean": true}]
    }))
    .unwrap()
}

fn boolean_item(link_id: &str) -> Value {
    json!({"linkId": link_id, "type": "boolean", "text": format!("Question {link_id}")})
}

fn choice_item(link_id: &str) -> Value {
    json!({
        "linkId": link_id,
        "type": "choice",
        "text": "Are you able to run errands?",
        "answerOption": [
            {"valueCoding": {"system": "sys", "code": "c1", "display": "Yes"}},
            {"valueCoding": {"system": "sys", "code": "c2", "display": "No"}}
        ]
    })
}

fn in_progress(next_item: Value) -> Result<Value, ServerError> {
    Ok(json!({
        "resourceType": "QuestionnaireResponse",
        "id": "session-1",
        "status": "in-progress",
        "contained": [{"resourceType": "Questionnaire", "id": "pf-cat", "item": [next_item]}]
    }))
}

fn completed(theta: f64, standard_error: f64) -> Result<Value, ServerError> {
    Ok(json!({
        "resourceType": "QuestionnaireResponse",
        "id": "session-1",
        "status": "completed",
        "extension": [{
            "url": fhir_urls::QUESTIONNAIRE_SCORES,
            "extension": [
                {"url": fhir_urls::SCORE_THETA, "valueDecimal": theta},
                {"url": "standarderror", "valueDecimal": standard_error}
            ]
        }]
    }))
}

fn task_with(server: Arc<ScriptedServer>) -> AdaptiveQuestionnaireTask {
    let instrument = AdaptiveQuestionnaire::new(cat_questionnaire()).unwrap();
    AdaptiveQuestionnaireTask::new(instrument, SessionContext::new(server))
}

fn step_id(navigation: &Navigation) -> &str {
    match navigation {
        Navigation::Step(step) => &step.identifier,
        other => panic!("expected a step, got {other:?}"),
    }
}

fn answered_link_ids(body: &Value) -> Vec<String> {
    body["item"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["linkId"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn full_session_reaches_conclusion_with_score() {
    let server = ScriptedServer::with_replies(vec![
        in_progress(boolean_item("A1")),
        in_progress(choice_item("A2")),
        completed(1.0, 0.5),
    ]);
    let instrument = AdaptiveQuestionnaire::new(cat_questionnaire()).unwrap();
    let mut task =
        AdaptiveQuestionnaireTask::new(instrument.clone(), SessionContext::new(server.clone()));
    let mut results = TaskResult::default();

    let intro = task.step_after(None, &results).await.unwrap();
    assert_eq!(step_id(&intro), "introduction");
    assert_eq!(server.request_count(), 0);

    let first = task.step_after(Some("introduction"), &results).await.unwrap();
    assert_eq!(step_id(&first), "A1");
    let opening = server.body(0);
    assert_eq!(opening["status"], "in-progress");
    assert_eq!(opening["contained"][0]["resourceType"], "Questionnaire");
    assert!(answered_link_ids(&opening).is_empty());

    results.record(StepResult::new("A1", Some(StepAnswer::Boolean(true))));
    let second = task.step_after(Some("A1"), &results).await.unwrap();
    assert_eq!(step_id(&second), "A2");
    let Navigation::Step(choice_step) = &second else { unreachable!() };
    let StepKind::Question { choices, .. } = &choice_step.kind else {
        panic!("A2 should be a question step");
    };
    assert_eq!(choices[0].label, "Yes");
    assert_eq!(choices[0].value, "sys≠c1≠Yes");
    assert_eq!(server.body(1)["item"][0]["answer"][0]["valueBoolean"], true);

    let yes = Coding::new(Some("sys"), "c1", Some("Yes"));
    results.record(StepResult::new("A2", Some(StepAnswer::Choice(vec![encode_choice(&yes)]))));
    let conclusion = task.step_after(Some("A2"), &results).await.unwrap();
    let Navigation::Step(conclusion) = conclusion else {
        panic!("expected the conclusion step");
    };
    assert!(conclusion.is_completion());
    assert_eq!(conclusion.text.as_deref(), Some("T-Score: 60.0\nStdErr: 5.0"));
    assert!(task.is_completed());
    assert_eq!(task.state(), &SessionState::Conclusion);

    let last_body = server.body(2);
    assert_eq!(answered_link_ids(&last_body), ["A1", "A2"]);
    assert_eq!(last_body["item"][1]["answer"][0]["valueCoding"]["code"], "c1");

    let finish = task.step_after(Some("conclusion"), &results).await.unwrap();
    assert_eq!(finish, Navigation::Finish);
    assert_eq!(server.request_count(), 3);

    let bundle = instrument
        .generate_response_bundle(&task, &results)
        .unwrap()
        .expect("completed session has a response bundle");
    let responses: Vec<QuestionnaireResponse> = bundle.resources().unwrap();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].is_completed());
    let exported: Vec<_> = responses[0].item.iter().map(|i| i.link_id.as_str()).collect();
    assert_eq!(exported, ["A1", "A2"]);
}

#[tokio::test]
async fn reply_without_items_keeps_answers_already_sent() {
    let server = ScriptedServer::without_echo(vec![
        in_progress(boolean_item("A1")),
        in_progress(boolean_item("A2")),
        completed(0.0, 0.3),
    ]);
    let mut task = task_with(server.clone());
    let mut results = TaskResult::default();
    task.step_after(Some("introduction"), &results).await.unwrap();

    for link_id in ["A1", "A2"] {
        results.record(StepResult::new(link_id, Some(StepAnswer::Boolean(true))));
        task.step_after(Some(link_id), &results).await.unwrap();
    }

    assert!(task.is_completed());
    assert_eq!(answered_link_ids(&server.body(2)), ["A1", "A2"]);
    let last = task.final_response(&results).unwrap().unwrap();
    let kept: Vec<_> = last.item.iter().map(|i| i.link_id.as_str()).collect();
    assert_eq!(kept, ["A1", "A2"]);
}

#[tokio::test]
async fn reply_dropping_some_answers_is_rejected() {
    let server = ScriptedServer::with_replies(vec![
        in_progress(boolean_item("A1")),
        in_progress(boolean_item("A2")),
        Ok(json!({
            "resourceType": "QuestionnaireResponse",
            "status": "in-progress",
            "item": [{"linkId": "A2", "answer": [{"valueBoolean": true}]}],
            "contained": [{"resourceType": "Questionnaire", "item": [boolean_item("A3")]}]
        })),
    ]);
    let mut task = task_with(server.clone());
    let mut results = TaskResult::default();
    task.step_after(Some("introduction"), &results).await.unwrap();
    results.record(StepResult::new("A1", Some(StepAnswer::Boolean(true))));
    task.step_after(Some("A1"), &results).await.unwrap();

    results.record(StepResult::new("A2", Some(StepAnswer::Boolean(true))));
    let err = task.step_after(Some("A2"), &results).await.unwrap_err();

    assert!(matches!(err, InstrumentError::AnswersDropped { link_ids } if link_ids == ["A1"]));
    assert_eq!(task.state(), &SessionState::Question("A2".to_string()));
    assert_eq!(task.history().count(), 2);
}

#[tokio::test]
async fn each_successful_exchange_appends_exactly_one_history_entry() {
    let server = ScriptedServer::with_replies(vec![
        in_progress(boolean_item("A1")),
        in_progress(boolean_item("A2")),
        in_progress(boolean_item("A3")),
    ]);
    let mut task = task_with(server.clone());
    let mut results = TaskResult::default();

    task.step_after(Some("introduction"), &results).await.unwrap();
    let first_entry = task.history().next().cloned().unwrap();

    for (index, link_id) in ["A1", "A2"].into_iter().enumerate() {
        results.record(StepResult::new(link_id, Some(StepAnswer::Boolean(false))));
        task.step_after(Some(link_id), &results).await.unwrap();
        assert_eq!(task.history().count(), index + 2);
    }

    assert_eq!(task.history().next(), Some(&first_entry));
}

#[tokio::test]
async fn in_progress_reply_targets_first_contained_item() {
    let server = ScriptedServer::with_replies(vec![in_progress(boolean_item("Q7"))]);
    let mut task = task_with(server);

    let navigation = task
        .step_after(Some("introduction"), &TaskResult::default())
        .await
        .unwrap();

    assert_eq!(step_id(&navigation), "Q7");
    assert_eq!(task.state(), &SessionState::Question("Q7".to_string()));
    assert!(!task.is_completed());
}

#[tokio::test]
async fn unanswered_question_stays_without_network() {
    let server = ScriptedServer::with_replies(vec![in_progress(boolean_item("A1"))]);
    let mut task = task_with(server.clone());
    let mut results = TaskResult::default();
    task.step_after(Some("introduction"), &results).await.unwrap();

    let navigation = task.step_after(Some("A1"), &results).await.unwrap();
    assert_eq!(navigation, Navigation::Stay);

    results.record(StepResult::new("A1", None));
    let navigation = task.step_after(Some("A1"), &results).await.unwrap();
    assert_eq!(navigation, Navigation::Stay);

    assert_eq!(server.request_count(), 1);
    assert_eq!(task.history().count(), 1);
}

#[tokio::test]
async fn duplicate_answer_is_rejected_before_any_request() {
    let server = ScriptedServer::with_replies(Vec::new());
    let instrument = AdaptiveQuestionnaire::new(cat_questionnaire()).unwrap();

    let mut prior = instrument.new_response();
    prior
        .push_item(ResponseItem::new("A1").with_answer(AnswerValue::Boolean(true)))
        .unwrap();
    let before = prior.clone();

    let duplicate = ResponseItem::new("A1").with_answer(AnswerValue::Boolean(false));
    let result = instrument
        .next_q(server.as_ref(), Some(duplicate), Some(&prior))
        .await;

    assert!(matches!(result, Err(InstrumentError::DuplicateAnswer { link_id }) if link_id == "A1"));
    assert_eq!(prior, before);
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn failed_exchange_leaves_session_untouched_and_can_be_retried() {
    let server = ScriptedServer::with_replies(vec![
        in_progress(boolean_item("A1")),
        Err(ServerError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }),
    ]);
    let mut task = task_with(server.clone());
    let mut results = TaskResult::default();
    task.step_after(Some("introduction"), &results).await.unwrap();

    results.record(StepResult::new("A1", Some(StepAnswer::Boolean(true))));
    let err = task.step_after(Some("A1"), &results).await.unwrap_err();
    assert!(matches!(err, InstrumentError::Server(ServerError::Status { status: 503, .. })));
    assert_eq!(task.state(), &SessionState::Question("A1".to_string()));
    assert_eq!(task.history().count(), 1);
    assert!(task.latest_response().unwrap().item.is_empty());

    server.push_reply(in_progress(boolean_item("A2")));
    let retried = task.step_after(Some("A1"), &results).await.unwrap();
    assert_eq!(step_id(&retried), "A2");
    assert_eq!(answered_link_ids(&server.body(2)), ["A1"]);
}

#[tokio::test]
async fn step_back_then_same_answer_restores_without_network() {
    let server = ScriptedServer::with_replies(vec![
        in_progress(boolean_item("A1")),
        in_progress(boolean_item("A2")),
    ]);
    let mut task = task_with(server.clone());
    let mut results = TaskResult::default();
    task.step_after(Some("introduction"), &results).await.unwrap();
    results.record(StepResult::new("A1", Some(StepAnswer::Boolean(true))));
    task.step_after(Some("A1"), &results).await.unwrap();
    assert_eq!(task.history().count(), 2);

    let back = task.step_before("A2").expect("A2 can step back");
    assert_eq!(back.identifier, "A1");
    assert_eq!(task.history().count(), 1);

    let forward = task.step_after(Some("A1"), &results).await.unwrap();
    assert_eq!(step_id(&forward), "A2");
    assert_eq!(task.history().count(), 2);
    assert_eq!(server.request_count(), 2);
}

#[tokio::test]
async fn step_back_then_new_answer_resubmits_without_duplicates() {
    let server = ScriptedServer::with_replies(vec![
        in_progress(boolean_item("A1")),
        in_progress(boolean_item("A2")),
        in_progress(boolean_item("B2")),
    ]);
    let mut task = task_with(server.clone());
    let mut results = TaskResult::default();
    task.step_after(Some("introduction"), &results).await.unwrap();
    results.record(StepResult::new("A1", Some(StepAnswer::Boolean(true))));
    task.step_after(Some("A1"), &results).await.unwrap();

    task.step_before("A2").unwrap();
    results.record(StepResult::new("A1", Some(StepAnswer::Boolean(false))));
    let forward = task.step_after(Some("A1"), &results).await.unwrap();

    assert_eq!(step_id(&forward), "B2");
    assert_eq!(task.history().count(), 2);
    let resubmitted = server.body(2);
    assert_eq!(answered_link_ids(&resubmitted), ["A1"]);
    assert_eq!(resubmitted["item"][0]["answer"][0]["valueBoolean"], false);
}

#[tokio::test]
async fn stepping_back_from_first_question_returns_to_introduction() {
    let server = ScriptedServer::with_replies(vec![in_progress(boolean_item("A1"))]);
    let mut task = task_with(server.clone());
    task.step_after(Some("introduction"), &TaskResult::default())
        .await
        .unwrap();

    let back = task.step_before("A1").unwrap();
    assert_eq!(back.identifier, "introduction");
    assert_eq!(task.state(), &SessionState::Introduction);
    assert!(task.step_before("introduction").is_none());

    let forward = task
        .step_after(Some("introduction"), &TaskResult::default())
        .await
        .unwrap();
    assert_eq!(step_id(&forward), "A1");
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn stale_step_replay_returns_current_step() {
    let server = ScriptedServer::with_replies(vec![in_progress(boolean_item("A1"))]);
    let mut task = task_with(server.clone());
    task.step_after(Some("introduction"), &TaskResult::default())
        .await
        .unwrap();

    let replay = task
        .step_after(Some("introduction"), &TaskResult::default())
        .await
        .unwrap();

    assert_eq!(step_id(&replay), "A1");
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn slow_server_times_out_and_session_stays_put() {
    let instrument = AdaptiveQuestionnaire::new(cat_questionnaire()).unwrap();
    let context = SessionContext::new(Arc::new(SilentServer))
        .with_round_trip_timeout(Duration::from_millis(50));
    let mut task = AdaptiveQuestionnaireTask::new(instrument, context);

    let err = task
        .step_after(Some("introduction"), &TaskResult::default())
        .await
        .unwrap_err();

    assert!(matches!(err, InstrumentError::Timeout(d) if d == Duration::from_millis(50)));
    assert_eq!(task.state(), &SessionState::Introduction);
    assert_eq!(task.history().count(), 0);
}

#[tokio::test]
async fn in_progress_reply_without_next_item_is_an_error() {
    let server = ScriptedServer::with_replies(vec![Ok(json!({
        "resourceType": "QuestionnaireResponse",
        "status": "in-progress"
    }))]);
    let mut task = task_with(server);

    let err = task
        .step_after(Some("introduction"), &TaskResult::default())
        .await
        .unwrap_err();

    assert!(matches!(err, InstrumentError::MissingNextItem));
    assert_eq!(task.state(), &SessionState::Introduction);
}

#[tokio::test]
async fn completion_without_scores_still_concludes() {
    let server = ScriptedServer::with_replies(vec![Ok(json!({
        "resourceType": "QuestionnaireResponse",
        "status": "completed"
    }))]);
    let mut task = task_with(server);

    let navigation = task
        .step_after(Some("introduction"), &TaskResult::default())
        .await
        .unwrap();

    let Navigation::Step(step) = navigation else {
        panic!("expected the conclusion step");
    };
    assert!(step.is_completion());
    assert!(task.is_completed());
    assert!(task.score().is_none());
}

#[test]
fn questionnaire_without_id_or_absolute_url_cannot_be_adaptive() {
    let questionnaire = Questionnaire {
        url: Some("relative/only".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        AdaptiveQuestionnaire::new(questionnaire),
        Err(InstrumentError::MissingQuestionnaireUrl)
    ));

    let absolute = Questionnaire {
        url: Some("https://cat.example.org/fhir/Questionnaire/pf-cat".to_string()),
        ..Default::default()
    };
    let instrument = AdaptiveQuestionnaire::new(absolute).unwrap();
    assert_eq!(
        instrument.next_q_target(),
        "https://cat.example.org/fhir/Questionnaire/pf-cat/next-q"
    );
}

#[test]
fn fresh_response_carries_session_bookkeeping() {
    let instrument = AdaptiveQuestionnaire::new(cat_questionnaire()).unwrap();
    let response = instrument.new_response();

    assert!(response.id.is_some());
    assert!(!response.is_completed());
    assert_eq!(response.questionnaire.as_deref(), Some("Questionnaire/pf-cat"));
    assert!(response.extension(fhir_urls::EXPIRATION_TIME).is_some());
    assert!(response.extension(fhir_urls::FINISHED_TIME).is_some());

    let authored = response.authored_at().unwrap();
    let expires: jiff::Timestamp = response
        .extension(fhir_urls::EXPIRATION_TIME)
        .and_then(|e| e.value_string())
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(expires.duration_since(authored), jiff::SignedDuration::from_hours(24));

    let snapshot = response.contained_questionnaire().unwrap();
    assert_eq!(snapshot.id.as_deref(), Some("pf-cat"));
    assert!(snapshot.item.is_empty());
}
