use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use easipro_core::models::questionnaire::Questionnaire;
use easipro_server::client::{AdaptiveServer, Credentials, basic_auth_header};
use easipro_server::error::ServerError;
use easipro_server::handler::{FhirRequest, ParseMode, RequestHandler, decode};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> Credentials {
    Credentials {
        client_id: "2F984419-5008-4E42-8210-68592B418233".to_string(),
        client_secret: "21A673E8-9498-4DC2-AAB6-07395029A778".to_string(),
    }
}

fn server_at(base: &str) -> AdaptiveServer {
    AdaptiveServer::new(base, &credentials(), Duration::from_secs(5))
        .expect("server should be constructed")
}

#[test]
fn basic_auth_header_decodes_to_id_and_secret() {
    let header = basic_auth_header(&credentials());
    let encoded = header.strip_prefix("Basic ").expect("Basic scheme");
    let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
    assert_eq!(
        decoded,
        "2F984419-5008-4E42-8210-68592B418233:21A673E8-9498-4DC2-AAB6-07395029A778"
    );
}

#[test]
fn every_built_request_carries_auth_and_fhir_content_type() {
    let server = server_at("https://cat.example.org/fhir");
    let requests = [
        FhirRequest::get("Questionnaire?_summary=true"),
        FhirRequest::post(
            "Questionnaire/abc/next-q",
            json!({"resourceType": "QuestionnaireResponse"}),
        ),
        FhirRequest::get("https://other.example.org/fhir/Questionnaire/x"),
    ];

    for request in &requests {
        let built = server.build_request(request).unwrap();
        let auth = built.headers()["authorization"].to_str().unwrap();
        let encoded = auth.strip_prefix("Basic ").expect("Basic scheme");
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(
            decoded,
            format!("{}:{}", credentials().client_id, credentials().client_secret)
        );
        assert_eq!(
            built.headers()["content-type"].to_str().unwrap(),
            "application/fhir+json"
        );
    }
}

#[test]
fn relative_targets_resolve_below_base_path() {
    let server = server_at("https://cat.example.org/fhir");
    let url = server.resolve("Questionnaire/abc/next-q").unwrap();
    assert_eq!(url.as_str(), "https://cat.example.org/fhir/Questionnaire/abc/next-q");

    let absolute = server.resolve("https://q.example.org/Questionnaire/1/next-q").unwrap();
    assert_eq!(absolute.as_str(), "https://q.example.org/Questionnaire/1/next-q");
}

#[test]
fn non_http_base_url_is_rejected() {
    let result =
        AdaptiveServer::new("ftp://cat.example.org", &credentials(), Duration::from_secs(5));
    assert!(matches!(result, Err(ServerError::InvalidUrl(_))));

    let result = AdaptiveServer::new("not a url", &credentials(), Duration::from_secs(5));
    assert!(matches!(result, Err(ServerError::InvalidUrl(_))));
}

#[test]
fn strict_mode_requires_resource_type() {
    let body = json!({"id": "q1", "title": "No type"});

    let lenient: Questionnaire = decode(body.clone(), ParseMode::Lenient).unwrap();
    assert_eq!(lenient.id.as_deref(), Some("q1"));

    let strict = decode::<Questionnaire>(body, ParseMode::Strict);
    assert!(matches!(strict, Err(ServerError::ResponseParse(_))));
}

#[test]
fn mismatched_resource_type_is_rejected() {
    let body = json!({"resourceType": "Patient", "id": "p1"});
    let result = decode::<Questionnaire>(body, ParseMode::Lenient);
    assert!(matches!(result, Err(ServerError::Resource(_))));
}

#[tokio::test]
async fn discover_sends_credentials_and_returns_questionnaires() {
    let mock = MockServer::start().await;
    let expected_auth = basic_auth_header(&credentials());

    Mock::given(method("GET"))
        .and(path("/fhir/Questionnaire"))
        .and(query_param("_summary", "true"))
        .and(header("authorization", expected_auth.as_str()))
        .and(header("content-type", "application/fhir+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                {"resource": {"resourceType": "Questionnaire", "id": "pf-cat", "title": "PROMIS Physical Function CAT", "vendorField": 1}},
                {"resource": {"resourceType": "OperationOutcome", "issue": []}},
                {"resource": {"resourceType": "Questionnaire", "id": "anx-cat", "title": "PROMIS Anxiety CAT"}}
            ]
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let server = server_at(&format!("{}/fhir", mock.uri()));
    let questionnaires = server.discover().await.unwrap();

    let ids: Vec<_> = questionnaires.iter().filter_map(|q| q.id.as_deref()).collect();
    assert_eq!(ids, ["pf-cat", "anx-cat"]);
    assert_eq!(questionnaires[0].extra["vendorField"], 1);
}

#[tokio::test]
async fn post_body_is_sent_as_fhir_json() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/fhir/Questionnaire/pf-cat/next-q"))
        .and(header("content-type", "application/fhir+json"))
        .and(body_partial_json(json!({"resourceType": "QuestionnaireResponse", "status": "in-progress"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "QuestionnaireResponse",
            "status": "completed"
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let server = server_at(&format!("{}/fhir/", mock.uri()));
    let reply = server
        .perform(FhirRequest::post(
            "Questionnaire/pf-cat/next-q",
            json!({"resourceType": "QuestionnaireResponse", "status": "in-progress"}),
        ))
        .await
        .unwrap();

    assert_eq!(reply["status"], "completed");
}

#[tokio::test]
async fn operation_outcome_is_reported_as_error() {
    let mock = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Questionnaire/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "code": "not-found", "diagnostics": "Questionnaire/missing not found"}]
        })))
        .mount(&mock)
        .await;

    let server = server_at(&mock.uri());
    let err = server.fetch_questionnaire("missing").await.unwrap_err();
    match err {
        ServerError::OperationOutcome(message) => {
            assert_eq!(message, "Questionnaire/missing not found");
        }
        other => panic!("expected OperationOutcome, got {other:?}"),
    }
}

#[tokio::test]
async fn non_success_status_without_outcome_keeps_body() {
    let mock = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Questionnaire/broken"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&mock)
        .await;

    let server = server_at(&mock.uri());
    let err = server.fetch_questionnaire("broken").await.unwrap_err();
    match err {
        ServerError::Status { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_json_is_a_parse_error() {
    let mock = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Questionnaire/garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&mock)
        .await;

    let server = server_at(&mock.uri());
    let err = server.fetch_questionnaire("garbled").await.unwrap_err();
    assert!(matches!(err, ServerError::ResponseParse(_)));
}
