use std::sync::Arc;

use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use serde_json::Value;

use codepad_sandbox::{Dispatcher, Limits};
use codepad_server::config::Config;
use codepad_server::connection::ConnectionIds;
use codepad_server::handlers;
use codepad_server::server::spawn_server;

async fn app(
) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error> {
    // No strategies registered, so nothing here ever spawns an interpreter.
    let dispatcher = Arc::new(Dispatcher::empty(Limits::default()));
    let srv_tx = spawn_server(dispatcher.clone());
    test::init_service(
        App::new()
            .app_data(web::Data::new(srv_tx))
            .app_data(web::Data::from(dispatcher))
            .app_data(web::Data::new(Config::default()))
            .app_data(web::Data::new(ConnectionIds::default()))
            .configure(handlers::root),
    )
    .await
}

async fn create_session(
    app: &impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
    body: &'static str,
) -> Value {
    let req = test::TestRequest::post()
        .uri("/api/sessions")
        .insert_header(("content-type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    test::read_body_json(resp).await
}

#[actix_web::test]
async fn create_session_without_body_uses_javascript() {
    let app = app().await;
    let created = create_session(&app, "").await;

    let id = created["session"]["id"].as_str().expect("id").to_owned();
    assert_eq!(id.len(), 8);
    assert_eq!(created["session"]["language"], "javascript");
    assert_eq!(
        created["shareUrl"],
        format!("http://localhost:5173/session/{}", id)
    );
    assert!(created["session"]["participants"]
        .as_object()
        .expect("participants")
        .is_empty());
}

#[actix_web::test]
async fn create_session_with_language_seeds_template() {
    let app = app().await;
    let created = create_session(&app, r#"{"language":"python"}"#).await;
    assert_eq!(created["session"]["language"], "python");
    assert!(created["session"]["code"]
        .as_str()
        .expect("code")
        .contains("def "));
}

#[actix_web::test]
async fn create_session_rejects_broken_json() {
    let app = app().await;
    let req = test::TestRequest::post()
        .uri("/api/sessions")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn get_session_by_id() {
    let app = app().await;
    let created = create_session(&app, "").await;
    let id = created["session"]["id"].as_str().expect("id");

    let req = test::TestRequest::get()
        .uri(&format!("/api/sessions/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, created["session"]);
}

#[actix_web::test]
async fn unknown_and_malformed_ids() {
    let app = app().await;

    let req = test::TestRequest::get()
        .uri("/api/sessions/deadbeef")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Session not found");

    let req = test::TestRequest::get()
        .uri("/api/sessions/not.an.id")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Malformed session id");
}

#[actix_web::test]
async fn delete_session_once() {
    let app = app().await;
    let created = create_session(&app, "").await;
    let uri = format!("/api/sessions/{}", created["session"]["id"].as_str().expect("id"));

    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn execute_reports_unavailable_language_in_body() {
    let app = app().await;
    let req = test::TestRequest::post()
        .uri("/api/execute")
        .set_json(serde_json::json!({ "language": "cobol", "code": "DISPLAY 'HI'." }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "unavailable");
    assert_eq!(body["error"], "Execution is not available for cobol yet.");
}

#[actix_web::test]
async fn execute_requires_code() {
    let app = app().await;
    let req = test::TestRequest::post()
        .uri("/api/execute")
        .set_json(serde_json::json!({ "language": "python" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().expect("error").contains("code"));
}

#[actix_web::test]
async fn health_counts_sessions() {
    let app = app().await;
    create_session(&app, "").await;
    create_session(&app, "").await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 2);
    assert!(body["interpreters"].as_object().expect("map").is_empty());
}
