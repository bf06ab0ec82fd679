use axum::http::{Method, StatusCode};
use axum::Router;
use tower::ServiceExt;

use crate::test_support::{self, json_request, read_json};

async fn create_candidate(app: &Router, first_name: &str, last_name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/candidates",
            Some(serde_json::json!({"first_name": first_name, "last_name": last_name})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await["candidate_public_id"].as_str().expect("candidate id").to_string()
}

async fn create_assignment(app: &Router, title: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/assignments",
            Some(serde_json::json!({"title": title, "description": "Implement the thing"})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await["assignment_public_id"].as_str().expect("assignment id").to_string()
}

#[tokio::test]
async fn root_returns_service_banner() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["message"], "Gradeflow API");
}

#[tokio::test]
async fn health_reports_database_component() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/health", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["role"], "api");
    assert_eq!(json["components"]["database"], "healthy");
}

#[tokio::test]
async fn ready_without_worker_reports_loop_disabled() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/ready", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["worker_loop_enabled"], false);
    assert_eq!(json["worker_metrics"]["ticks_total"], 0);
}

#[tokio::test]
async fn metrics_disabled_returns_404() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/metrics", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submission_create_and_status_trace() {
    let ctx = test_support::setup_test_context().await;
    let candidate_id = create_candidate(&ctx.app, "Jane", "Doe").await;
    let assignment_id = create_assignment(&ctx.app, "FizzBuzz").await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/submissions",
            Some(serde_json::json!({
                "source_external_id": "cli-upload-1",
                "candidate_public_id": candidate_id,
                "assignment_public_id": assignment_id,
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let created = read_json(response).await;
    assert_eq!(created["state"], "uploaded");
    assert_eq!(created["created"], true);
    let submission_id = created["submission_id"].as_str().expect("submission id");
    assert!(submission_id.starts_with("sub_"));

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, &format!("/submissions/{submission_id}"), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let status = read_json(response).await;
    assert_eq!(status["state"], "uploaded");
    assert_eq!(status["candidate_public_id"], candidate_id);
    assert_eq!(status["assignment_public_id"], assignment_id);
    assert_eq!(status["attempts"]["normalization"], 0);
    assert_eq!(status["artifacts"], serde_json::json!({}));
    assert!(status["last_error_code"].is_null());
}

#[tokio::test]
async fn submission_validation_and_not_found() {
    let ctx = test_support::setup_test_context().await;
    let candidate_id = create_candidate(&ctx.app, "Jane", "Doe").await;

    // Malformed assignment id.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/submissions",
            Some(serde_json::json!({
                "source_external_id": "x",
                "candidate_public_id": candidate_id,
                "assignment_public_id": "asg_nope",
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Well-formed but unknown candidate.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/submissions",
            Some(serde_json::json!({
                "source_external_id": "x",
                "candidate_public_id": "cand_01J8ZC3A6W5V9XKQ4T2M7R8DNE",
                "assignment_public_id": "asg_01J8ZC3A6W5V9XKQ4T2M7R8DNF",
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            "/submissions/sub_01J8ZC3A6W5V9XKQ4T2M7R8DNE",
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_is_idempotent_by_update_id() {
    let ctx = test_support::setup_test_context().await;
    let candidate_id = create_candidate(&ctx.app, "Jane", "Doe").await;
    let assignment_id = create_assignment(&ctx.app, "FizzBuzz").await;

    let body = serde_json::json!({
        "update_id": "42",
        "candidate_public_id": candidate_id,
        "assignment_public_id": assignment_id,
        "file_id": "tg-file-1",
        "file_name": "solution.md",
        "chat_id": 1001,
    });

    let first = ctx
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/webhooks/telegram", Some(body.clone())))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);
    let first = read_json(first).await;
    assert_eq!(first["state"], "telegram_update_received");
    assert_eq!(first["created"], true);

    let second = ctx
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/webhooks/telegram", Some(body)))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::OK);
    let second = read_json(second).await;
    assert_eq!(second["created"], false);
    assert_eq!(second["submission_id"], first["submission_id"]);

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM submissions")
        .fetch_one(ctx.state.db())
        .await
        .expect("count");
    assert_eq!(count, 1);

    // Replays observe identical state.
    let submission_id = first["submission_id"].as_str().expect("submission id");
    let status_a = read_json(
        ctx.app
            .clone()
            .oneshot(json_request(Method::GET, &format!("/submissions/{submission_id}"), None))
            .await
            .expect("response"),
    )
    .await;
    let status_b = read_json(
        ctx.app
            .clone()
            .oneshot(json_request(Method::GET, &format!("/submissions/{submission_id}"), None))
            .await
            .expect("response"),
    )
    .await;
    assert_eq!(status_a, status_b);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_webhooks_with_same_update_id_create_one_submission() {
    let ctx = test_support::setup_test_context().await;
    let candidate_id = create_candidate(&ctx.app, "Jane", "Doe").await;
    let assignment_id = create_assignment(&ctx.app, "FizzBuzz").await;

    let body = serde_json::json!({
        "update_id": "777",
        "candidate_public_id": candidate_id,
        "assignment_public_id": assignment_id,
        "file_id": "tg-file-7",
    });

    let app_a = ctx.app.clone();
    let app_b = ctx.app.clone();
    let body_a = body.clone();
    let task_a = tokio::spawn(async move {
        app_a.oneshot(json_request(Method::POST, "/webhooks/telegram", Some(body_a))).await
    });
    let task_b = tokio::spawn(async move {
        app_b.oneshot(json_request(Method::POST, "/webhooks/telegram", Some(body))).await
    });

    let response_a = task_a.await.expect("join").expect("response");
    let response_b = task_b.await.expect("join").expect("response");
    assert_eq!(response_a.status(), StatusCode::OK);
    assert_eq!(response_b.status(), StatusCode::OK);

    let json_a = read_json(response_a).await;
    let json_b = read_json(response_b).await;
    assert_eq!(json_a["submission_id"], json_b["submission_id"]);

    let count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM submission_sources
         WHERE source_type = 'telegram_webhook' AND source_external_id = '777'",
    )
    .fetch_one(ctx.state.db())
    .await
    .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn feedback_lists_only_evaluated_submissions() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/feedback", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["items"], serde_json::json!([]));
}

#[tokio::test]
async fn assignments_list_respects_active_filter() {
    let ctx = test_support::setup_test_context().await;

    create_assignment(&ctx.app, "Active one").await;
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/assignments",
            Some(serde_json::json!({
                "title": "Retired",
                "description": "Old task",
                "is_active": false,
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(
        ctx.app
            .clone()
            .oneshot(json_request(Method::GET, "/assignments", None))
            .await
            .expect("response"),
    )
    .await;
    assert_eq!(json["items"].as_array().expect("items").len(), 1);

    let json = read_json(
        ctx.app
            .clone()
            .oneshot(json_request(Method::GET, "/assignments?active_only=false", None))
            .await
            .expect("response"),
    )
    .await;
    assert_eq!(json["items"].as_array().expect("items").len(), 2);
}
