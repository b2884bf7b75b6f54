//! HTTP surface tests over an in-memory engine

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use fates_api::{create_router, AppState};
use fates_engine::{
    AcknowledgmentExecutor, AutoEscalationExecutor, CoSignService, DecisionPackageService,
    EngineConfig, EscalationQueueService, FateCoordinator, SharedHaltGate, StaticRealmRegistry,
    SubmissionService, ThresholdDetector,
};
use fates_ledger::InMemoryEventLedger;
use fates_store::{InMemoryAcknowledgmentRepository, InMemoryPetitionRepository};

struct TestApp {
    router: Router,
    halt: Arc<SharedHaltGate>,
}

fn test_app() -> TestApp {
    let petitions = Arc::new(InMemoryPetitionRepository::new());
    let acknowledgments = Arc::new(InMemoryAcknowledgmentRepository::new());
    let ledger = Arc::new(InMemoryEventLedger::new());
    let halt = Arc::new(SharedHaltGate::new());
    let config = EngineConfig {
        min_dwell_seconds: 0,
        ..EngineConfig::default()
    };

    let coordinator = FateCoordinator::new(petitions.clone(), Some(ledger.clone()), halt.clone());
    let submission = SubmissionService::new(
        petitions.clone(),
        Arc::new(StaticRealmRegistry::default()),
        halt.clone(),
        coordinator.clone(),
        Some(ledger.clone()),
    );
    let escalation = AutoEscalationExecutor::new(
        petitions.clone(),
        coordinator.clone(),
        Some(ledger.clone()),
        halt.clone(),
    );
    let cosign = CoSignService::new(
        petitions.clone(),
        ThresholdDetector::new(&config),
        escalation,
        halt.clone(),
    );
    let ack_executor = AcknowledgmentExecutor::new(
        acknowledgments,
        petitions.clone(),
        coordinator,
        Some(ledger),
        halt.clone(),
        config,
    );
    let queue = EscalationQueueService::new(petitions.clone(), halt.clone());
    let packages = DecisionPackageService::new(petitions.clone());

    let state = Arc::new(AppState {
        submission,
        cosign,
        acknowledgments: ack_executor,
        queue,
        packages,
        halt_gate: halt.clone(),
    });

    TestApp {
        router: create_router(state),
        halt,
    }
}

async fn request(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn submit_body(text: &str) -> Value {
    json!({"type": "CESSATION", "text": text, "realm": "governance"})
}

async fn escalate_via_cosign(app: &TestApp, petition_id: &str) {
    for _ in 0..100 {
        let (status, _) = request(
            &app.router,
            "POST",
            &format!("/v1/petitions/{petition_id}/cosign"),
            Some(json!({"signer_id": uuid::Uuid::new_v4()})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn submit_returns_201_with_petition() {
    let app = test_app();
    let (status, body) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(submit_body("Halt system X")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "RECEIVED");
    assert_eq!(body["type"], "CESSATION");
    assert_eq!(body["realm"], "governance");
    assert!(body["petition_id"].is_string());
    assert!(body["content_hash"].is_string());
}

#[tokio::test]
async fn submit_rejects_oversized_text_with_400() {
    let app = test_app();
    let (status, body) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(submit_body(&"x".repeat(10_001))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["title"], "VALIDATION_FAILED");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn status_read_and_404() {
    let app = test_app();
    let (_, submitted) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(submit_body("Halt system X")),
    )
    .await;
    let id = submitted["petition_id"].as_str().unwrap();

    let (status, body) = request(&app.router, "GET", &format!("/v1/petitions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "RECEIVED");
    assert_eq!(body["co_signer_count"], 0);
    assert!(body["status_token"].is_number());

    let (status, body) = request(
        &app.router,
        "GET",
        &format!("/v1/petitions/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["title"], "PETITION_NOT_FOUND");
}

#[tokio::test]
async fn withdraw_by_stranger_is_401() {
    let app = test_app();
    let submitter = uuid::Uuid::new_v4();
    let (_, submitted) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(json!({
            "type": "GENERAL",
            "text": "Please revisit the water rights ruling",
            "submitter_id": submitter,
        })),
    )
    .await;
    let id = submitted["petition_id"].as_str().unwrap();

    let (status, _) = request(
        &app.router,
        "POST",
        &format!("/v1/petitions/{id}/withdraw"),
        Some(json!({"requester_id": uuid::Uuid::new_v4()})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = request(
        &app.router,
        "POST",
        &format!("/v1/petitions/{id}/withdraw"),
        Some(json!({"requester_id": submitter})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ACKNOWLEDGED");

    // A second withdrawal hits the terminal guard.
    let (status, _) = request(
        &app.router,
        "POST",
        &format!("/v1/petitions/{id}/withdraw"),
        Some(json!({"requester_id": submitter})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn duplicate_cosign_is_409() {
    let app = test_app();
    let (_, submitted) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(submit_body("Halt system X")),
    )
    .await;
    let id = submitted["petition_id"].as_str().unwrap();
    let signer = uuid::Uuid::new_v4();

    let (status, body) = request(
        &app.router,
        "POST",
        &format!("/v1/petitions/{id}/cosign"),
        Some(json!({"signer_id": signer})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["co_signer_count"], 1);

    let (status, body) = request(
        &app.router,
        "POST",
        &format!("/v1/petitions/{id}/cosign"),
        Some(json!({"signer_id": signer})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["title"], "DUPLICATE_CO_SIGNER");
}

#[tokio::test]
async fn escalation_queue_flow() {
    let app = test_app();
    let (_, submitted) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(submit_body("Halt system X")),
    )
    .await;
    let id = submitted["petition_id"].as_str().unwrap().to_string();
    escalate_via_cosign(&app, &id).await;

    let king_id = uuid::Uuid::new_v4();
    let (status, body) = request(
        &app.router,
        "GET",
        &format!("/v1/kings/{king_id}/escalations?realm=governance&limit=20"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["petition_id"], id.as_str());
    assert_eq!(body["has_more"], false);

    // Malformed cursor -> 400
    let (status, body) = request(
        &app.router,
        "GET",
        &format!("/v1/kings/{king_id}/escalations?realm=governance&cursor=garbage"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["title"], "INVALID_CURSOR");

    // Out-of-range limit -> 400
    let (status, _) = request(
        &app.router,
        "GET",
        &format!("/v1/kings/{king_id}/escalations?realm=governance&limit=101"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn king_acknowledge_realm_and_rationale_rules() {
    let app = test_app();
    let (_, submitted) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(submit_body("Halt system X")),
    )
    .await;
    let id = submitted["petition_id"].as_str().unwrap().to_string();
    escalate_via_cosign(&app, &id).await;

    let king_id = uuid::Uuid::new_v4();

    // Short rationale -> 400
    let (status, _) = request(
        &app.router,
        "POST",
        &format!("/v1/kings/escalations/{id}/acknowledge"),
        Some(json!({
            "king_id": king_id,
            "reason_code": "ADDRESSED",
            "rationale": "too short",
            "realm": "governance",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Wrong realm -> 403
    let (status, body) = request(
        &app.router,
        "POST",
        &format!("/v1/kings/escalations/{id}/acknowledge"),
        Some(json!({
            "king_id": king_id,
            "reason_code": "ADDRESSED",
            "rationale": "r".repeat(150),
            "realm": "economy",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["title"], "REALM_MISMATCH");

    // Correct realm succeeds
    let (status, body) = request(
        &app.router,
        "POST",
        &format!("/v1/kings/escalations/{id}/acknowledge"),
        Some(json!({
            "king_id": king_id,
            "reason_code": "ADDRESSED",
            "rationale": "r".repeat(150),
            "realm": "governance",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["witness_hash"].as_str().unwrap().starts_with("blake3:"));

    // Second attempt -> 409
    let (status, _) = request(
        &app.router,
        "POST",
        &format!("/v1/kings/escalations/{id}/acknowledge"),
        Some(json!({
            "king_id": king_id,
            "reason_code": "ADDRESSED",
            "rationale": "r".repeat(150),
            "realm": "governance",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn decision_package_requires_escalated_and_realm() {
    let app = test_app();
    let (_, submitted) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(submit_body("Halt system X")),
    )
    .await;
    let id = submitted["petition_id"].as_str().unwrap().to_string();

    // Not escalated yet -> 409
    let (status, _) = request(
        &app.router,
        "GET",
        &format!("/v1/kings/escalations/{id}?realm=governance"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    escalate_via_cosign(&app, &id).await;

    let (status, _) = request(
        &app.router,
        "GET",
        &format!("/v1/kings/escalations/{id}?realm=economy"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = request(
        &app.router,
        "GET",
        &format!("/v1/kings/escalations/{id}?realm=governance"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["escalation_source"], "CO_SIGNER_THRESHOLD");
    assert_eq!(body["co_signer_count"], 100);
}

#[tokio::test]
async fn halted_system_returns_503_problem() {
    let app = test_app();
    app.halt.halt("constitutional review");

    let (status, body) = request(
        &app.router,
        "POST",
        "/v1/petitions",
        Some(submit_body("Halt system X")),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["title"], "SYSTEM_HALTED");
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("constitutional review"));

    // Health stays readable and reports the halt.
    let (status, body) = request(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["halted"], true);
}
