mod common;

use common::{bearer, create_test_server, login, ALEX, EMILY, JORDAN, SARAH};
use serde_json::{json, Value};

#[tokio::test]
async fn test_pass_lifecycle_over_http() {
    let (server, _, clock) = create_test_server();
    let alex = login(&server, ALEX).await;
    let sarah = login(&server, SARAH).await;

    let response = bearer(server.post("/api/v1/passes"), &alex)
        .json(&json!({ "reason": "Library Visit", "destination": "Library", "duration_minutes": 30 }))
        .await;
    assert_eq!(response.status_code(), 201);
    let pass: Value = response.json();
    assert_eq!(pass["status"], "pending");
    let id = pass["id"].as_str().unwrap().to_string();
    assert_eq!(
        response.header("location").to_str().unwrap(),
        format!("/api/v1/passes/{id}")
    );

    let pending: Value = bearer(server.get("/api/v1/passes/pending"), &sarah).await.json();
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let response = bearer(server.post(&format!("/api/v1/passes/{id}/decision")), &sarah)
        .json(&json!({ "action": "approve" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let approved: Value = response.json();
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["tracking"], true);

    let response = bearer(server.post(&format!("/api/v1/passes/{id}/decision")), &sarah)
        .json(&json!({ "action": "reject" }))
        .await;
    assert_eq!(response.status_code(), 409);

    let response = bearer(server.post(&format!("/api/v1/passes/{id}/start")), &alex).await;
    assert_eq!(response.status_code(), 200);

    let response = bearer(server.post(&format!("/api/v1/passes/{id}/location")), &alex)
        .json(&json!({ "lat": 40.713, "lng": -74.006 }))
        .await;
    assert_eq!(response.status_code(), 200);

    // tokens live five minutes in the test config
    clock.advance(time::Duration::minutes(31));
    let alex = login(&server, ALEX).await;
    let mine: Value = bearer(server.get("/api/v1/passes"), &alex).await.json();
    assert!(mine["open"].is_null());
    assert_eq!(mine["history"][0]["status"], "completed");
    assert_eq!(mine["history"][0]["tracking"], false);
}

#[tokio::test]
async fn test_second_open_pass_conflicts() {
    let (server, _, _) = create_test_server();
    let jordan = login(&server, JORDAN).await;
    let body = json!({ "reason": "Other", "destination": "Restroom", "duration_minutes": 15 });

    let first = bearer(server.post("/api/v1/passes"), &jordan).json(&body).await;
    assert_eq!(first.status_code(), 201);
    let second = bearer(server.post("/api/v1/passes"), &jordan).json(&body).await;
    assert_eq!(second.status_code(), 409);
    let err: Value = second.json();
    assert_eq!(err["code"], "already_active");
}

#[tokio::test]
async fn test_bad_duration_and_non_approver() {
    let (server, _, _) = create_test_server();
    let alex = login(&server, ALEX).await;
    let emily = login(&server, EMILY).await;

    let response = bearer(server.post("/api/v1/passes"), &alex)
        .json(&json!({ "reason": "Library Visit", "destination": "Library", "duration_minutes": 20 }))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = bearer(server.get("/api/v1/passes/pending"), &emily).await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_catalog() {
    let (server, _, _) = create_test_server();
    let alex = login(&server, ALEX).await;
    let catalog: Value = bearer(server.get("/api/v1/passes/catalog"), &alex).await.json();
    assert!(catalog["reasons"].as_array().unwrap().contains(&json!("Library Visit")));
    assert!(catalog["destinations"].as_array().unwrap().contains(&json!("Library")));
}
