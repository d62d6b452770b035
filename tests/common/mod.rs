//! Shared helpers for HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderValue};
use axum_test::{TestRequest, TestServer};
use schoolops::{app::build_app, clock::FixedClock, state::AppState};
use serde_json::{json, Value};

pub const ALEX: &str = "alex.student@school.edu";
pub const JORDAN: &str = "jordan.student@school.edu";
pub const SARAH: &str = "sarah.teacher@school.edu";
pub const MICHAEL: &str = "michael.admin@school.edu";
pub const EMILY: &str = "emily.parent@gmail.com";
pub const LISA: &str = "lisa.counselor@school.edu";

/// Server over in-memory stores with the clock at Monday 2024-01-15 09:30 UTC.
pub fn create_test_server() -> (TestServer, AppState, Arc<FixedClock>) {
    let (state, clock) = AppState::fake_with_clock();
    let server = TestServer::new(build_app(state.clone())).expect("Failed to create test server");
    (server, state, clock)
}

pub async fn login(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": email, "password": "anything" }))
        .await;
    assert_eq!(response.status_code(), 200, "login failed for {email}");
    let body: Value = response.json();
    body["access_token"].as_str().unwrap().to_string()
}

pub fn bearer(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    )
}
