//! BDD step definitions for status API feature

use axum::body::Body;
use axum::http::Request;
use cucumber::{given, then, when};
use serde_json::Value;
use tower::ServiceExt;

use dredgewatch::dashboard::{build_router, DashboardState};
use dredgewatch::state::{new_state_handle, FeedStatus};

use crate::world::DredgeWorld;

#[given(expr = "a feed {string} polled from {string}")]
fn polled_feed(world: &mut DredgeWorld, name: String, url: String) {
    world.status_state = Some(new_state_handle(vec![FeedStatus::new(name, url, "poll")], 120));
}

#[given(regex = r#"^the feed "([^"]+)" last returned (.+)$"#)]
async fn feed_last_returned(world: &mut DredgeWorld, name: String, record: String) {
    let record: Value = serde_json::from_str(&record).expect("invalid JSON in feature file");
    let state = world.status_state.as_ref().expect("state not set");
    state.write().await.record_poll(&name, Ok(record), 1000);
}

#[when(expr = "{string} is requested")]
async fn path_requested(world: &mut DredgeWorld, path: String) {
    let state = world
        .status_state
        .as_ref()
        .expect("state not set")
        .clone();
    let app = build_router(DashboardState::new(state));
    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    world.response_status = Some(response.status().as_u16());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    world.response_body = Some(serde_json::from_slice(&body).unwrap_or(Value::Null));
}

#[then(expr = "the response status is {int}")]
fn response_status_is(world: &mut DredgeWorld, status: u16) {
    assert_eq!(world.response_status, Some(status));
}

#[then(regex = r#"^the response field "([^"]+)" is "([^"]*)"$"#)]
fn response_field_is_string(world: &mut DredgeWorld, field: String, expected: String) {
    let body = world.response_body.as_ref().expect("no response body");
    assert_eq!(body[&field], Value::String(expected), "body was {body}");
}

#[then(regex = r#"^the response field "([^"]+)" is (true|false)$"#)]
fn response_field_is_bool(world: &mut DredgeWorld, field: String, expected: String) {
    let body = world.response_body.as_ref().expect("no response body");
    assert_eq!(body[&field], Value::Bool(expected == "true"), "body was {body}");
}
