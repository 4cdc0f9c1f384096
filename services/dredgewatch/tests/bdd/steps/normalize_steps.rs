//! BDD step definitions for normalization feature

use cucumber::{given, then, when};
use serde_json::Value;

use dredgewatch::normalize::{normalize, normalize_latest};

use crate::world::DredgeWorld;

fn parse_record(text: &str) -> Option<Value> {
    match text.trim() {
        "absent" => None,
        json => Some(serde_json::from_str(json).expect("invalid JSON in feature file")),
    }
}

#[given(regex = r"^a backend response (.+)$")]
fn backend_response(world: &mut DredgeWorld, response: String) {
    world.raw_response =
        Some(serde_json::from_str(response.trim()).expect("invalid JSON in feature file"));
}

#[when("the response is normalized")]
fn response_normalized(world: &mut DredgeWorld) {
    let raw = world.raw_response.clone().expect("response not set");
    world.normalized = Some(normalize(raw));
}

#[when("the response is normalized for polling")]
fn response_normalized_latest(world: &mut DredgeWorld) {
    let raw = world.raw_response.clone().expect("response not set");
    world.normalized = Some(normalize_latest(raw));
}

#[then(regex = r"^the normalized record is (.+)$")]
fn normalized_record_is(world: &mut DredgeWorld, expected: String) {
    let normalized = world.normalized.clone().expect("response not normalized");
    assert_eq!(normalized, parse_record(&expected));
}
