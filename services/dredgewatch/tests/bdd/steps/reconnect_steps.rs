//! BDD step definitions for reconnection feature

use std::time::Duration;

use cucumber::{given, then, when};

use dredgewatch::reconnect::{ReconnectPolicy, RetryDecision};

use crate::world::DredgeWorld;

#[given("the default reconnection policy")]
fn default_policy(world: &mut DredgeWorld) {
    world.policy = Some(ReconnectPolicy::default());
}

#[given(expr = "a reconnection policy with a {int} ms delay and {int} retries")]
fn custom_policy(world: &mut DredgeWorld, delay_ms: u64, max_retries: u32) {
    world.policy = Some(ReconnectPolicy::new(
        Duration::from_millis(delay_ms),
        max_retries,
    ));
}

#[when(expr = "a failure is observed after {int} failed attempts")]
fn failure_observed(world: &mut DredgeWorld, retries: u32) {
    let policy = world.policy.expect("policy not set");
    world.decision = Some(policy.evaluate(retries));
}

#[then(expr = "the retry delay is {int} milliseconds")]
fn retry_delay_is(world: &mut DredgeWorld, delay_ms: u64) {
    let policy = world.policy.expect("policy not set");
    assert_eq!(policy.retry_delay(), Duration::from_millis(delay_ms));
}

#[then(expr = "the retry budget is {int}")]
fn retry_budget_is(world: &mut DredgeWorld, max_retries: u32) {
    let policy = world.policy.expect("policy not set");
    assert_eq!(policy.max_retries, max_retries);
}

#[then(expr = "a retry is scheduled after {int} ms with the counter at {int}")]
fn retry_scheduled(world: &mut DredgeWorld, delay_ms: u64, retries: u32) {
    assert_eq!(
        world.decision,
        Some(RetryDecision::RetryAfter {
            delay: Duration::from_millis(delay_ms),
            retries,
        })
    );
}

#[then(expr = "the channel gives up with the counter at {int}")]
fn channel_gives_up(world: &mut DredgeWorld, retries: u32) {
    assert_eq!(world.decision, Some(RetryDecision::GiveUp { retries }));
}
