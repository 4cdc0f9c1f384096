//! BDD step definitions for dredgewatch service

pub mod channel_steps;
pub mod normalize_steps;
pub mod reconnect_steps;
pub mod status_api_steps;
