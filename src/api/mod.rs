//! Typed wrappers over the request pipeline for the endpoints the agent uses.

pub mod activity;
pub mod foods;

/// `-` addresses the user that owns the access token
pub const CURRENT_USER: &str = "-";
