//! Bidirectional conversion between internal canonical types and wire formats
//!
//! `openai` covers the client-facing protocol, `duck` the upstream one.

pub mod duck;
pub mod openai;
