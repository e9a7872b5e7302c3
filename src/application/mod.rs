//! Application layer - command and event handlers.

pub mod handlers;
