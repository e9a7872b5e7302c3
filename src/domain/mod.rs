//! Domain layer - pure business types and rules.

pub mod foundation;
pub mod subscription;
