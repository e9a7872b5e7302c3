//! Handlers orchestrating domain logic through the ports.

pub mod subscription;
