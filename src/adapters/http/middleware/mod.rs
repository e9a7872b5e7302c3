//! HTTP middleware for cross-cutting concerns.

pub mod auth;

pub use auth::{auth_middleware, AuthenticatedAccount, JwtValidator, RequireAccount};
