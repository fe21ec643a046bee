//! Middleware module
//!
//! Bearer-token gate for protected scopes.

mod jwt_middleware;

pub use jwt_middleware::{AuthenticatedUser, JwtMiddleware};
