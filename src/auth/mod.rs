//! Authentication and authorization: token codec, role gate, password
//! hashing, and the axum middleware that wires them into routes.

pub mod middleware;
pub mod password;
pub mod rbac;
pub mod token;

pub use rbac::{authorize, RequiredRole};
pub use token::{Claims, TokenCodec};
