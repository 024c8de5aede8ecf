mod auth;

pub use auth::{AuthState, auth_middleware};
