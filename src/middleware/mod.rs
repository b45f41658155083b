pub mod auth;
pub mod cors;

pub use auth::admin_auth_middleware;
pub use cors::create_cors_layer;
