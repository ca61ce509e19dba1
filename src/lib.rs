//! External authorization service for ingress auth subrequests.

// Decision core
pub mod auth;
pub mod context;
pub mod decision;
pub mod rules;
pub mod security;

// Shared state
pub mod cache;
pub mod clock;

// Service plumbing
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServiceConfig;
pub use decision::{AuthorizationDecision, DecisionPipeline};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
