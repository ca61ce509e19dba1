//! Response rendering.
//!
//! # Responsibilities
//! - Turn a decision into status, identity headers and a short HTML page
//! - Add the Basic challenge to 401 responses
//! - Render health reports as JSON
//!
//! # Design Decisions
//! - The ingress only looks at status and headers; the body is for humans
//!   hitting the endpoint directly
//! - Identity headers are only set on allowed, authenticated decisions

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;

use crate::decision::AuthorizationDecision;
use crate::health::HealthReport;

pub const X_USER: HeaderName = HeaderName::from_static("x-user");
pub const X_GROUPS: HeaderName = HeaderName::from_static("x-groups");

/// Render a decision.
pub fn decision_response(decision: &AuthorizationDecision) -> Response {
    let (title, message) = page_text(decision.status);
    let mut response = (decision.status, page(title, message)).into_response();
    let headers = response.headers_mut();

    if let Some(challenge) = decision.challenge() {
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            headers.insert(header::WWW_AUTHENTICATE, value);
        }
    }

    if let Some(username) = &decision.username {
        let groups = decision
            .matched_groups
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");

        // Names that are not valid header values are left out rather than mangled
        match (HeaderValue::from_str(username), HeaderValue::from_str(&groups)) {
            (Ok(user), Ok(groups)) => {
                headers.insert(X_USER, user);
                headers.insert(X_GROUPS, groups);
            }
            _ => tracing::warn!(username = %username, "Identity cannot be encoded as response headers"),
        }
    }

    response
}

/// Render an internal failure.
pub fn internal_error() -> Response {
    let (title, message) = page_text(StatusCode::INTERNAL_SERVER_ERROR);
    (StatusCode::INTERNAL_SERVER_ERROR, page(title, message)).into_response()
}

/// Render a health report; 503 unless every backend is healthy.
pub fn health_response(report: HealthReport) -> Response {
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

fn page_text(status: StatusCode) -> (&'static str, &'static str) {
    match status {
        StatusCode::OK => ("Authorized", "You are authorized to access the requested resource"),
        StatusCode::UNAUTHORIZED => ("Unauthorized", "Valid credentials are required to access this resource"),
        StatusCode::FORBIDDEN => ("Forbidden", "You are not allowed to access the requested resource"),
        StatusCode::TOO_MANY_REQUESTS => (
            "Too Many Requests",
            "Too many failed attempts, try again later",
        ),
        _ => ("Error", "An error occurred while processing your request"),
    }
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p></body></html>\n"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::BackendHealth;
    use crate::health::HealthReport;
    use std::collections::BTreeSet;

    fn decision(status: StatusCode, username: Option<&str>, groups: &[&str]) -> AuthorizationDecision {
        AuthorizationDecision {
            status,
            username: username.map(str::to_string),
            matched_groups: groups.iter().map(|g| g.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_allowed_sets_identity_headers() {
        let response = decision_response(&decision(StatusCode::OK, Some("alice"), &["staff", "admins"]));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_USER], "alice");
        assert_eq!(response.headers()[X_GROUPS], "admins,staff");
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_public_has_no_identity() {
        let response = decision_response(&decision(StatusCode::OK, None, &[]));
        assert!(response.headers().get(X_USER).is_none());
        assert!(response.headers().get(X_GROUPS).is_none());
    }

    #[test]
    fn test_unauthorized_challenges() {
        let response = decision_response(&decision(StatusCode::UNAUTHORIZED, None, &[]));
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"External Authentication\""
        );
    }

    #[test]
    fn test_health_status_codes() {
        let healthy = HealthReport::from_backends(vec![BackendHealth {
            name: "htpasswd".into(),
            healthy: true,
        }]);
        assert_eq!(health_response(healthy).status(), StatusCode::OK);

        let unhealthy = HealthReport::from_backends(vec![BackendHealth {
            name: "htpasswd".into(),
            healthy: false,
        }]);
        assert_eq!(health_response(unhealthy).status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
