//! Responses produced by simulated operations.
//!
//! The mock never talks HTTP itself; operations return an [`ApiResponse`]
//! value that a route layer (out of scope here) would encode onto the wire.

use serde_json::{json, Value};

/// Status codes used by the simulated operations.
pub mod status {
    /// Successful read.
    pub const OK: u16 = 200;
    /// Creation accepted.
    pub const ACCEPTED: u16 = 202;
    /// Successful deletion, no body.
    pub const NO_CONTENT: u16 = 204;
    /// Request-level validation failure.
    pub const BAD_REQUEST: u16 = 400;
    /// Lookup by id failed.
    pub const NOT_FOUND: u16 = 404;
    /// Simulated server-side failure.
    pub const INTERNAL_ERROR: u16 = 500;
}

/// Callback producing absolute URLs from path segments.
///
/// Injected on every request so entities never remember their own hostname;
/// the same server can be addressed under different hostnames across
/// requests.
pub type UrlResolver = dyn Fn(&str) -> String;

/// Status code plus optional JSON body, as produced by one simulated
/// operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP-equivalent status code.
    pub status: u16,
    /// JSON body, absent for bodiless statuses like 204 and 404.
    pub body: Option<Value>,
}

impl ApiResponse {
    /// A response with a JSON body.
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    /// A bodiless response.
    pub fn empty(status: u16) -> Self {
        Self { status, body: None }
    }

    /// The 404 shape shared by every lookup operation.
    pub fn not_found() -> Self {
        Self::empty(status::NOT_FOUND)
    }

    /// A structured error response embedding `code` and `message`.
    pub fn fault(status: u16, message: &str) -> Self {
        Self::json(status, error_payload(message, status))
    }
}

/// The `{message, code}` error body used for validation and simulated
/// failures.
pub fn error_payload(message: &str, code: u16) -> Value {
    json!({
        "message": message,
        "code": code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_embeds_code_and_message() {
        let response = ApiResponse::fault(503, "boom");
        assert_eq!(response.status, 503);
        let body = response.body.unwrap();
        assert_eq!(body["code"], 503);
        assert_eq!(body["message"], "boom");
    }

    #[test]
    fn empty_has_no_body() {
        let response = ApiResponse::empty(status::NO_CONTENT);
        assert_eq!(response.status, 204);
        assert!(response.body.is_none());
    }
}
