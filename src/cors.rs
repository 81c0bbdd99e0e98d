//! CORS policy: preflight answers and response header injection.

use crate::http::{Headers, StandardHeader};

/// The three `Access-Control-Allow-*` values the router injects.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    pub allowed_origins: String,
    pub allowed_methods: String,
    pub allowed_headers: String,
}

impl CorsPolicy {
    pub fn new(
        allowed_origins: impl Into<String>,
        allowed_methods: impl Into<String>,
        allowed_headers: impl Into<String>,
    ) -> Self {
        Self {
            allowed_origins: allowed_origins.into(),
            allowed_methods: allowed_methods.into(),
            allowed_headers: allowed_headers.into(),
        }
    }

    /// Set the three policy headers.
    pub fn apply(&self, headers: &mut Headers) {
        headers.set_std(
            StandardHeader::AccessControlAllowOrigin,
            self.allowed_origins.clone(),
        );
        headers.set_std(
            StandardHeader::AccessControlAllowMethods,
            self.allowed_methods.clone(),
        );
        headers.set_std(
            StandardHeader::AccessControlAllowHeaders,
            self.allowed_headers.clone(),
        );
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_origins: "*".to_string(),
            allowed_methods: "GET, POST, PUT, DELETE, OPTIONS".to_string(),
            allowed_headers: "Content-Type, Authorization".to_string(),
        }
    }
}
