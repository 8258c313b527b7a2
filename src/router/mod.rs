//! API Router
//!
//! Maps a request method and path to a gateway endpoint.

use thiserror::Error;

/// Router errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },
}

impl RouterError {
    pub fn status_code(&self) -> u16 {
        match self {
            RouterError::NotFound(_) => 404,
            RouterError::MethodNotAllowed { .. } => 405,
        }
    }
}

/// Gateway endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRoute {
    /// GET /health
    Health,
    /// POST /api/upload-url
    UploadUrl,
    /// POST /api/upload
    Upload,
    /// POST /api/preview-notify
    PreviewNotify,
}

impl ApiRoute {
    /// Resolve a request; a single trailing slash is tolerated
    pub fn parse(method: &str, path: &str) -> Result<ApiRoute, RouterError> {
        let normalized = match path.strip_suffix('/') {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => path,
        };

        let (route, allowed) = match normalized {
            "/health" => (ApiRoute::Health, "GET"),
            "/api/upload-url" => (ApiRoute::UploadUrl, "POST"),
            "/api/upload" => (ApiRoute::Upload, "POST"),
            "/api/preview-notify" => (ApiRoute::PreviewNotify, "POST"),
            _ => return Err(RouterError::NotFound(path.to_string())),
        };

        if method != allowed {
            return Err(RouterError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            });
        }

        Ok(route)
    }

    /// Method accepted by this route
    pub fn method(&self) -> &'static str {
        match self {
            ApiRoute::Health => "GET",
            _ => "POST",
        }
    }

    /// Label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            ApiRoute::Health => "health",
            ApiRoute::UploadUrl => "upload_url",
            ApiRoute::Upload => "upload",
            ApiRoute::PreviewNotify => "preview_notify",
        }
    }
}
