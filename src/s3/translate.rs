//! Storage error translation
//!
//! Turns a [`StorageError`] into one stable, user-facing shape. The message
//! carries whatever diagnostics the backend supplied:
//!
//! ```text
//! Upload to storage failed: Access Denied. (status=403, code=AccessDenied, requestId=ABC)
//! ```

use crate::s3::StorageError;
use serde::Serialize;
use std::fmt;

/// Code used when the backend supplied none
pub const UNKNOWN_CODE: &str = "UNKNOWN";

/// Translated storage failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
}

impl fmt::Display for TranslatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TranslatedError {}

/// Translate a storage failure, prefixing the message with `context`
pub fn translate(context: &str, error: &StorageError) -> TranslatedError {
    let status = error.status();
    let code = error.code();
    let request_id = error.request_id().map(str::to_string);

    let detail = error
        .message()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "unknown error".to_string());

    let mut diagnostics = Vec::new();
    if let Some(status) = status {
        diagnostics.push(format!("status={}", status));
    }
    if let Some(ref code) = code {
        diagnostics.push(format!("code={}", code));
    }
    if let Some(ref request_id) = request_id {
        diagnostics.push(format!("requestId={}", request_id));
    }

    let message = if diagnostics.is_empty() {
        format!("{}: {}", context, detail)
    } else {
        format!("{}: {} ({})", context, detail, diagnostics.join(", "))
    };

    TranslatedError {
        status,
        code: code.unwrap_or_else(|| UNKNOWN_CODE.to_string()),
        request_id,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_full_service_error() {
        let error = StorageError::Service {
            status: 403,
            code: Some("AccessDenied".into()),
            message: Some("Access Denied.".into()),
            request_id: Some("ABC".into()),
        };

        let translated = translate("Upload to storage failed", &error);
        assert_eq!(translated.status, Some(403));
        assert_eq!(translated.code, "AccessDenied");
        assert_eq!(translated.request_id.as_deref(), Some("ABC"));
        assert_eq!(
            translated.message,
            "Upload to storage failed: Access Denied. (status=403, code=AccessDenied, requestId=ABC)"
        );
    }

    #[test]
    fn test_translate_partial_diagnostics() {
        let error = StorageError::Service {
            status: 500,
            code: None,
            message: None,
            request_id: None,
        };

        let translated = translate("Upload to storage failed", &error);
        assert_eq!(translated.code, UNKNOWN_CODE);
        assert_eq!(
            translated.message,
            "Upload to storage failed: unknown error (status=500)"
        );
    }

    #[test]
    fn test_translate_without_diagnostics() {
        let error = StorageError::Request("bad".into());
        let translated = translate("Upload to storage failed", &error);
        assert_eq!(translated.status, None);
        assert_eq!(translated.request_id, None);
        assert_eq!(translated.code, UNKNOWN_CODE);
        assert_eq!(
            translated.message,
            "Upload to storage failed: Invalid storage request: bad"
        );
    }

    #[test]
    fn test_translate_blank_message_is_unknown() {
        let error = StorageError::Service {
            status: 404,
            code: Some("NoSuchUpload".into()),
            message: Some("  ".into()),
            request_id: None,
        };
        let translated = translate("ctx", &error);
        assert_eq!(
            translated.message,
            "ctx: unknown error (status=404, code=NoSuchUpload)"
        );
    }

    #[test]
    fn test_translated_error_serializes_camel_case() {
        let translated = TranslatedError {
            status: Some(403),
            code: "AccessDenied".into(),
            request_id: Some("ABC".into()),
            message: "m".into(),
        };
        let json = serde_json::to_value(&translated).unwrap();
        assert_eq!(json["requestId"], "ABC");
        assert_eq!(json["status"], 403);
    }
}
