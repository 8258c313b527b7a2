//! File name sanitization and object key generation

use chrono::Utc;
use std::fmt;
use uuid::Uuid;

/// Prefix of every generated object key
pub const KEY_PREFIX: &str = "videos";

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`
///
/// ```
/// use video_upload_gateway::upload::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("clip one.mp4"), "clip_one.mp4");
/// assert_eq!(sanitize_file_name("视频.mp4"), "__.mp4");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if is_allowed(c) { c } else { '_' })
        .collect()
}

/// Storage key of the form `videos/{unix_ms}-{uuid}-{name}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Generate a fresh key for `file_name`
    pub fn generate(file_name: &str) -> Self {
        Self::generate_at(Utc::now().timestamp_millis(), Uuid::new_v4(), file_name)
    }

    /// Generate a key from explicit components
    pub fn generate_at(unix_millis: i64, id: Uuid, file_name: &str) -> Self {
        Self(format!(
            "{}/{}-{}-{}",
            KEY_PREFIX,
            unix_millis,
            id.hyphenated(),
            sanitize_file_name(file_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sanitized name segment
    pub fn file_name(&self) -> &str {
        // prefix/{digits}-{36 char uuid}-{name}
        self.0
            .split_once('/')
            .and_then(|(_, rest)| rest.split_once('-'))
            .and_then(|(_, rest)| rest.get(37..))
            .unwrap_or_default()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
