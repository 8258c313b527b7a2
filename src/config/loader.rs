//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use std::path::Path;
use std::sync::OnceLock;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in a string.
    ///
    /// Supports two syntaxes:
    /// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
    /// - `${VAR_NAME:-default}` - Expansion with default value (may be empty)
    ///
    /// Values substituted inside a quoted YAML scalar are escaped for that
    /// quoting style, so they parse back to exactly the environment value.
    /// Defaults are YAML source and are inserted as written.
    fn expand_env_vars(content: &str) -> String {
        static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
                .expect("env expansion pattern is valid")
        });

        let mut last_match = 0;
        let mut result = String::with_capacity(content.len());

        for cap in re.captures_iter(content) {
            let Some(full_match) = cap.get(0) else {
                continue;
            };
            let var_name = &cap[1];

            result.push_str(&content[last_match..full_match.start()]);

            match std::env::var(var_name) {
                Ok(value) => {
                    let line_start = content[..full_match.start()]
                        .rfind('\n')
                        .map_or(0, |i| i + 1);
                    let quoting = quoting_at(&content[line_start..full_match.start()]);
                    result.push_str(&quoting.escape(&value));
                }
                Err(_) => match cap.get(3) {
                    Some(default) => result.push_str(default.as_str()),
                    // No env var and no default. Keep the original placeholder.
                    None => result.push_str(full_match.as_str()),
                },
            }

            last_match = full_match.end();
        }

        result.push_str(&content[last_match..]);
        result
    }
}

/// Quoting style of the YAML scalar a placeholder sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Plain,
    Single,
    Double,
}

impl Quoting {
    fn escape(self, value: &str) -> String {
        match self {
            Quoting::Plain => value.to_string(),
            Quoting::Single => value.replace('\'', "''"),
            Quoting::Double => {
                let mut escaped = String::with_capacity(value.len());
                for c in value.chars() {
                    match c {
                        '\\' => escaped.push_str("\\\\"),
                        '"' => escaped.push_str("\\\""),
                        '\n' => escaped.push_str("\\n"),
                        '\r' => escaped.push_str("\\r"),
                        '\t' => escaped.push_str("\\t"),
                        c => escaped.push(c),
                    }
                }
                escaped
            }
        }
    }
}

/// Quoting in effect at the end of `line_prefix`
///
/// A quote opens a scalar only where a scalar can start.
fn quoting_at(line_prefix: &str) -> Quoting {
    let mut quoting = Quoting::Plain;
    let mut previous = None;
    let mut chars = line_prefix.chars();
    while let Some(c) = chars.next() {
        let opens = previous.map_or(true, |p: char| p.is_whitespace() || ":[{,-".contains(p));
        previous = Some(c);
        quoting = match (quoting, c) {
            (Quoting::Plain, '"') if opens => Quoting::Double,
            (Quoting::Plain, '\'') if opens => Quoting::Single,
            (Quoting::Double, '\\') => {
                chars.next();
                Quoting::Double
            }
            (Quoting::Double, '"') | (Quoting::Single, '\'') => Quoting::Plain,
            (current, _) => current,
        };
    }
    quoting
}
