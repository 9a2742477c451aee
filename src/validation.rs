//! Input validation for shopping queries and registration fields.
//!
//! Queries are trimmed and HTML-escaped before they reach the generation
//! pipeline. Escaping leaves existing entities alone, so validating an
//! already-validated query yields the same string.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Upper bound on query length, counted in characters after trimming.
pub const MAX_QUERY_CHARS: usize = 4000;

pub const MIN_PASSWORD_CHARS: usize = 6;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").unwrap());

/// Entities produced by [`escape_html`]; an `&` that starts one of these is kept verbatim.
static ENTITY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^&(?:amp|lt|gt|quot|#x27|#x2F|#96);").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query must not be empty")]
    Empty,

    #[error("query exceeds {} characters", MAX_QUERY_CHARS)]
    TooLong,

    #[error("{field}: {message}")]
    Field {
        field: &'static str,
        message: String,
    },
}

impl ValidationError {
    fn field(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError::Field {
            field,
            message: message.into(),
        }
    }
}

/// A trimmed, escaped, non-empty query. Only [`validate`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn validate(raw: &str) -> Result<ValidatedQuery, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    if trimmed.chars().count() > MAX_QUERY_CHARS {
        return Err(ValidationError::TooLong);
    }
    Ok(ValidatedQuery(escape_html(trimmed)))
}

/// Escape `& < > " ' / \``. Existing entities from this same set pass through.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.char_indices() {
        match c {
            '&' if ENTITY_REGEX.is_match(&s[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#96;"),
            _ => out.push(c),
        }
    }
    out
}

/// Registration fields after normalization. Email is lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
) -> Result<Registration, ValidationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationError::field("username", "is required"));
    }
    let email = validate_email(email)?;
    validate_password(password)?;
    Ok(Registration {
        username: username.to_string(),
        email,
        password: password.to_string(),
    })
}

pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    if !EMAIL_REGEX.is_match(&email) {
        return Err(ValidationError::field("email", "must be a valid email address"));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::field(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_CHARS),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_rejected() {
        for raw in ["", " ", "\t\n", "   \r\n  "] {
            assert_eq!(validate(raw), Err(ValidationError::Empty), "input {:?}", raw);
        }
    }

    #[test]
    fn test_trims_surrounding_whitespace() {
        let q = validate("  best budget laptop \n").unwrap();
        assert_eq!(q.as_str(), "best budget laptop");
    }

    #[test]
    fn test_escapes_html_significant_characters() {
        let q = validate("<script>alert('x')</script> & \"more\"").unwrap();
        assert_eq!(
            q.as_str(),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;&#x2F;script&gt; &amp; &quot;more&quot;"
        );
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let inputs = [
            "shoes < $50 & boots > $20",
            "tom's \"best\" pick / `cheap`",
            "already &amp; escaped &lt;b&gt;",
            "a lone & ampersand",
            "&amp",
            "plain query",
        ];
        for raw in inputs {
            let once = validate(raw).unwrap();
            let twice = validate(once.as_str()).unwrap();
            assert_eq!(once, twice, "re-validation changed {:?}", raw);
            assert!(!once.as_str().is_empty());
        }
    }

    #[test]
    fn test_incomplete_entity_is_escaped() {
        assert_eq!(escape_html("&amp"), "&amp;amp");
        assert_eq!(escape_html("&#x27;"), "&#x27;");
    }

    #[test]
    fn test_too_long_rejected() {
        let raw = "a".repeat(MAX_QUERY_CHARS + 1);
        assert_eq!(validate(&raw), Err(ValidationError::TooLong));
        assert!(validate(&"a".repeat(MAX_QUERY_CHARS)).is_ok());
    }

    #[test]
    fn test_registration_normalizes_email() {
        let reg = validate_registration(" alice ", "A@X.com", "secret1").unwrap();
        assert_eq!(reg.username, "alice");
        assert_eq!(reg.email, "a@x.com");
    }

    #[test]
    fn test_registration_rejects_bad_fields() {
        assert!(matches!(
            validate_registration("", "a@x.com", "secret1"),
            Err(ValidationError::Field { field: "username", .. })
        ));
        assert!(matches!(
            validate_registration("alice", "not-an-email", "secret1"),
            Err(ValidationError::Field { field: "email", .. })
        ));
        assert!(matches!(
            validate_registration("alice", "a@x.com", "12345"),
            Err(ValidationError::Field { field: "password", .. })
        ));
    }
}
