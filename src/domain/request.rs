//! Validated render requests.

use super::error::DomainError;

/// Shortest identifier accepted unless configured otherwise.
pub const DEFAULT_MIN_IDENTIFIER_LEN: usize = 3;

/// Unvalidated parameters as they arrive from a caller.
#[derive(Debug, Clone, Default)]
pub struct RenderParams {
    pub identifier: Option<String>,
    pub extent_a: Option<String>,
    pub extent_b: Option<String>,
    pub debug: bool,
}

/// A render request whose identifier satisfies the length constraint.
///
/// Extent geometries are carried as opaque WKT; their syntax is the external
/// tool's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    identifier: String,
    extent_a: Option<String>,
    extent_b: Option<String>,
    debug: bool,
}

impl RenderRequest {
    pub fn validate(params: RenderParams, min_identifier_len: usize) -> Result<Self, DomainError> {
        let identifier = params
            .identifier
            .filter(|value| !value.trim().is_empty())
            .ok_or(DomainError::MissingIdentifier)?;

        let actual = identifier.chars().count();
        if actual < min_identifier_len {
            return Err(DomainError::IdentifierTooShort {
                min: min_identifier_len,
                actual,
            });
        }

        Ok(Self {
            identifier,
            extent_a: non_empty(params.extent_a),
            extent_b: non_empty(params.extent_b),
            debug: params.debug,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn extent_a(&self) -> Option<&str> {
        self.extent_a.as_deref()
    }

    pub fn extent_b(&self) -> Option<&str> {
        self.extent_b.as_deref()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }
}

/// Parse a boolean flag as callers usually spell it.
pub fn parse_flag(name: &str, value: &str) -> Result<bool, DomainError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DomainError::validation(format!(
            "`{name}` must be a boolean, got `{other}`"
        ))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(id: Option<&str>) -> RenderParams {
        RenderParams {
            identifier: id.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_missing_identifier() {
        assert_eq!(
            RenderRequest::validate(params(None), DEFAULT_MIN_IDENTIFIER_LEN),
            Err(DomainError::MissingIdentifier)
        );
        assert_eq!(
            RenderRequest::validate(params(Some("   ")), DEFAULT_MIN_IDENTIFIER_LEN),
            Err(DomainError::MissingIdentifier)
        );
    }

    #[test]
    fn rejects_short_identifiers() {
        for id in ["a", "ab"] {
            let err = RenderRequest::validate(params(Some(id)), DEFAULT_MIN_IDENTIFIER_LEN)
                .expect_err("short identifier");
            assert!(matches!(err, DomainError::IdentifierTooShort { min: 3, .. }));
        }
    }

    #[test]
    fn counts_characters_not_bytes() {
        // two characters, four bytes
        let err = RenderRequest::validate(params(Some("ññ")), DEFAULT_MIN_IDENTIFIER_LEN)
            .expect_err("short identifier");
        assert_eq!(err, DomainError::IdentifierTooShort { min: 3, actual: 2 });
    }

    #[test]
    fn keeps_extents_and_drops_blank_ones() {
        let request = RenderRequest::validate(
            RenderParams {
                identifier: Some("4056301QJ3245N".into()),
                extent_a: Some("POLYGON((0 0,1 0,1 1,0 0))".into()),
                extent_b: Some(" ".into()),
                debug: true,
            },
            DEFAULT_MIN_IDENTIFIER_LEN,
        )
        .expect("valid request");

        assert_eq!(request.identifier(), "4056301QJ3245N");
        assert_eq!(request.extent_a(), Some("POLYGON((0 0,1 0,1 1,0 0))"));
        assert_eq!(request.extent_b(), None);
        assert!(request.is_debug());
    }

    #[test]
    fn parses_flag_spellings() {
        for value in ["1", "true", "YES", "on", ""] {
            assert_eq!(parse_flag("debug", value), Ok(true), "{value}");
        }
        for value in ["0", "False", "no", "off"] {
            assert_eq!(parse_flag("debug", value), Ok(false), "{value}");
        }
        assert!(matches!(
            parse_flag("debug", "maybe"),
            Err(DomainError::Validation { .. })
        ));
    }
}
