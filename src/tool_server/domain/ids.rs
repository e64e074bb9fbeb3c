//! Identifier and validated-name types for tool servers.

use super::ToolServerDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length for a server display name, matching `VARCHAR(100)`.
const MAX_SERVER_NAME_LENGTH: usize = 100;

/// Maximum length for a catalog template identifier.
const MAX_TEMPLATE_ID_LENGTH: usize = 100;

/// Stable identifier for a configured tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(Uuid);

impl ServerId {
    /// Creates a new random server identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a server identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Uuid> for ServerId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier for one appended invocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Creates a new random invocation identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an invocation identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Validated human-readable server name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerName(String);

impl ServerName {
    /// Creates a validated server name.
    ///
    /// The input is trimmed. Control characters are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(ToolServerDomainError::EmptyServerName);
        }

        if normalized.chars().any(char::is_control) {
            return Err(ToolServerDomainError::InvalidServerName(normalized));
        }

        if normalized.chars().count() > MAX_SERVER_NAME_LENGTH {
            return Err(ToolServerDomainError::ServerNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the server name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerName {
    type Error = ToolServerDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerName> for String {
    fn from(value: ServerName) -> Self {
        value.0
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated identifier of a catalog template.
///
/// The input is trimmed and lowercased. Only characters in `[a-z0-9_-]` are
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemplateId(String);

impl TemplateId {
    /// Creates a validated template identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(ToolServerDomainError::EmptyTemplateId);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || character == '_'
                || character == '-'
        });
        if !is_valid || normalized.len() > MAX_TEMPLATE_ID_LENGTH {
            return Err(ToolServerDomainError::InvalidTemplateId(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the template identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TemplateId {
    type Error = ToolServerDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TemplateId> for String {
    fn from(value: TemplateId) -> Self {
        value.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("  Filesystem tools ", "Filesystem tools")]
    #[case("github", "github")]
    fn server_name_is_trimmed(#[case] input: &str, #[case] expected: &str) {
        let name = ServerName::new(input).expect("valid server name");
        assert_eq!(name.as_str(), expected);
    }

    #[rstest]
    #[case("", ToolServerDomainError::EmptyServerName)]
    #[case("   ", ToolServerDomainError::EmptyServerName)]
    #[case("bad\nname", ToolServerDomainError::InvalidServerName("bad\nname".to_owned()))]
    fn server_name_rejects_invalid_input(
        #[case] input: &str,
        #[case] expected: ToolServerDomainError,
    ) {
        assert_eq!(ServerName::new(input), Err(expected));
    }

    #[test]
    fn server_name_rejects_overlong_input() {
        let long = "x".repeat(101);
        assert!(matches!(
            ServerName::new(long),
            Err(ToolServerDomainError::ServerNameTooLong(_))
        ));
    }

    #[rstest]
    #[case("GitHub", "github")]
    #[case("brave-search", "brave-search")]
    #[case("fs_local", "fs_local")]
    fn template_id_is_normalized(#[case] input: &str, #[case] expected: &str) {
        let id = TemplateId::new(input).expect("valid template id");
        assert_eq!(id.as_str(), expected);
    }

    #[test]
    fn template_id_rejects_spaces() {
        assert!(matches!(
            TemplateId::new("brave search"),
            Err(ToolServerDomainError::InvalidTemplateId(_))
        ));
    }

    #[test]
    fn server_name_deserializes_through_validation() {
        let result: Result<ServerName, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }
}
