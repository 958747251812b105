use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ApiException, ErrorCode};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ReactionId);

/// Reactions offered on a slide that does not declare its own.
pub const DEFAULT_REACTIONS: [&str; 3] = ["🧡", "😎", "🤷‍♂️"];

/// Longest symbol accepted into a slide vocabulary, in bytes.
pub const MAX_SYMBOL_BYTES: usize = 64;

pub const MAX_SESSION_NAME_LEN: usize = 64;

pub fn default_reactions() -> Vec<String> {
    DEFAULT_REACTIONS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// Name of one isolated presentation session. Doubles as the file stem of the
/// session's reaction database, so only `[A-Za-z0-9_-]` is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    pub fn parse(raw: &str) -> Result<Self, ApiException> {
        if raw.is_empty() || raw.len() > MAX_SESSION_NAME_LEN {
            return Err(ApiException::new(
                ErrorCode::Validation,
                format!("session name must be 1..={MAX_SESSION_NAME_LEN} characters"),
            ));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ApiException::new(
                ErrorCode::Validation,
                "session name may only contain ASCII letters, digits, '-' and '_'",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn generate() -> Self {
        Self(format!("s-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionName {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionName {
    type Err = ApiException;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionName {
    type Error = ApiException;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionName> for String {
    fn from(value: SessionName) -> Self {
        value.0
    }
}
