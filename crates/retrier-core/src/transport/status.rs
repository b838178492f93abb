//! HTTP status classes (`1xx` .. `5xx`).

use std::fmt;
use std::str::FromStr;

use http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatusGroup {
    Informational = 1,
    Success = 2,
    Redirection = 3,
    ClientError = 4,
    ServerError = 5,
}

impl StatusGroup {
    /// Group for `status / 100`, if it is one of the five standard classes.
    pub fn of(status: StatusCode) -> Option<Self> {
        Self::from_class(status.as_u16() / 100)
    }

    fn from_class(class: u16) -> Option<Self> {
        match class {
            1 => Some(StatusGroup::Informational),
            2 => Some(StatusGroup::Success),
            3 => Some(StatusGroup::Redirection),
            4 => Some(StatusGroup::ClientError),
            5 => Some(StatusGroup::ServerError),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusGroup::Informational => "1xx",
            StatusGroup::Success => "2xx",
            StatusGroup::Redirection => "3xx",
            StatusGroup::ClientError => "4xx",
            StatusGroup::ServerError => "5xx",
        }
    }
}

impl fmt::Display for StatusGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a status group name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status group {0:?}, expected one of 1xx..5xx")]
pub struct ParseStatusGroupError(String);

/// Accepts `"5xx"` (any case) or the bare class digit `"5"`.
impl FromStr for StatusGroup {
    type Err = ParseStatusGroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let digit = trimmed.strip_suffix("xx").unwrap_or(&trimmed);
        digit
            .parse::<u16>()
            .ok()
            .and_then(Self::from_class)
            .ok_or_else(|| ParseStatusGroupError(s.to_string()))
    }
}

impl TryFrom<String> for StatusGroup {
    type Error = ParseStatusGroupError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StatusGroup> for String {
    fn from(group: StatusGroup) -> Self {
        group.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_hundreds() {
        assert_eq!(StatusGroup::of(StatusCode::OK), Some(StatusGroup::Success));
        assert_eq!(StatusGroup::of(StatusCode::IM_A_TEAPOT), Some(StatusGroup::ClientError));
        assert_eq!(StatusGroup::of(StatusCode::BAD_GATEWAY), Some(StatusGroup::ServerError));
        assert_eq!(StatusGroup::of(StatusCode::from_u16(799).unwrap()), None);
    }

    #[test]
    fn parse_names_and_digits() {
        assert_eq!("5xx".parse(), Ok(StatusGroup::ServerError));
        assert_eq!("4XX".parse(), Ok(StatusGroup::ClientError));
        assert_eq!(" 3 ".parse(), Ok(StatusGroup::Redirection));
        assert!("6xx".parse::<StatusGroup>().is_err());
        assert!("teapot".parse::<StatusGroup>().is_err());
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(StatusGroup::Informational.to_string(), "1xx");
        assert_eq!(String::from(StatusGroup::ServerError), "5xx");
    }
}
