use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            "web" => Ok(Self::Web),
            other => Err(format!("Unknown platform: {other}")),
        }
    }
}

/// Why an endpoint stopped receiving pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidReason {
    MalformedToken,
    DeviceNotRegistered,
    Other,
}

impl InvalidReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedToken => "MalformedToken",
            Self::DeviceNotRegistered => "DeviceNotRegistered",
            Self::Other => "Other",
        }
    }

    /// Parses a stored reason. Unknown values collapse to `Other`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "MalformedToken" => Self::MalformedToken,
            "DeviceNotRegistered" => Self::DeviceNotRegistered,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery address bound to exactly one device of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub token: String,
    pub user_id: Uuid,
    pub device_id: String,
    pub platform: Platform,
    pub is_valid: bool,
    pub invalid_reason: Option<InvalidReason>,
    pub invalidated_at: Option<OffsetDateTime>,
}

impl Endpoint {
    #[must_use]
    pub fn new(user_id: Uuid, device_id: impl Into<String>, platform: Platform, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id,
            device_id: device_id.into(),
            platform,
            is_valid: true,
            invalid_reason: None,
            invalidated_at: None,
        }
    }

    /// Flips the endpoint to invalid. Returns `false` if it already was, in which
    /// case the original reason and timestamp are kept.
    pub fn invalidate(&mut self, reason: InvalidReason, at: OffsetDateTime) -> bool {
        if !self.is_valid {
            return false;
        }
        self.is_valid = false;
        self.invalid_reason = Some(reason);
        self.invalidated_at = Some(at);
        true
    }
}
