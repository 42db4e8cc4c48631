//! Personal-data redaction shared by every export kind.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const ANONYMOUS: &str = "Anonymous";
pub const EMAIL_MASK: &str = "***@***.***";
pub const PHONE_MASK: &str = "***-***-****";

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PrivacyMode {
    #[default]
    Redacted,
    Full,
}

impl PrivacyMode {
    /// Names are replaced even when absent so a redacted export never hints
    /// at which payers left their name blank.
    pub fn name(self, value: Option<&str>) -> String {
        match self {
            PrivacyMode::Redacted => ANONYMOUS.to_string(),
            PrivacyMode::Full => value.unwrap_or_default().to_string(),
        }
    }

    pub fn email(self, value: Option<&str>) -> String {
        match (self, value) {
            (PrivacyMode::Full, Some(v)) => v.to_string(),
            (PrivacyMode::Redacted, Some(v)) if !v.is_empty() => EMAIL_MASK.to_string(),
            _ => String::new(),
        }
    }

    pub fn phone(self, value: Option<&str>) -> String {
        match (self, value) {
            (PrivacyMode::Full, Some(v)) => v.to_string(),
            (PrivacyMode::Redacted, Some(v)) if !v.is_empty() => PHONE_MASK.to_string(),
            _ => String::new(),
        }
    }
}
