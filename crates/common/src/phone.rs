use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_DIGITS: usize = 7;
const MAX_DIGITS: usize = 15;

/// A normalized phone number: the natural key for customer records.
///
/// Formatting characters are dropped so `(555) 123-4567` and `555.123.4567`
/// resolve to the same customer. A leading `+` is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

        if digits.is_empty() {
            return Err(Error::Validation("phone number is required".to_string()));
        }
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
            return Err(Error::Validation(format!(
                "phone number must have between {} and {} digits",
                MIN_DIGITS, MAX_DIGITS
            )));
        }

        if trimmed.starts_with('+') {
            Ok(Self(format!("+{}", digits)))
        } else {
            Ok(Self(digits))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form safe to put in logs: only the last four digits survive.
    pub fn masked(&self) -> String {
        let tail_start = self.0.len().saturating_sub(4);
        format!("***{}", &self.0[tail_start..])
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
