//! Inline card input and its local validation.
//!
//! A card submitted at checkout is checked here before it is ever sent to the
//! payment gateway: digits and length, Luhn checksum, expiry against the
//! engine's clock, security code shape, and that the holder name matches the
//! authenticated buyer.

use crate::types::Currency;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card data submitted inline with a checkout request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    /// Name printed on the card
    pub holder_name: String,
    /// Primary account number; spaces and dashes are tolerated
    pub number: String,
    /// Expiry month (1-12)
    pub exp_month: u32,
    /// Expiry year (four digits)
    pub exp_year: i32,
    /// Security code
    pub cvc: String,
    /// Currency the card settles in
    pub currency: Currency,
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("holder_name", &self.holder_name)
            .field("number", &format_args!("**** {}", self.last_four()))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

/// Why a card was refused before reaching the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardRejection {
    /// Number contains something other than digits, spaces or dashes
    MalformedNumber,
    /// Number is not 12 to 19 digits long
    InvalidLength {
        /// Digits found
        digits: usize,
    },
    /// Luhn checksum failed
    ChecksumMismatch,
    /// Expiry month outside 1-12
    InvalidExpiryMonth {
        /// Rejected month
        month: u32,
    },
    /// Card expired before the checkout instant
    Expired,
    /// Security code is not 3 or 4 digits
    InvalidSecurityCode,
    /// Holder name is blank or does not match the buyer
    HolderMismatch,
    /// The provider rejected the card
    Provider {
        /// Provider message
        reason: String,
    },
}

impl fmt::Display for CardRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedNumber => write!(f, "card number contains invalid characters"),
            Self::InvalidLength { digits } => write!(f, "card number has {digits} digits"),
            Self::ChecksumMismatch => write!(f, "card number checksum failed"),
            Self::InvalidExpiryMonth { month } => write!(f, "expiry month {month} is invalid"),
            Self::Expired => write!(f, "card has expired"),
            Self::InvalidSecurityCode => write!(f, "security code is invalid"),
            Self::HolderMismatch => write!(f, "card holder does not match the buyer"),
            Self::Provider { reason } => write!(f, "rejected by provider: {reason}"),
        }
    }
}

impl CardDetails {
    /// The number with separators stripped.
    #[must_use]
    pub fn digits(&self) -> String {
        self.number.chars().filter(char::is_ascii_digit).collect()
    }

    /// Last four digits, for display.
    #[must_use]
    pub fn last_four(&self) -> String {
        let digits = self.digits();
        let start = digits.len().saturating_sub(4);
        digits[start..].to_string()
    }

    /// Validates the card for `buyer_name` at instant `now`.
    ///
    /// A card is valid through the last day of its expiry month.
    ///
    /// # Errors
    ///
    /// Returns the first [`CardRejection`] found.
    pub fn validate(&self, buyer_name: &str, now: DateTime<Utc>) -> Result<(), CardRejection> {
        if !self
            .number
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
        {
            return Err(CardRejection::MalformedNumber);
        }

        let digits = self.digits();
        if !(12..=19).contains(&digits.len()) {
            return Err(CardRejection::InvalidLength {
                digits: digits.len(),
            });
        }

        if !luhn_valid(&digits) {
            return Err(CardRejection::ChecksumMismatch);
        }

        if !(1..=12).contains(&self.exp_month) {
            return Err(CardRejection::InvalidExpiryMonth {
                month: self.exp_month,
            });
        }

        if (self.exp_year, self.exp_month) < (now.year(), now.month()) {
            return Err(CardRejection::Expired);
        }

        let cvc_ok = (3..=4).contains(&self.cvc.len()) && self.cvc.chars().all(|c| c.is_ascii_digit());
        if !cvc_ok {
            return Err(CardRejection::InvalidSecurityCode);
        }

        if !names_match(&self.holder_name, buyer_name) {
            return Err(CardRejection::HolderMismatch);
        }

        Ok(())
    }
}

/// Luhn (mod 10) checksum over an all-digit string.
#[must_use]
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (index, c) in digits.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if index % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

fn names_match(holder: &str, buyer: &str) -> bool {
    let normalise = |name: &str| {
        name.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let holder = normalise(holder);
    !holder.is_empty() && holder == normalise(buyer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card() -> CardDetails {
        CardDetails {
            holder_name: "Ada Lovelace".to_string(),
            number: "4242 4242 4242 4242".to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvc: "123".to_string(),
            currency: Currency::usd(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn accepts_a_well_formed_card() {
        assert_eq!(card().validate("ada  LOVELACE", now()), Ok(()));
        assert_eq!(card().last_four(), "4242");
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut bad = card();
        bad.number = "4242 4242 4242 4241".to_string();
        assert_eq!(bad.validate("Ada Lovelace", now()), Err(CardRejection::ChecksumMismatch));
    }

    #[test]
    fn rejects_letters_in_number() {
        let mut bad = card();
        bad.number = "4242-4242-4242-424x".to_string();
        assert_eq!(bad.validate("Ada Lovelace", now()), Err(CardRejection::MalformedNumber));
    }

    #[test]
    fn card_is_valid_through_its_expiry_month() {
        let mut expiring = card();
        expiring.exp_year = 2025;
        expiring.exp_month = 6;
        assert_eq!(expiring.validate("Ada Lovelace", now()), Ok(()));

        expiring.exp_month = 5;
        assert_eq!(expiring.validate("Ada Lovelace", now()), Err(CardRejection::Expired));
    }

    #[test]
    fn rejects_someone_elses_card() {
        assert_eq!(
            card().validate("Charles Babbage", now()),
            Err(CardRejection::HolderMismatch)
        );
    }

    #[test]
    fn rejects_short_security_code() {
        let mut bad = card();
        bad.cvc = "12".to_string();
        assert_eq!(bad.validate("Ada Lovelace", now()), Err(CardRejection::InvalidSecurityCode));
    }

    #[test]
    fn debug_output_masks_the_number() {
        let rendered = format!("{:?}", card());
        assert!(rendered.contains("**** 4242"));
        assert!(!rendered.contains("4242 4242 4242 4242"));
        assert!(!rendered.contains("123"));
    }

    #[test]
    fn luhn_reference_numbers() {
        assert!(luhn_valid("79927398713"));
        assert!(!luhn_valid("79927398710"));
    }
}
