//! Guards applied to model-extracted profile fields before persistence.
//!
//! Structured generation is untrusted input: emails may be placeholders,
//! phones may be half-remembered fragments. Anything that fails a guard is
//! dropped (kept as `None`) rather than written to the lead.

use regex::Regex;
use std::sync::OnceLock;

// local@domain.tld with at least one dot in the domain
fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)+$",
        )
        .expect("email regex is valid")
    })
}

/// Longest run of one repeated digit in `s`.
fn longest_repeated_digit_run(s: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;
    for c in s.chars() {
        if c.is_ascii_digit() && previous == Some(c) {
            current += 1;
        } else if c.is_ascii_digit() {
            current = 1;
        } else {
            current = 0;
        }
        longest = longest.max(current);
        previous = Some(c);
    }
    longest
}

/// Longest run of consecutively ascending digits in `s` ("3456..." counts).
fn longest_ascending_digit_run(s: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<u32> = None;
    for c in s.chars() {
        match (c.to_digit(10), previous) {
            (Some(d), Some(p)) if d == p + 1 => current += 1,
            (Some(_), _) => current = 1,
            (None, _) => current = 0,
        }
        longest = longest.max(current);
        previous = c.to_digit(10);
    }
    longest
}

/// Checks whether an extracted email is worth persisting.
///
/// Rejects malformed addresses and the placeholder patterns users type to
/// dodge a form: long runs of one digit ("1111111111@...") or an ascending
/// sequence ("123456789@...").
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email_regex().is_match(email) {
        tracing::warn!("❌ Invalid email format: {}", email);
        return false;
    }

    if longest_repeated_digit_run(email) >= 6 || longest_ascending_digit_run(email) >= 8 {
        tracing::warn!("❌ Invalid email detected (placeholder digits): {}", email);
        return false;
    }

    true
}

/// Normalize an extracted phone number.
///
/// Leads come from any Spanish-speaking market, so no country is assumed:
/// formatting characters are stripped, an international `+` prefix is kept,
/// and the digit count must land in the plausible 7..=15 range (E.164 upper
/// bound). Returns `None` when the value cannot be a dialable number.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let international = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 7 || digits.len() > 15 {
        tracing::warn!("❌ Discarding implausible phone extraction: {}", raw);
        return None;
    }

    // Placeholder sequences ("0000000", "1234567890") are model noise
    if longest_repeated_digit_run(&digits) == digits.len()
        || longest_ascending_digit_run(&digits) >= 9
    {
        tracing::warn!("❌ Discarding placeholder phone extraction: {}", raw);
        return None;
    }

    Some(if international {
        format!("+{}", digits)
    } else {
        digits
    })
}
