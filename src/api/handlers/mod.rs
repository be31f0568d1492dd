pub mod health;
pub use self::health::{health, root};

pub mod signup;
pub use self::signup::signup;

pub mod login;
pub use self::login::login;

pub mod session;
pub use self::session::{logout, session};

pub mod federated;
pub use self::federated::{federated_auth, federated_link};

pub mod recovery;
pub use self::recovery::{recovery_request, recovery_verify};

pub mod types;

// common validation for the handlers
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

/// Phone validation by country code. Nepal (`+977`) numbers are exactly ten
/// digits starting `97` or `98`; everywhere else at least ten digits.
pub fn valid_phone(country_code: &str, phone: &str) -> bool {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if country_code == "+977" {
        digits.len() == 10 && (digits.starts_with("97") || digits.starts_with("98"))
    } else {
        digits.len() >= 10
    }
}

/// Storage form of an optional phone number: `"{country_code} {phone}"`.
pub fn format_phone(country_code: &str, phone: &str) -> String {
    format!("{country_code} {phone}")
}

pub const DEFAULT_COUNTRY_CODE: &str = "+977";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn nepali_numbers_need_valid_prefix_and_length() {
        assert!(valid_phone("+977", "9812345678"));
        assert!(valid_phone("+977", "981-234-5678"));
        assert!(!valid_phone("+977", "9112345678"));
        assert!(!valid_phone("+977", "981234567"));
        assert!(!valid_phone("+977", "98123456789"));
    }

    #[test]
    fn other_countries_need_ten_digits() {
        assert!(valid_phone("+1", "2025550100"));
        assert!(valid_phone("+44", "020 7946 0958"));
        assert!(!valid_phone("+1", "555010"));
    }

    #[test]
    fn phone_storage_keeps_country_prefix() {
        assert_eq!(format_phone("+977", "9812345678"), "+977 9812345678");
    }
}
