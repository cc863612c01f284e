use crate::common::{Result, VisiRideError};
use crate::core::geo::Location;
use serde::{Deserialize, Serialize};

pub const STORAGE_VERSION: u32 = 1;

/// Classifier outputs that can never be usernames.
pub const RESERVED_NAMES: [&str; 2] = ["unknown_person", "no_persons_found"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub version: u32,
    pub username: String,
    pub password_hash: String,
    pub location: Location,
    /// Epoch milliseconds of the current ride; 0 when no session is active.
    pub session_start: i64,
    /// Base64 reference photo as supplied at signup.
    pub image: String,
}

impl UserRecord {
    pub fn new(username: &str, password_hash: String, location: Location, image: String) -> Self {
        Self {
            version: STORAGE_VERSION,
            username: username.to_string(),
            password_hash,
            location,
            session_start: 0,
            image,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session_start > 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScooterRecord {
    pub version: u32,
    pub scooter_id: String,
    /// Username the scooter is unlocked for.
    pub assigned_to: Option<String>,
    pub charge: String,
    pub location: Location,
}

impl ScooterRecord {
    pub fn new(scooter_id: &str, charge: &str, location: Location) -> Self {
        Self {
            version: STORAGE_VERSION,
            scooter_id: scooter_id.to_string(),
            assigned_to: None,
            charge: charge.to_string(),
            location,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_to.is_some()
    }
}

/// Identifiers double as file names, so they are restricted to a safe
/// character set.
pub fn validate_identifier(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(VisiRideError::validation(format!("Invalid {}", kind)));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(VisiRideError::validation(format!("Invalid {}", kind)));
    }
    Ok(())
}

/// Signup rules for usernames.
pub fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (6..=30).contains(&len)
        && !username.chars().any(char::is_whitespace)
        && !username.contains('.')
        && !RESERVED_NAMES.contains(&username)
        && validate_identifier("username", username).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(is_valid_username("alice_01"));
        assert!(!is_valid_username("bob"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("dotted.name"));
        assert!(!is_valid_username("unknown_person"));
        assert!(!is_valid_username("no_persons_found"));
        assert!(!is_valid_username(&"x".repeat(31)));
    }

    #[test]
    fn identifiers_reject_path_segments() {
        assert!(validate_identifier("scooterId", "scooter-7").is_ok());
        assert!(validate_identifier("scooterId", "").is_err());
        assert!(validate_identifier("scooterId", "../etc").is_err());
        assert!(validate_identifier("scooterId", "a/b").is_err());
    }

    #[test]
    fn new_records_start_idle() {
        let user = UserRecord::new("alice_01", "hash".into(), Location::default(), String::new());
        assert!(!user.has_session());
        let scooter = ScooterRecord::new("s1", "80", Location::default());
        assert!(!scooter.is_assigned());
    }
}
