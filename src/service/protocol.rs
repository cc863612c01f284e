use crate::common::{Result, VisiRideError};
use crate::core::geo::Location;
use crate::storage::{ScooterRecord, UserRecord};
use serde::{Deserialize, Serialize};

/// Error reply understood by the scooter firmware.
pub const ERROR_MARKER: &str = "An error occured*";

/// Assignment value the mobile client expects for a free scooter.
pub const UNASSIGNED: &str = "_none";

pub const SCOOTER_ADDED: &str = "New Scooter Added!";
pub const USER_ADDED: &str = "New User Added!";
pub const INVALID_USERNAME: &str = "Please enter a valid username.";
pub const INVALID_PHOTO: &str = "Please provide a valid photo.";
pub const BAD_CREDENTIALS: &str = "Incorrect username or password";

// Request types

/// A coordinate sent either as a JSON number or as numeric text.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    pub fn value(&self) -> Option<f64> {
        match self {
            Coordinate::Number(v) => Some(*v),
            Coordinate::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub fn parse_location(lat: Option<&Coordinate>, lon: Option<&Coordinate>) -> Result<Location> {
    let lat = lat.and_then(Coordinate::value);
    let lon = lon.and_then(Coordinate::value);
    match (lat, lon) {
        (Some(lat), Some(lon)) if Location::new(lat, lon).is_valid() => Ok(Location::new(lat, lon)),
        _ => Err(VisiRideError::validation("Invalid lat/lon")),
    }
}

pub fn parse_location_text(lat: Option<&str>, lon: Option<&str>) -> Result<Location> {
    parse_location(
        lat.map(|s| Coordinate::Text(s.to_string())).as_ref(),
        lon.map(|s| Coordinate::Text(s.to_string())).as_ref(),
    )
}

pub fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(VisiRideError::validation(format!("Missing {}", name))),
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AddScooterQuery {
    #[serde(rename = "scooterId")]
    pub scooter_id: Option<String>,
    pub charge: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UserLocationRequest {
    pub username: Option<String>,
    pub lat: Option<Coordinate>,
    pub lon: Option<Coordinate>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FreeScooterRequest {
    #[serde(rename = "scooterId")]
    pub scooter_id: Option<String>,
    pub username: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SignUpRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub lat: Option<Coordinate>,
    pub lon: Option<Coordinate>,
    /// Base64 reference photo.
    pub image: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SignInQuery {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Urlencoded body kept as ordered pairs; firmware may repeat fields.
#[derive(Debug, Clone, Default)]
pub struct FormFields(pub Vec<(String, String)>);

impl FormFields {
    /// First value for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Every field except `exclude`, first occurrence of each name, in order.
    pub fn others(&self, exclude: &[&str]) -> Vec<(String, String)> {
        let mut seen = std::collections::HashSet::new();
        self.0
            .iter()
            .filter(|(k, _)| !exclude.contains(&k.as_str()))
            .filter(|(k, _)| seen.insert(k.clone()))
            .cloned()
            .collect()
    }
}

// Response types

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub username: String,
    pub lat: f64,
    pub lon: f64,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            username: user.username.clone(),
            lat: user.location.lat,
            lon: user.location.lon,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScooterView {
    #[serde(rename = "scooterId")]
    pub scooter_id: String,
    pub user: String,
    #[serde(rename = "currentCharge")]
    pub current_charge: String,
    pub location: Location,
}

impl From<&ScooterRecord> for ScooterView {
    fn from(scooter: &ScooterRecord) -> Self {
        Self {
            scooter_id: scooter.scooter_id.clone(),
            user: scooter.assigned_to.clone().unwrap_or_else(|| UNASSIGNED.to_string()),
            current_charge: scooter.charge.clone(),
            location: scooter.location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    Added,
    InvalidUsername,
    InvalidPhoto,
}

impl SignUpOutcome {
    pub fn reply(&self) -> &'static str {
        match self {
            SignUpOutcome::Added => USER_ADDED,
            SignUpOutcome::InvalidUsername => INVALID_USERNAME,
            SignUpOutcome::InvalidPhoto => INVALID_PHOTO,
        }
    }
}
