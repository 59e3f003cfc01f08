//! Transaction records as delivered by upstream ingestion.
//!
//! RULE: A Transaction is never mutated after construction.
//! Score results and alerts reference it by id only.

use crate::types::{AccountId, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub amount: f64,
    pub currency: String,
    pub timestamp: Timestamp,
    pub origin_location: Location,
    pub counterparty: String,
    pub channel: Channel,
}

/// Where a transaction originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// ISO 3166 alpha-2 country code.
    pub country: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub coordinates: Option<GeoPoint>,
}

impl Location {
    pub fn country(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            region: None,
            coordinates: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.coordinates = Some(GeoPoint { lat, lon });
        self
    }

    /// Key used for "typical location" membership: country plus region.
    pub fn key(&self) -> LocationKey {
        LocationKey {
            country: self.country.to_ascii_uppercase(),
            region: self.region.as_ref().map(|r| r.to_ascii_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    pub country: String,
    pub region: Option<String>,
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}/{}", self.country, region),
            None => write!(f, "{}", self.country),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    CardPresent,
    CardNotPresent,
    Online,
    Mobile,
    Atm,
    Wire,
    Transfer,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardPresent => "card_present",
            Self::CardNotPresent => "card_not_present",
            Self::Online => "online",
            Self::Mobile => "mobile",
            Self::Atm => "atm",
            Self::Wire => "wire",
            Self::Transfer => "transfer",
        }
    }
}
