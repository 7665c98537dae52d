use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

mod state;

pub use state::{PageCursor, PageStatus, RunState, RunStatus};

/// Why a field carries the missing-data marker instead of a value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    /// The page did not contain the field at all.
    Absent,
    /// The page contained text for the field but it could not be parsed.
    Unparseable,
}

/// A normalized value, or an explicit marker saying why there is none.
///
/// Serializes as the bare value when present and as `{"missing": "<reason>"}`
/// otherwise, so a missing price can never be mistaken for a price of zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Field<T> {
    Missing { missing: MissingReason },
    Present(T),
}

impl<T> Field<T> {
    pub fn absent() -> Self {
        Field::Missing {
            missing: MissingReason::Absent,
        }
    }

    pub fn unparseable() -> Self {
        Field::Missing {
            missing: MissingReason::Unparseable,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Missing { .. } => None,
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::absent()
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Field::absent, Field::Present)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Usd,
    Gbp,
    Sek,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PricePeriod {
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Price {
    pub amount: f64,
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<PricePeriod>,
}

/// Floor is usually a level number, but sites also use names such as
/// "entreplanta" that have no numeric equivalent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Floor {
    Level(i32),
    Named(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Flat,
    Apartment,
    Penthouse,
    Duplex,
    Studio,
    Loft,
    House,
    CountryHouse,
    Room,
}

/// Location information for a listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub street: Option<String>,
    pub neighborhood: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.neighborhood.is_none()
            && self.district.is_none()
            && self.city.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

/// State of the property as advertised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    NewBuild,
    Good,
    NeedsRenovation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Elevator,
    Exterior,
    Garage,
    Terrace,
    Balcony,
    StorageRoom,
    BuiltInWardrobes,
    Furnished,
    AirConditioning,
    SwimmingPool,
    EquippedKitchen,
}

/// One normalized listing, the durable unit of output.
///
/// Field order here is the column order of the output file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub listing_id: String,
    /// The advertiser's own reference for the listing.
    pub reference: Field<String>,
    pub url: String,
    pub title: Field<String>,
    pub property_type: Field<PropertyType>,
    pub price: Field<Price>,
    pub price_per_m2: Field<f64>,
    pub surface_area_m2: Field<f64>,
    pub usable_area_m2: Field<f64>,
    pub plot_area_m2: Field<f64>,
    pub rooms: Field<u32>,
    pub bathrooms: Field<u32>,
    pub floor: Field<Floor>,
    /// Number of storeys of a house, not the level of a flat.
    pub storeys: Field<u32>,
    pub location: Field<Location>,
    pub description: Field<String>,
    pub features: BTreeSet<Feature>,
    pub orientation: Field<Vec<Orientation>>,
    pub heating: Field<String>,
    pub condition: Field<Condition>,
    pub construction_year: Field<u32>,
    pub energy_consumption: Field<String>,
    pub energy_emissions: Field<String>,
    pub thumbnail_url: Field<String>,
    pub published_at: Field<NaiveDate>,
    pub scraped_at: DateTime<Utc>,
}
