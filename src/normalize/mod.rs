//! Turns raw card/detail text into a [`ListingRecord`].
//!
//! Nothing in here fails as a whole: each field either parses, is absent, or
//! is marked unparseable with a [`FieldWarning`] the crawler tallies.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::NormalizationError;
use crate::models::{Currency, Field, ListingRecord, PropertyType};
use crate::scrapers::{ListingDetail, ListingSummary};

pub mod parse;

pub use parse::{
    parse_area, parse_bathrooms, parse_condition, parse_construction_year, parse_features,
    parse_floor, parse_heating, parse_location, parse_number, parse_orientation, parse_plot_area,
    parse_price, parse_property_type, parse_published_at, parse_reference, parse_rooms,
    parse_storeys, parse_usable_area,
};

/// Number formatting convention of the target site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NumberLocale {
    /// `1.250,50 €`
    #[default]
    Es,
    /// `$1,250.50`
    En,
}

impl NumberLocale {
    pub fn decimal_separator(self) -> char {
        match self {
            NumberLocale::Es => ',',
            NumberLocale::En => '.',
        }
    }

    /// Currency assumed when a price carries no symbol.
    pub fn default_currency(self) -> Currency {
        match self {
            NumberLocale::Es => Currency::Eur,
            NumberLocale::En => Currency::Usd,
        }
    }
}

impl FromStr for NumberLocale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "es" | "es-es" => Ok(NumberLocale::Es),
            "en" | "en-us" | "en-gb" => Ok(NumberLocale::En),
            other => Err(format!("unknown locale {other:?}, expected es or en")),
        }
    }
}

impl fmt::Display for NumberLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NumberLocale::Es => "es",
            NumberLocale::En => "en",
        })
    }
}

/// A field that had text but could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWarning {
    pub field: &'static str,
    pub error: NormalizationError,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: ListingRecord,
    pub warnings: Vec<FieldWarning>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    locale: NumberLocale,
}

struct Collector {
    warnings: Vec<FieldWarning>,
}

impl Collector {
    fn field<T>(
        &mut self,
        name: &'static str,
        raw: Option<&str>,
        parse: impl FnOnce(&str) -> Result<T, NormalizationError>,
    ) -> Field<T> {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return Field::absent();
        };
        match parse(raw) {
            Ok(value) => Field::Present(value),
            Err(error) => {
                self.warnings.push(FieldWarning { field: name, error });
                Field::unparseable()
            }
        }
    }
}

fn text(raw: Option<&str>) -> Field<String> {
    raw.map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_owned)
        .into()
}

impl Normalizer {
    pub fn new(locale: NumberLocale) -> Self {
        Self { locale }
    }

    /// Builds the record for one listing. Detail-page values take precedence
    /// over card values for every field both carry.
    pub fn normalize(
        &self,
        summary: &ListingSummary,
        detail: Option<&ListingDetail>,
        scraped_at: DateTime<Utc>,
    ) -> Normalized {
        let locale = self.locale;
        let mut c = Collector {
            warnings: Vec::new(),
        };

        let items: Vec<&str> = detail
            .into_iter()
            .flat_map(|d| d.info_features.iter().chain(&d.basic_features))
            .chain(&summary.detail_items)
            .map(String::as_str)
            .collect();
        let find = |pred: fn(&str) -> bool| items.iter().copied().find(|item| pred(item));

        let title_raw = detail
            .and_then(|d| d.title.as_deref())
            .or(summary.title_raw.as_deref());
        let title = text(title_raw);
        let property_type = c.field("property_type", title_raw, parse_property_type);

        let price_raw = detail
            .and_then(|d| d.price_raw.as_deref())
            .or(summary.price_raw.as_deref());
        let price = c.field("price", price_raw, |r| parse_price(r, locale));

        let surface_area_m2 = c.field("surface_area_m2", find(parse::looks_like_area), |r| {
            parse_area(r, locale)
        });

        let usable_area_m2 = c.field(
            "usable_area_m2",
            find(parse::looks_like_usable_area),
            |r| parse_usable_area(r, locale),
        );
        let plot_area_m2 = c.field("plot_area_m2", find(parse::looks_like_plot_area), |r| {
            parse_plot_area(r, locale)
        });

        let mut price_per_m2 = c.field(
            "price_per_m2",
            detail.and_then(|d| d.price_per_m2_raw.as_deref()),
            |r| parse_number(r, locale),
        );
        if price_per_m2.is_missing() {
            if let (Some(p), Some(area)) = (price.value(), surface_area_m2.value()) {
                if p.period.is_none() && *area > 0.0 {
                    price_per_m2 = Field::Present((p.amount / area).round());
                }
            }
        }

        let mut rooms = c.field("rooms", find(parse::looks_like_rooms), parse_rooms);
        if rooms.is_missing() && property_type.value() == Some(&PropertyType::Studio) {
            rooms = Field::Present(0);
        }
        let bathrooms = c.field("bathrooms", find(parse::looks_like_bathrooms), parse_bathrooms);
        let floor = c.field("floor", find(parse::looks_like_floor), parse_floor);
        let storeys = c.field("storeys", find(parse::looks_like_storeys), parse_storeys);
        let orientation = c.field(
            "orientation",
            find(parse::looks_like_orientation),
            parse_orientation,
        );
        let heating = c.field("heating", find(parse::looks_like_heating), parse_heating);
        let condition = c.field("condition", find(parse::looks_like_condition), parse_condition);
        let construction_year = c.field(
            "construction_year",
            find(parse::looks_like_construction_year),
            parse_construction_year,
        );
        let reference = c.field(
            "reference",
            detail.and_then(|d| d.reference.as_deref()),
            parse_reference,
        );

        let location = match detail.map(|d| d.location_parts.as_slice()) {
            Some(parts) if !parts.is_empty() => {
                let joined = parts.join(", ");
                c.field("location", Some(joined.as_str()), |_| parse_location(parts))
            }
            _ => c.field("location", summary.location_raw.as_deref(), |r| {
                let parts: Vec<&str> = r.split(',').collect();
                parse_location(&parts)
            }),
        };

        let description = text(
            detail
                .and_then(|d| d.description.as_deref())
                .or(summary.description_raw.as_deref()),
        );

        let published_at = c.field(
            "published_at",
            detail.and_then(|d| d.updated_raw.as_deref()),
            |r| parse_published_at(r, scraped_at.date_naive()),
        );

        let record = ListingRecord {
            listing_id: summary.listing_id.clone(),
            reference,
            url: summary.url.clone(),
            title,
            property_type,
            price,
            price_per_m2,
            surface_area_m2,
            usable_area_m2,
            plot_area_m2,
            rooms,
            bathrooms,
            floor,
            storeys,
            location,
            description,
            features: parse_features(items.iter().copied()),
            orientation,
            heating,
            condition,
            construction_year,
            energy_consumption: text(detail.and_then(|d| d.energy_consumption.as_deref())),
            energy_emissions: text(detail.and_then(|d| d.energy_emissions.as_deref())),
            thumbnail_url: text(summary.thumbnail_url.as_deref()),
            published_at,
            scraped_at,
        };

        Normalized {
            record,
            warnings: c.warnings,
        }
    }
}
