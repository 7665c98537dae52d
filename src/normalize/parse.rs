//! Field-level parsers for listing text.
//!
//! Every function here is pure and total: malformed input comes back as a
//! [`NormalizationError`], never as a panic or a plausible-looking default.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;

use super::NumberLocale;
use crate::error::NormalizationError;
use crate::models::{
    Condition, Currency, Feature, Floor, Location, Orientation, Price, PricePeriod, PropertyType,
};

const SQFT_TO_M2: f64 = 0.092_903;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]+(?:[.,\s\u{a0}\u{202f}][0-9]+)*").expect("valid number regex")
});
static ROOMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:hab|dormitorio|bedroom|room|rum\b)").expect("valid rooms regex")
});
static BATHROOMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:baño|bano|bathroom|bath)").expect("valid bathrooms regex")
});
static FLOOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:planta|floor)\s*(-?\d+)|(-?\d+)\s*(?:ª|º|st|nd|rd|th)?\s*(?:planta|floor)")
        .expect("valid floor regex")
});
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid iso date regex"));
static SLASH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("valid slash date regex"));
static SPANISH_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d{1,2})\s+de\s+(enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|setiembre|octubre|noviembre|diciembre)(?:\s+de\s+(\d{4}))?",
    )
    .expect("valid spanish date regex")
});
static DAYS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)hace\s+(\d+)\s+d[ií]as?").expect("valid days-ago regex"));
static USABLE_AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9][0-9.,]*)\s*m[²2]\s*[úu]tiles").expect("valid usable area regex")
});
static PLOT_AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)parcela\D*?([0-9][0-9.,]*)\s*m[²2]").expect("valid plot area regex")
});
static STOREYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s+plantas\b").expect("valid storeys regex"));
static BUILT_IN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)construid[oa]\s+en\s+(\d{4})").expect("valid year regex"));
static HEATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)calefacci[óo]n\s*:?\s*(.*)").expect("valid heating regex"));

/// Parses the first number in `raw`, honouring the locale's separators.
///
/// A separator that appears more than once, or a thousands separator
/// followed by exactly three digits, is treated as grouping. With both `.`
/// and `,` present the last one is the decimal point. Spaces always group.
pub fn parse_number(raw: &str, locale: NumberLocale) -> Result<f64, NormalizationError> {
    if raw.trim().is_empty() {
        return Err(NormalizationError::Empty);
    }
    let token = NUMBER_RE
        .find(raw)
        .ok_or_else(|| NormalizationError::NotNumeric {
            raw: raw.to_owned(),
        })?
        .as_str();
    let compact: String = token.chars().filter(|c| !c.is_whitespace()).collect();

    let dots = compact.matches('.').count();
    let commas = compact.matches(',').count();
    let canonical = match (dots, commas) {
        (0, 0) => compact,
        (_, 0) => resolve_single_separator(&compact, '.', dots, locale),
        (0, _) => resolve_single_separator(&compact, ',', commas, locale),
        _ => {
            let decimal = if compact.rfind('.') > compact.rfind(',') { '.' } else { ',' };
            compact
                .chars()
                .filter(|c| *c == decimal || c.is_ascii_digit())
                .map(|c| if c == decimal { '.' } else { c })
                .collect()
        }
    };

    canonical
        .parse::<f64>()
        .map_err(|_| NormalizationError::NotNumeric {
            raw: raw.to_owned(),
        })
}

fn resolve_single_separator(s: &str, sep: char, count: usize, locale: NumberLocale) -> String {
    let grouping = if count > 1 {
        true
    } else if sep == locale.decimal_separator() {
        false
    } else {
        s.rsplit(sep).next().is_some_and(|tail| tail.len() == 3)
    };
    if grouping {
        s.chars().filter(|c| *c != sep).collect()
    } else {
        s.replace(sep, ".")
    }
}

pub fn parse_price(raw: &str, locale: NumberLocale) -> Result<Price, NormalizationError> {
    let lower = raw.to_lowercase();
    let amount = parse_number(raw, locale)?;
    if amount <= 0.0 {
        return Err(NormalizationError::OutOfRange {
            raw: raw.to_owned(),
        });
    }

    let currency = if lower.contains('€') || lower.contains("eur") {
        Currency::Eur
    } else if lower.contains('$') || lower.contains("usd") {
        Currency::Usd
    } else if lower.contains('£') || lower.contains("gbp") {
        Currency::Gbp
    } else if lower.contains("kr") || lower.contains("sek") {
        Currency::Sek
    } else {
        locale.default_currency()
    };

    let period = ["/mes", "/month", "al mes", "per month", "/mån"]
        .iter()
        .any(|p| lower.contains(p))
        .then_some(PricePeriod::Monthly);

    Ok(Price {
        amount,
        currency,
        period,
    })
}

/// Built surface. Plot sizes and usable-only surfaces do not count.
pub fn looks_like_area(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    lower.chars().any(|c| c.is_ascii_digit())
        && ["m²", "m2", "sq", "ft²", "ft2", "kvm", "metros"]
            .iter()
            .any(|u| lower.contains(u))
        && !lower.contains("parcela")
        && !(USABLE_AREA_RE.is_match(raw) && !lower.contains("construid"))
}

/// Parses a surface in square metres, converting square feet.
pub fn parse_area(raw: &str, locale: NumberLocale) -> Result<f64, NormalizationError> {
    let value = parse_number(raw, locale)?;
    let lower = raw.to_lowercase();
    let factor = if ["ft²", "ft2", "sq ft", "sq. ft", "sqft"].iter().any(|u| lower.contains(u)) {
        SQFT_TO_M2
    } else if ["m²", "m2", "sq.m", "sqm", "sq m", "kvm", "kvadratmeter", "metros"]
        .iter()
        .any(|u| lower.contains(u))
    {
        1.0
    } else {
        return Err(NormalizationError::UnknownUnit {
            raw: raw.to_owned(),
        });
    };
    if value <= 0.0 {
        return Err(NormalizationError::OutOfRange {
            raw: raw.to_owned(),
        });
    }
    Ok(value * factor)
}

fn positive_area(raw: &str, number: &str, locale: NumberLocale) -> Result<f64, NormalizationError> {
    let value = parse_number(number, locale)?;
    if value <= 0.0 {
        return Err(NormalizationError::OutOfRange {
            raw: raw.to_owned(),
        });
    }
    Ok(value)
}

pub fn looks_like_usable_area(raw: &str) -> bool {
    USABLE_AREA_RE.is_match(raw)
}

/// Usable surface from text such as "85 m² construidos, 78 m² útiles".
pub fn parse_usable_area(raw: &str, locale: NumberLocale) -> Result<f64, NormalizationError> {
    let caps = USABLE_AREA_RE
        .captures(raw)
        .ok_or_else(|| NormalizationError::NotNumeric {
            raw: raw.to_owned(),
        })?;
    positive_area(raw, &caps[1], locale)
}

pub fn looks_like_plot_area(raw: &str) -> bool {
    raw.to_lowercase().contains("parcela")
}

/// Plot surface from text such as "Parcela de 1.200 m²".
pub fn parse_plot_area(raw: &str, locale: NumberLocale) -> Result<f64, NormalizationError> {
    let caps = PLOT_AREA_RE
        .captures(raw)
        .ok_or_else(|| NormalizationError::NotNumeric {
            raw: raw.to_owned(),
        })?;
    positive_area(raw, &caps[1], locale)
}

fn is_studio(lower: &str) -> bool {
    lower.contains("estudio") || lower.contains("studio")
}

pub fn looks_like_rooms(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    ROOMS_RE.is_match(raw) || is_studio(&lower) || lower.contains("sin habitaciones")
}

/// Parses a bedroom count. Studios have zero bedrooms.
pub fn parse_rooms(raw: &str) -> Result<u32, NormalizationError> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return Err(NormalizationError::Empty);
    }
    if let Some(caps) = ROOMS_RE.captures(&lower) {
        return caps[1].parse().map_err(|_| NormalizationError::OutOfRange {
            raw: raw.to_owned(),
        });
    }
    if is_studio(&lower) || lower.contains("sin habitaciones") {
        return Ok(0);
    }
    Err(NormalizationError::NotNumeric {
        raw: raw.to_owned(),
    })
}

pub fn looks_like_bathrooms(raw: &str) -> bool {
    BATHROOMS_RE.is_match(raw)
}

pub fn parse_bathrooms(raw: &str) -> Result<u32, NormalizationError> {
    let caps = BATHROOMS_RE
        .captures(raw)
        .ok_or_else(|| NormalizationError::NotNumeric {
            raw: raw.to_owned(),
        })?;
    caps[1].parse().map_err(|_| NormalizationError::OutOfRange {
        raw: raw.to_owned(),
    })
}

pub fn looks_like_floor(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    lower.starts_with("planta")
        || lower.starts_with("bajo")
        || lower.starts_with("floor")
        || lower.contains(" floor")
        || lower.contains("entreplanta")
        || lower.contains("sótano")
        || lower.contains("sotano")
}

pub fn parse_floor(raw: &str) -> Result<Floor, NormalizationError> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return Err(NormalizationError::Empty);
    }
    if lower.contains("semisótano") || lower.contains("semisotano") {
        return Ok(Floor::Named("semisótano".into()));
    }
    if lower.contains("sótano") || lower.contains("sotano") || lower.contains("basement") {
        return Ok(Floor::Level(-1));
    }
    if lower.contains("entreplanta") {
        return Ok(Floor::Named("entreplanta".into()));
    }
    if lower.starts_with("bajo") || lower.contains("planta baja") || lower.contains("ground floor") {
        return Ok(Floor::Level(0));
    }
    let caps = FLOOR_RE
        .captures(&lower)
        .ok_or_else(|| NormalizationError::NotNumeric {
            raw: raw.to_owned(),
        })?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .map(Floor::Level)
        .ok_or_else(|| NormalizationError::OutOfRange {
            raw: raw.to_owned(),
        })
}

pub fn looks_like_storeys(raw: &str) -> bool {
    STOREYS_RE.is_match(raw)
}

/// Storey count of a house ("2 plantas").
pub fn parse_storeys(raw: &str) -> Result<u32, NormalizationError> {
    let caps = STOREYS_RE
        .captures(raw)
        .ok_or_else(|| NormalizationError::NotNumeric {
            raw: raw.to_owned(),
        })?;
    match caps[1].parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(NormalizationError::OutOfRange {
            raw: raw.to_owned(),
        }),
    }
}

pub fn looks_like_construction_year(raw: &str) -> bool {
    BUILT_IN_RE.is_match(raw)
}

pub fn parse_construction_year(raw: &str) -> Result<u32, NormalizationError> {
    let caps = BUILT_IN_RE
        .captures(raw)
        .ok_or_else(|| NormalizationError::NotNumeric {
            raw: raw.to_owned(),
        })?;
    match caps[1].parse::<u32>() {
        Ok(year) if (1500..=2100).contains(&year) => Ok(year),
        _ => Err(NormalizationError::OutOfRange {
            raw: raw.to_owned(),
        }),
    }
}

pub fn looks_like_orientation(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    lower.starts_with("orientación") || lower.starts_with("orientacion")
}

/// Parses "Orientación norte, sur, este" into compass points.
pub fn parse_orientation(raw: &str) -> Result<Vec<Orientation>, NormalizationError> {
    let lower = raw.trim().to_lowercase();
    let rest = lower
        .strip_prefix("orientación")
        .or_else(|| lower.strip_prefix("orientacion"))
        .unwrap_or(lower.as_str());

    let mut points = Vec::new();
    for token in rest
        .split([',', '/'])
        .flat_map(|part| part.split(" y "))
        .map(|t| t.trim().trim_end_matches('.'))
        .filter(|t| !t.is_empty())
    {
        let point = match token {
            "norte" => Orientation::North,
            "noreste" | "nordeste" => Orientation::NorthEast,
            "este" => Orientation::East,
            "sureste" | "sudeste" => Orientation::SouthEast,
            "sur" => Orientation::South,
            "suroeste" | "sudoeste" => Orientation::SouthWest,
            "oeste" => Orientation::West,
            "noroeste" => Orientation::NorthWest,
            _ => {
                return Err(NormalizationError::Unrecognized {
                    raw: raw.to_owned(),
                })
            }
        };
        if !points.contains(&point) {
            points.push(point);
        }
    }
    if points.is_empty() {
        return Err(NormalizationError::Empty);
    }
    Ok(points)
}

pub fn looks_like_heating(raw: &str) -> bool {
    HEATING_RE.is_match(raw)
}

/// Heating system as described ("individual: Gas natural"), or "none".
pub fn parse_heating(raw: &str) -> Result<String, NormalizationError> {
    let lower = raw.trim().to_lowercase();
    if lower.starts_with("sin calefacci") || lower.contains("no dispone de calefacci") {
        return Ok("none".to_owned());
    }
    let caps = HEATING_RE
        .captures(raw)
        .ok_or_else(|| NormalizationError::Unrecognized {
            raw: raw.to_owned(),
        })?;
    let kind = caps[1].trim().trim_end_matches('.');
    if kind.is_empty() {
        return Err(NormalizationError::Unrecognized {
            raw: raw.to_owned(),
        });
    }
    Ok(kind.to_owned())
}

pub fn looks_like_condition(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    ["segunda mano", "obra nueva", "buen estado", "para reformar", "a reformar"]
        .iter()
        .any(|m| lower.contains(m))
}

pub fn parse_condition(raw: &str) -> Result<Condition, NormalizationError> {
    let lower = raw.to_lowercase();
    if lower.contains("reformar") {
        Ok(Condition::NeedsRenovation)
    } else if lower.contains("buen estado") {
        Ok(Condition::Good)
    } else if lower.contains("obra nueva") {
        Ok(Condition::NewBuild)
    } else {
        Err(NormalizationError::Unrecognized {
            raw: raw.to_owned(),
        })
    }
}

/// Strips the "Ref." / "Referencia del anuncio:" label from an advert reference.
pub fn parse_reference(raw: &str) -> Result<String, NormalizationError> {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    let label = ["referencia del anuncio", "referencia", "ref."]
        .iter()
        .find(|label| lower.starts_with(**label))
        .map_or(0, |label| label.len());
    let reference = trimmed
        .get(label..)
        .unwrap_or(trimmed)
        .trim_start_matches([':', ' '])
        .trim();
    if reference.is_empty() {
        return Err(NormalizationError::Empty);
    }
    Ok(reference.to_owned())
}

/// Maps the leading word(s) of a listing title to a property type.
pub fn parse_property_type(title: &str) -> Result<PropertyType, NormalizationError> {
    let lower = title.trim().to_lowercase();
    if lower.is_empty() {
        return Err(NormalizationError::Empty);
    }
    const PREFIXES: &[(&str, PropertyType)] = &[
        ("casa rural", PropertyType::CountryHouse),
        ("finca", PropertyType::CountryHouse),
        ("cortijo", PropertyType::CountryHouse),
        ("masía", PropertyType::CountryHouse),
        ("country house", PropertyType::CountryHouse),
        ("piso", PropertyType::Flat),
        ("flat", PropertyType::Flat),
        ("apartamento", PropertyType::Apartment),
        ("apartment", PropertyType::Apartment),
        ("ático", PropertyType::Penthouse),
        ("atico", PropertyType::Penthouse),
        ("penthouse", PropertyType::Penthouse),
        ("dúplex", PropertyType::Duplex),
        ("duplex", PropertyType::Duplex),
        ("estudio", PropertyType::Studio),
        ("studio", PropertyType::Studio),
        ("loft", PropertyType::Loft),
        ("chalet", PropertyType::House),
        ("casa", PropertyType::House),
        ("villa", PropertyType::House),
        ("house", PropertyType::House),
        ("habitación", PropertyType::Room),
        ("habitacion", PropertyType::Room),
        ("room", PropertyType::Room),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, kind)| *kind)
        .ok_or_else(|| NormalizationError::UnknownPropertyType {
            raw: title.to_owned(),
        })
}

fn is_street(part: &str) -> bool {
    const STREET_PREFIXES: &[&str] = &[
        "calle", "c/", "avenida", "avda", "paseo", "plaza", "ronda", "camino", "travesía",
        "glorieta", "carretera", "street", "road", "avenue",
    ];
    let lower = part.to_lowercase();
    STREET_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Builds a structured location from breadcrumb parts.
///
/// Detail pages label their parts ("Barrio X", "Distrito Y") and list the
/// city right after them; card titles are unlabelled and end with the city.
pub fn parse_location<S: AsRef<str>>(parts: &[S]) -> Result<Location, NormalizationError> {
    let mut location = Location::default();
    let mut plain: Vec<String> = Vec::new();
    let mut labelled = false;

    for part in parts.iter().map(|p| p.as_ref().trim()).filter(|p| !p.is_empty()) {
        if let Some(rest) = part.strip_prefix("Barrio ") {
            location.neighborhood = Some(rest.trim().to_owned());
            labelled = true;
        } else if let Some(rest) = part.strip_prefix("Distrito ") {
            location.district = Some(rest.trim().to_owned());
            labelled = true;
        } else if location.street.is_none() && plain.is_empty() && is_street(part) {
            location.street = Some(part.to_owned());
        } else {
            plain.push(part.to_owned());
        }
    }

    if labelled {
        location.city = plain.into_iter().next();
    } else if let Some(city) = plain.pop() {
        location.city = Some(city);
        let mut middle = plain.into_iter();
        location.neighborhood = middle.next();
        location.district = middle.next();
    }

    if location.is_empty() {
        return Err(NormalizationError::Empty);
    }
    Ok(location)
}

fn spanish_month(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" | "setiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parses a publication/update date relative to `today`.
///
/// A day-and-month without a year that would lie in the future belongs to
/// the previous year.
pub fn parse_published_at(raw: &str, today: NaiveDate) -> Result<NaiveDate, NormalizationError> {
    let unrecognized = || NormalizationError::UnrecognizedDate {
        raw: raw.to_owned(),
    };
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return Err(NormalizationError::Empty);
    }

    if let Some(c) = ISO_DATE_RE.captures(&lower) {
        return NaiveDate::from_ymd_opt(
            c[1].parse().map_err(|_| unrecognized())?,
            c[2].parse().map_err(|_| unrecognized())?,
            c[3].parse().map_err(|_| unrecognized())?,
        )
        .ok_or_else(unrecognized);
    }
    if let Some(c) = SLASH_DATE_RE.captures(&lower) {
        return NaiveDate::from_ymd_opt(
            c[3].parse().map_err(|_| unrecognized())?,
            c[2].parse().map_err(|_| unrecognized())?,
            c[1].parse().map_err(|_| unrecognized())?,
        )
        .ok_or_else(unrecognized);
    }
    if let Some(c) = SPANISH_DATE_RE.captures(&lower) {
        let day: u32 = c[1].parse().map_err(|_| unrecognized())?;
        let month = spanish_month(&c[2]).ok_or_else(unrecognized)?;
        if let Some(year) = c.get(3) {
            let year: i32 = year.as_str().parse().map_err(|_| unrecognized())?;
            return NaiveDate::from_ymd_opt(year, month, day).ok_or_else(unrecognized);
        }
        let this_year = NaiveDate::from_ymd_opt(today.year(), month, day).ok_or_else(unrecognized)?;
        if this_year > today {
            return NaiveDate::from_ymd_opt(today.year() - 1, month, day).ok_or_else(unrecognized);
        }
        return Ok(this_year);
    }
    if let Some(c) = DAYS_AGO_RE.captures(&lower) {
        let days: u64 = c[1].parse().map_err(|_| unrecognized())?;
        return today.checked_sub_days(Days::new(days)).ok_or_else(unrecognized);
    }
    if lower.contains("hoy") {
        return Ok(today);
    }
    if lower.contains("ayer") {
        return today.checked_sub_days(Days::new(1)).ok_or_else(unrecognized);
    }
    Err(unrecognized())
}

/// Collects amenity flags mentioned anywhere in `texts`.
pub fn parse_features<'a>(texts: impl IntoIterator<Item = &'a str>) -> BTreeSet<Feature> {
    let mut features = BTreeSet::new();
    for text in texts {
        let lower = text.to_lowercase();
        let has = |needle: &str| lower.contains(needle);

        if (has("ascensor") && !has("sin ascensor")) || has("elevator") || has("lift") {
            features.insert(Feature::Elevator);
        }
        if has("exterior") {
            features.insert(Feature::Exterior);
        }
        let garage_included = has("garaje incluid")
            || has("con garaje")
            || ((has("garaje") || has("parking")) && has("incluida en el precio"))
            || has("garage included")
            || has("with garage");
        if garage_included && !has("opcional") && !has("optional") {
            features.insert(Feature::Garage);
        }
        if has("terraza") || has("terrace") {
            features.insert(Feature::Terrace);
        }
        if has("balcón") || has("balcon") {
            features.insert(Feature::Balcony);
        }
        if has("trastero") || has("storage room") {
            features.insert(Feature::StorageRoom);
        }
        if has("armarios empotrados") || has("built-in wardrobe") {
            features.insert(Feature::BuiltInWardrobes);
        }
        if (has("amueblad") && !has("sin amueblar")) || (has("furnished") && !has("unfurnished")) {
            features.insert(Feature::Furnished);
        }
        if has("aire acondicionado") || has("air conditioning") {
            features.insert(Feature::AirConditioning);
        }
        if has("piscina") || has("swimming pool") {
            features.insert(Feature::SwimmingPool);
        }
        if (has("cocina equipada") && !has("sin cocina equipada")) || has("equipped kitchen") {
            features.insert(Feature::EquippedKitchen);
        }
    }
    features
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
