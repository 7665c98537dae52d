use serde::{Deserialize, Serialize};

/// Lightweight view of one listing card on a results page.
///
/// Every field except the id and URL is raw text exactly as found; turning it
/// into typed values is the normalizer's job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingSummary {
    pub listing_id: String,
    pub url: String,
    pub title_raw: Option<String>,
    pub price_raw: Option<String>,
    pub location_raw: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Short feature strings, e.g. "3 hab.", "85 m²", "Planta 2ª exterior".
    pub detail_items: Vec<String>,
    pub description_raw: Option<String>,
}

/// What an index page yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPage {
    pub summaries: Vec<ListingSummary>,
    /// Highest page number advertised by the pagination widget.
    pub total_pages: Option<u32>,
    /// Page number the pagination widget marks as current.
    pub current_page: Option<u32>,
    /// Cards that were recognised but had no usable listing id.
    pub skipped_cards: usize,
}

/// Fields found on a listing's own page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingDetail {
    pub title: Option<String>,
    pub reference: Option<String>,
    pub price_raw: Option<String>,
    /// Headline features next to the price ("85 m²", "3 hab.", "Planta 2ª").
    pub info_features: Vec<String>,
    /// The "basic features" list ("2 baños", "Terraza", "Construido en 1975").
    pub basic_features: Vec<String>,
    /// Header-map breadcrumb: street, "Barrio X", "Distrito Y", city.
    pub location_parts: Vec<String>,
    pub description: Option<String>,
    /// e.g. "Anuncio actualizado el 12 de marzo".
    pub updated_raw: Option<String>,
    pub price_per_m2_raw: Option<String>,
    pub energy_consumption: Option<String>,
    pub energy_emissions: Option<String>,
}
