use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::error::ExtractionError;
use crate::fetcher::RawPage;
use crate::scrapers::traits::ListingParser;
use crate::scrapers::types::{IndexPage, ListingDetail, ListingSummary};

/// Listing-card markup generations the parser understands.
///
/// The variant is resolved per page: the first template whose card selector
/// matches anything wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardTemplate {
    /// `<article class="item" data-element-id=...>` cards.
    Article,
    /// Older `<div class="listing-card" data-listing-id=...>` cards.
    Legacy,
}

struct TemplateCss {
    card: &'static str,
    id_attrs: &'static [&'static str],
    link: &'static str,
    title: &'static str,
    price: &'static str,
    location: Option<&'static str>,
    details: &'static str,
    description: &'static str,
    thumbnail: &'static str,
}

impl CardTemplate {
    const ALL: [CardTemplate; 2] = [CardTemplate::Article, CardTemplate::Legacy];

    fn css(self) -> TemplateCss {
        match self {
            CardTemplate::Article => TemplateCss {
                card: "article.item",
                id_attrs: &["data-element-id", "data-adid"],
                link: "a.item-link",
                title: "a.item-link",
                price: ".item-price",
                location: None,
                details: ".item-detail",
                description: ".item-description",
                thumbnail: "img",
            },
            CardTemplate::Legacy => TemplateCss {
                card: "div.listing-card",
                id_attrs: &["data-listing-id"],
                link: "a.listing-card__link",
                title: ".listing-card__title",
                price: ".listing-card__price",
                location: Some(".listing-card__location"),
                details: "ul.listing-card__features li",
                description: ".listing-card__description",
                thumbnail: "img",
            },
        }
    }
}

struct CompiledTemplate {
    kind: CardTemplate,
    card: Selector,
    id_attrs: &'static [&'static str],
    link: Selector,
    title: Selector,
    price: Selector,
    location: Option<Selector>,
    details: Selector,
    description: Selector,
    thumbnail: Selector,
}

impl CompiledTemplate {
    fn new(kind: CardTemplate) -> Self {
        let css = kind.css();
        Self {
            kind,
            card: selector(css.card),
            id_attrs: css.id_attrs,
            link: selector(css.link),
            title: selector(css.title),
            price: selector(css.price),
            location: css.location.map(selector),
            details: selector(css.details),
            description: selector(css.description),
            thumbnail: selector(css.thumbnail),
        }
    }
}

struct DetailSelectors {
    title_main: Selector,
    page_title: Selector,
    reference: Selector,
    price: Selector,
    info_features: Selector,
    basic_features: Selector,
    energy_items: Selector,
    span: Selector,
    price_features: Selector,
    price_label: Selector,
    price_value: Selector,
    location_items: Selector,
    description: Selector,
    updated: Selector,
}

struct PaginationSelectors {
    total_attr: Selector,
    current: Selector,
    next: Selector,
    links: Selector,
}

/// Parser for Idealista-style result and detail pages.
pub struct IdealistaParser {
    templates: Vec<CompiledTemplate>,
    results_container: Selector,
    zero_results: Selector,
    pagination: PaginationSelectors,
    detail: DetailSelectors,
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static CSS selector is valid")
}

impl Default for IdealistaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl IdealistaParser {
    pub fn new() -> Self {
        Self {
            templates: CardTemplate::ALL.into_iter().map(CompiledTemplate::new).collect(),
            results_container: selector(
                "section.items-container, main.listing-items, div.listing-grid",
            ),
            zero_results: selector(".zero-results, .empty-search, #zero-results"),
            pagination: PaginationSelectors {
                total_attr: selector("[data-total-pages]"),
                current: selector(".pagination li.selected, .pagination [aria-current=\"page\"]"),
                next: selector(".pagination li.next a, .pagination a[rel=\"next\"]"),
                links: selector(".pagination a, .pagination li.selected"),
            },
            detail: DetailSelectors {
                title_main: selector(".main-info__title-main"),
                page_title: selector("title"),
                reference: selector("p.txt-ref"),
                price: selector(".info-data .info-data-price"),
                info_features: selector("div.info-features > span"),
                basic_features: selector(
                    "div.details-property-feature-one .details-property_features li",
                ),
                energy_items: selector(
                    "div.details-property-feature-two .details-property_features li",
                ),
                span: selector("span"),
                price_features: selector("article.price-feature p.flex-feature"),
                price_label: selector("span.flex-feature-details"),
                price_value: selector("strong.flex-feature-details"),
                location_items: selector("#headerMap li.header-map-list"),
                description: selector("div.comment p, div.adCommentsLanguage p"),
                updated: selector("p.stats-text, .date-update-text"),
            },
        }
    }

    fn parse_card(
        &self,
        template: &CompiledTemplate,
        card: ElementRef<'_>,
        base: Option<&Url>,
    ) -> Result<ListingSummary, ExtractionError> {
        let href = card
            .select(&template.link)
            .next()
            .and_then(|a| a.value().attr("href"));
        let url = href.map(|h| absolutize(base, h));

        let listing_id = template
            .id_attrs
            .iter()
            .find_map(|attr| card.value().attr(attr))
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty())
            .or_else(|| url.as_deref().and_then(listing_id_from_url))
            .ok_or(ExtractionError::MissingField {
                field: "listing_id",
            })?;
        let url = url.ok_or(ExtractionError::MissingField { field: "url" })?;

        let title_raw = first_text(card, &template.title).or_else(|| {
            card.select(&template.link)
                .next()
                .and_then(|a| a.value().attr("title"))
                .map(collapse_whitespace)
        });
        let location_raw = match &template.location {
            Some(sel) => first_text(card, sel),
            None => title_raw.as_deref().and_then(location_from_title),
        };
        let thumbnail_url = card.select(&template.thumbnail).next().and_then(|img| {
            img.value()
                .attr("src")
                .or_else(|| img.value().attr("data-src"))
                .filter(|src| !src.starts_with("data:"))
                .map(|src| absolutize(base, src))
        });

        Ok(ListingSummary {
            listing_id,
            url,
            title_raw,
            price_raw: first_text(card, &template.price),
            location_raw,
            thumbnail_url,
            detail_items: all_text(card, &template.details),
            description_raw: first_text(card, &template.description),
        })
    }

    fn parse_pagination(&self, doc: &Html) -> (Option<u32>, Option<u32>) {
        let sel = &self.pagination;
        let current = doc
            .select(&sel.current)
            .next()
            .and_then(|el| collapse_whitespace(&el.text().collect::<String>()).parse().ok());

        if let Some(total) = doc
            .select(&sel.total_attr)
            .next()
            .and_then(|el| el.value().attr("data-total-pages"))
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            return (Some(total), current);
        }

        // A windowed widget only tells us the total once there is no "next" link.
        let has_next = doc.select(&sel.next).next().is_some();
        let max_listed = doc
            .select(&sel.links)
            .filter_map(|el| collapse_whitespace(&el.text().collect::<String>()).parse::<u32>().ok())
            .max();
        let total = if has_next {
            None
        } else {
            max_listed.or(current)
        };
        (total, current)
    }
}

impl ListingParser for IdealistaParser {
    fn extract_summaries(&self, page: &RawPage) -> Result<IndexPage, ExtractionError> {
        let doc = Html::parse_document(&page.body);
        let base = Url::parse(&page.url).ok();
        let (total_pages, current_page) = self.parse_pagination(&doc);

        let matched = self
            .templates
            .iter()
            .find(|t| doc.select(&t.card).next().is_some());

        let Some(template) = matched else {
            let recognised = doc.select(&self.results_container).next().is_some()
                || doc.select(&self.zero_results).next().is_some();
            if recognised {
                debug!(url = %page.url, "results page has no listing cards");
                return Ok(IndexPage {
                    summaries: Vec::new(),
                    total_pages,
                    current_page,
                    skipped_cards: 0,
                });
            }
            return Err(ExtractionError::SchemaMismatch {
                url: page.url.clone(),
            });
        };

        let mut summaries = Vec::new();
        let mut skipped_cards = 0;
        for card in doc.select(&template.card) {
            match self.parse_card(template, card, base.as_ref()) {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    skipped_cards += 1;
                    warn!(url = %page.url, template = ?template.kind, error = %e, "skipping listing card");
                }
            }
        }

        debug!(
            url = %page.url,
            template = ?template.kind,
            cards = summaries.len(),
            skipped_cards,
            "extracted listing summaries"
        );
        Ok(IndexPage {
            summaries,
            total_pages,
            current_page,
            skipped_cards,
        })
    }

    fn extract_detail(&self, page: &RawPage) -> Result<ListingDetail, ExtractionError> {
        let doc = Html::parse_document(&page.body);
        let sel = &self.detail;

        let title = doc_text(&doc, &sel.title_main);
        let price_raw = doc_text(&doc, &sel.price);
        let location_parts: Vec<String> = doc
            .select(&sel.location_items)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|s| !s.is_empty())
            .collect();
        let basic_features: Vec<String> = doc
            .select(&sel.basic_features)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|s| !s.is_empty())
            .collect();

        if title.is_none() && price_raw.is_none() && location_parts.is_empty() && basic_features.is_empty() {
            return Err(ExtractionError::SchemaMismatch {
                url: page.url.clone(),
            });
        }

        let mut detail = ListingDetail {
            title: title.or_else(|| doc_text(&doc, &sel.page_title)),
            reference: doc_text(&doc, &sel.reference),
            price_raw,
            info_features: doc
                .select(&sel.info_features)
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .filter(|s| !s.is_empty())
                .collect(),
            basic_features,
            location_parts,
            description: {
                let paragraphs: Vec<String> = doc
                    .select(&sel.description)
                    .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                    .filter(|s| !s.is_empty())
                    .collect();
                (!paragraphs.is_empty()).then(|| paragraphs.join("\n"))
            },
            updated_raw: doc_text(&doc, &sel.updated),
            ..ListingDetail::default()
        };

        for item in doc.select(&sel.energy_items) {
            let spans: Vec<ElementRef<'_>> = item.select(&sel.span).collect();
            let [label, value, ..] = spans.as_slice() else {
                continue;
            };
            let label = collapse_whitespace(&label.text().collect::<String>());
            let rating = energy_rating(value);
            if label.starts_with("Consumo") {
                detail.energy_consumption = rating;
            } else if label.starts_with("Emisiones") {
                detail.energy_emissions = rating;
            }
        }

        for p in doc.select(&sel.price_features) {
            let Some(label) = p.select(&sel.price_label).next() else {
                continue;
            };
            let label = collapse_whitespace(&label.text().collect::<String>());
            if !label.contains("por m²") {
                continue;
            }
            let value = match p.select(&sel.price_value).next() {
                Some(strong) => collapse_whitespace(&strong.text().collect::<String>()),
                None => collapse_whitespace(&p.text().collect::<String>())
                    .replacen(&label, "", 1)
                    .trim()
                    .to_owned(),
            };
            if !value.is_empty() {
                detail.price_per_m2_raw = Some(value);
            }
        }

        Ok(detail)
    }

    fn site_name(&self) -> &'static str {
        "idealista"
    }
}

/// The rating letter encoded in an energy icon class (`icon-energy-c-e` -> "E"),
/// falling back to the visible text.
fn energy_rating(value: &ElementRef<'_>) -> Option<String> {
    let from_class = value
        .value()
        .classes()
        .find(|c| c.starts_with("icon-energy"))
        .and_then(|c| c.rsplit('-').next())
        .filter(|letter| letter.len() == 1 && letter.chars().all(|ch| ch.is_ascii_alphabetic()))
        .map(str::to_uppercase);
    from_class.or_else(|| {
        let text = collapse_whitespace(&value.text().collect::<String>());
        (!text.is_empty()).then_some(text)
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(|e| collapse_whitespace(&e.text().collect::<Vec<_>>().join(" ")))
        .filter(|s| !s.is_empty())
}

fn all_text(el: ElementRef<'_>, sel: &Selector) -> Vec<String> {
    el.select(sel)
        .map(|e| collapse_whitespace(&e.text().collect::<Vec<_>>().join(" ")))
        .filter(|s| !s.is_empty())
        .collect()
}

fn doc_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .map(|e| collapse_whitespace(&e.text().collect::<Vec<_>>().join(" ")))
        .filter(|s| !s.is_empty())
}

fn absolutize(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map_or_else(|| href.to_owned(), |u| u.to_string())
}

/// Last all-digit path segment, e.g. `/inmueble/10234567/` -> `10234567`.
pub(crate) fn listing_id_from_url(url: &str) -> Option<String> {
    let path = Url::parse(url)
        .map(|u| u.path().to_owned())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or(url).to_owned());
    path.split('/')
        .rev()
        .find(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_owned)
}

/// Card titles read "Piso en Calle de Atocha, Embajadores, Madrid"; the part
/// after the first " en " is the location.
fn location_from_title(title: &str) -> Option<String> {
    title
        .split_once(" en ")
        .map(|(_, rest)| rest.trim().to_owned())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "idealista_test.rs"]
mod tests;
