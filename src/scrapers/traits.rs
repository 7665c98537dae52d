use crate::error::ExtractionError;
use crate::fetcher::RawPage;
use crate::scrapers::types::{IndexPage, ListingDetail};

/// Common trait for all listing-site parsers
/// Each site (or markup generation of a site) gets its own implementation
pub trait ListingParser: Send + Sync {
    /// Parse a results page into listing summaries.
    ///
    /// A page with a results container but no cards is `Ok` with no
    /// summaries. A page this parser does not recognise at all is
    /// [`ExtractionError::SchemaMismatch`].
    fn extract_summaries(&self, page: &RawPage) -> Result<IndexPage, ExtractionError>;

    /// Parse a listing's own page.
    fn extract_detail(&self, page: &RawPage) -> Result<ListingDetail, ExtractionError>;

    /// Get the name of the parser
    fn site_name(&self) -> &'static str;
}
