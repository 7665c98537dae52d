pub mod idealista;
pub mod traits;
pub mod types;

pub use idealista::{CardTemplate, IdealistaParser};
pub use traits::ListingParser;
pub use types::{IndexPage, ListingDetail, ListingSummary};
