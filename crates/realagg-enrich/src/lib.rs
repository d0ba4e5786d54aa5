pub mod bulk;
pub mod error;
pub mod geocode;
pub mod ruian;

pub use bulk::{bulk_geocode, bulk_ruian};
pub use error::EnrichError;
pub use geocode::GeocodeClient;
pub use ruian::{build_cadastre_url, RuianClient, RuianLookup};
