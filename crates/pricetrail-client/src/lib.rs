pub mod client;
pub mod enrich;
pub mod error;
pub mod executor;
pub mod negotiate;
pub mod normalize;
pub mod pagination;
pub mod retry;
pub mod sign;

pub use client::{CatalogClient, ClientSettings, ProductQuery};
pub use enrich::{enrich, enrich_each, run_bounded, BatchReport, EnrichFailure, EnrichedProduct};
pub use error::ClientError;
pub use negotiate::{Candidate, Endpoint, Negotiated, TimestampFormat, DEFAULT_CANDIDATES};
pub use normalize::{normalize_products, normalize_sku_detail};
pub use pagination::{collect_pages, PaginationOptions};
pub use retry::{retry_with_backoff, Disposition, RetryPolicy};
pub use sign::{sign, ApiParams, SignAlgorithm, SignMethod};
