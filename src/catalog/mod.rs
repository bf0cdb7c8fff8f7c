//! Product catalog: image discovery, the `products` table, and the read-only
//! metadata snapshot used to enrich search hits.

pub mod metadata;
pub mod products;
pub mod scan;

pub use metadata::{MatchKind, MetadataStore, ProductInfo};
