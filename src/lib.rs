//! Catalog image similarity search.
//!
//! Lustre embeds product photos and free-text queries into one CLIP vector space,
//! answers nearest-neighbor queries over an exact in-memory index, and fuses image
//! and text queries into a single ranking that keeps only products relevant to both.
//!
//! # Architecture
//!
//! - **Embeddings**: Local ONNX Runtime with CLIP ViT-B/32 (512 dimensions), image
//!   and text towers sharing one projection space
//! - **Index**: Brute-force inner-product search over unit vectors, persisted as a
//!   checksummed binary file plus an ordinal → image path CSV kept in lockstep
//! - **Metadata**: SQLite `products` table, loaded once into a read-only snapshot
//! - **Search**: Thresholded single-modality top-K, and hybrid image+text fusion over
//!   the intersection of two candidate pools
//! - **Transport**: HTTP (multipart uploads) or MCP over stdio / Streamable HTTP
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization, schema, migrations, and health checks
//! - [`embedding`] — Image/text embedding via ONNX Runtime
//! - [`index`] — Vector index, identifier map, on-disk format, and offline build
//! - [`catalog`] — Image discovery, product import, and the metadata snapshot
//! - [`search`] — Single-modality search, hybrid fusion, and percent conversion
//! - [`context`] — Process-wide query state with explicit initialize/shutdown
//! - [`background`] — Background removal for catalog photos
//! - [`stats`] — Catalog and index statistics

pub mod background;
pub mod catalog;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod search;
pub mod stats;
