//! Ranked retrieval over the catalog index.
//!
//! [`search_single`] answers one query vector with a thresholded top-K;
//! [`search_hybrid`] fuses an image query and a text query by summing their
//! scores over the intersection of two large candidate pools.

pub mod hybrid;
pub mod percent;
pub mod single;
pub mod types;

pub use hybrid::{fuse, search_hybrid};
pub use percent::{percent_from_cosine, percent_from_fused};
pub use single::search_single;
pub use types::{Corpus, Hit, RawHit};
