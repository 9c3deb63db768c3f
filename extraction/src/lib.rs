//! Target-type dispatch and the result-normalization pipeline: the narrow
//! `Extractor` trait, the registry that maps a [`TargetType`] to its
//! extractor, the per-target-type field schemas, and the normalizer that
//! cleans raw extracted strings into validated structured output.

pub mod base;
pub mod extractors;
pub mod normalizer;
pub mod registry;
pub mod schemas;

pub use base::{ExtractionError, Extractor};
pub use registry::ExtractorRegistry;
