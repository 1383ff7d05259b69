//! # Analysis orchestrator
//!
//! Classification of a product request, either immediately from its URL extension or declared
//! content type ([`fast_path`]), or through the remote inspect operation whose reports are
//! memoized by request fingerprint ([`cache`]).
//!
//! ## Modules
//!
//! - [`report`]: the file analysis report returned by the inspect operation.
//! - [`cache`]: fingerprints and the write-once analysis cache.
//! - [`fast_path`]: classification without any network call.
//! - [`progress`]: progress subscriptions of containers waiting on a request.
//! - [`orchestrator`]: the access gate, deep analysis and result activation.

pub mod cache;
pub mod fast_path;
pub mod orchestrator;
pub mod progress;
pub mod report;
