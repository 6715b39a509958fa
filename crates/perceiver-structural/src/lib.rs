//! Structural perception for wayfinder: state fingerprints, the element
//! extractor port, and the filter that decides which elements are worth
//! probing.

pub mod errors;
pub mod filter;
pub mod fingerprint;
pub mod policy;
pub mod ports;

pub use errors::PerceiverError;
pub use filter::ElementFilter;
pub use fingerprint::{FingerprintMode, Fingerprinter};
pub use policy::{FilterPolicy, FingerprintPolicy};
pub use ports::ElementExtractor;
