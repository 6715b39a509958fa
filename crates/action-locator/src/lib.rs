//! Selector resolution with ranked fallback strategies
//!
//! A [`Selector`](wayfinder_core_types::Selector) carries up to four match
//! keys. The [`Locator`] tries them in a fixed order (id, text, description,
//! role), each strategy being a pure function over the element list, and
//! reports which strategy produced the match.

pub mod errors;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use errors::*;
pub use resolver::*;
pub use strategies::*;
pub use types::*;
