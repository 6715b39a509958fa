//! Grid compilation: turns a navigation graph plus a (current, target) pair
//! into a token maze that any grid path solver can work on.

pub mod compile;
pub mod errors;
pub mod grid;
pub mod token;

pub use compile::{CompiledGrid, GridCompiler, GridConfig};
pub use errors::GridError;
pub use grid::{Cell, TokenGrid};
pub use token::Token;
