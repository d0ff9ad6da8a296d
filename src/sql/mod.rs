//! SQL text generation. Nothing outside this module renders SQL.

pub mod ident;
pub mod statement;

pub use ident::*;
pub use statement::*;
