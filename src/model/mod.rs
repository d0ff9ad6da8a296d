pub mod common;
pub mod page;
pub mod relation;
pub mod value;

pub use common::*;
pub use page::*;
pub use relation::*;
pub use value::*;
