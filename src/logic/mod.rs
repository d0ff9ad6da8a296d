pub mod entity;
pub mod loader;
pub mod materialize;
pub mod mutate;
pub mod pivot;

pub use entity::*;
pub use loader::*;
pub use materialize::*;
pub use mutate::*;
pub use pivot::*;
