pub mod artifact;
pub mod metric;

pub use artifact::*;
pub use metric::*;
