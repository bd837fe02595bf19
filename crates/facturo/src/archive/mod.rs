pub mod extract;
pub mod pack;

pub use extract::{extract, locate};
pub use pack::pack;
