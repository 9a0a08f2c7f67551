pub mod ids;
pub mod position;

pub use ids::*;
pub use position::*;
