pub mod bracket;
pub mod geometry;
