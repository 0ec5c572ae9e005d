pub mod telegram;
pub mod writer;
