pub mod atr;
pub mod sma;
