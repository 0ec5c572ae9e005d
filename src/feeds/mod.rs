pub mod binance;
pub mod history;
