pub mod risk;
pub mod runner;
pub mod sim;
pub mod state;
