pub mod order;
pub mod rest;
