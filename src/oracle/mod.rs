pub mod composite;
pub mod technical;
pub mod volatility;
