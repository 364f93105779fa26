pub mod fair_value;
pub mod fees;
