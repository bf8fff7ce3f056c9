pub mod discovery;
pub mod views;
