pub mod filter;
pub mod parser;
pub mod selector;
pub mod sort;
pub mod types;
