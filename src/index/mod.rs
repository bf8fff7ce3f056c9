pub mod descriptor;
pub mod lifecycle;
