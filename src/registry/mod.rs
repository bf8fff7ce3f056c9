pub mod binding;
pub mod model_registry;
