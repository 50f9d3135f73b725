pub mod chain;
pub mod progress;
pub mod relay;
pub mod swap;
