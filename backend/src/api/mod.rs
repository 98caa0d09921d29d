pub mod goals;
pub mod ideas;
pub mod progress;
pub mod settings;
pub mod stats;
pub mod tasks;
