mod application;
mod runner;

pub use application::Application;
pub use runner::{serve, ShutdownOptions};
