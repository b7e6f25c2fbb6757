pub mod binding;
pub mod channel;
pub mod config;
pub mod director;
pub mod line_script;
pub mod module;
pub mod scheduler;
pub mod stage;
