pub mod actor;
pub mod audio;
pub mod persistence;
pub mod screen;
pub mod script;
