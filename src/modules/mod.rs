pub mod audio;
pub mod screen_effect;
