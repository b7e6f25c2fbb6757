use std::time::Duration;

/// Invoked by a fader once a timed fade has visually finished.
pub type FadeCallback = Box<dyn FnOnce()>;

/// Full-screen fade-to-colour back-end.
///
/// `fade_in` covers the screen with the fade colour, `fade_out` reveals
/// the scene again. `on_complete` may be called synchronously or on a
/// later frame, but exactly once per fade.
pub trait ScreenFader {
    /// True while the screen is covered by the fade colour.
    fn is_faded_in(&self) -> bool;
    fn fill(&self);
    fn clear(&self);
    fn fade_in(&self, duration: Duration, on_complete: FadeCallback);
    fn fade_out(&self, duration: Duration, on_complete: FadeCallback);
}
