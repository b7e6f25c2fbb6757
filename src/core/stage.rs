/// Story stage — the game-mode state wrapping one story run in screen
/// fades.
///
/// The host drives it with `enter` once and `poll` every frame, after
/// ticking the director. A covered screen is revealed before the story
/// starts; when the run is over the screen is covered again and `poll`
/// reports the configured next state.
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::core::binding::duration_from_seconds;
use crate::core::director::{DirectorError, StoryDirector};
use crate::schema::screen::ScreenFader;
use crate::schema::script::ScriptEngine;

/// Per-stage fade settings. Used instead of the director defaults when
/// `override_fade` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFade {
    pub override_fade: bool,
    pub fade_on_start: bool,
    pub fade_on_end: bool,
    pub fade_duration_seconds: f32,
}

impl Default for StageFade {
    fn default() -> Self {
        Self {
            override_fade: false,
            fade_on_start: true,
            fade_on_end: true,
            fade_duration_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    Idle,
    Revealing,
    Telling,
    Covering,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageTransition {
    /// The story run began.
    Started,
    /// The run is over and the screen is covered; switch to `next_state`.
    Finished { next_state: Option<String> },
}

pub struct StoryStage {
    knot: String,
    fade: StageFade,
    next_state: Option<String>,
    phase: StagePhase,
    fade_done: Rc<Cell<bool>>,
}

impl StoryStage {
    pub fn new(knot: &str) -> Self {
        Self {
            knot: knot.to_string(),
            fade: StageFade::default(),
            next_state: None,
            phase: StagePhase::Idle,
            fade_done: Rc::new(Cell::new(false)),
        }
    }

    pub fn with_fade(mut self, fade: StageFade) -> Self {
        self.fade = fade;
        self
    }

    pub fn with_next_state(mut self, next_state: &str) -> Self {
        self.next_state = Some(next_state.to_string());
        self
    }

    pub fn knot(&self) -> &str {
        &self.knot
    }

    pub fn phase(&self) -> StagePhase {
        self.phase
    }

    /// Enter the stage: when enabled and the screen is covered, fade it out
    /// and start the story once it is clear. Otherwise start right away.
    pub fn enter<E: ScriptEngine>(
        &mut self,
        director: &mut StoryDirector<E>,
        fader: &dyn ScreenFader,
    ) -> Result<Option<StageTransition>, DirectorError> {
        if self.phase != StagePhase::Idle && self.phase != StagePhase::Finished {
            log::warn!("stage '{}' entered twice", self.knot);
            return Ok(None);
        }

        let (fade_on_start, _, duration) = self.fade_settings(director);
        if fade_on_start && fader.is_faded_in() {
            log::debug!("stage '{}' revealing over {:?}", self.knot, duration);
            self.phase = StagePhase::Revealing;
            self.begin_fade(|done| fader.fade_out(duration, done));
            return Ok(None);
        }

        self.start(director).map(Some)
    }

    /// Advance the stage. Returns a transition when one happened this call.
    pub fn poll<E: ScriptEngine>(
        &mut self,
        director: &mut StoryDirector<E>,
        fader: &dyn ScreenFader,
    ) -> Result<Option<StageTransition>, DirectorError> {
        match self.phase {
            StagePhase::Idle | StagePhase::Finished => Ok(None),
            StagePhase::Revealing => {
                if !self.fade_done.get() {
                    return Ok(None);
                }
                self.start(director).map(Some)
            }
            StagePhase::Telling => {
                if director.knot_in_progress().is_some() {
                    return Ok(None);
                }
                let (_, fade_on_end, duration) = self.fade_settings(director);
                if fade_on_end && !fader.is_faded_in() {
                    log::debug!("stage '{}' covering over {:?}", self.knot, duration);
                    self.phase = StagePhase::Covering;
                    self.begin_fade(|done| fader.fade_in(duration, done));
                    return Ok(None);
                }
                Ok(Some(self.finish()))
            }
            StagePhase::Covering => {
                if !self.fade_done.get() {
                    return Ok(None);
                }
                Ok(Some(self.finish()))
            }
        }
    }

    fn start<E: ScriptEngine>(
        &mut self,
        director: &mut StoryDirector<E>,
    ) -> Result<StageTransition, DirectorError> {
        director.start_story(&self.knot)?;
        self.phase = StagePhase::Telling;
        Ok(StageTransition::Started)
    }

    fn finish(&mut self) -> StageTransition {
        self.phase = StagePhase::Finished;
        log::info!("stage '{}' finished", self.knot);
        StageTransition::Finished {
            next_state: self.next_state.clone(),
        }
    }

    fn begin_fade(&mut self, run: impl FnOnce(Box<dyn FnOnce()>)) {
        // A fresh flag per fade: a late callback from an older fade must
        // not complete this one.
        let done = Rc::new(Cell::new(false));
        self.fade_done = Rc::clone(&done);
        run(Box::new(move || done.set(true)));
    }

    fn fade_settings<E: ScriptEngine>(&self, director: &StoryDirector<E>) -> (bool, bool, Duration) {
        if self.fade.override_fade {
            return (
                self.fade.fade_on_start,
                self.fade.fade_on_end,
                duration_from_seconds(self.fade.fade_duration_seconds),
            );
        }
        let config = director.config();
        (
            config.auto_story_fade,
            config.auto_story_fade,
            config.story_fade_duration(),
        )
    }
}
