/// Screen effect story module: timed fades to and from a solid colour.
///
/// Script commands (default names):
///   screen_wait(duration)
///   screen_fade_enter(duration)
///   screen_fade_exit(duration)
///
/// A timed fade holds every channel of this module until the fader reports
/// completion, so commands queued after a fade run once the screen settles.
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crate::core::binding::duration_from_seconds;
use crate::core::config::ConfigError;
use crate::core::module::{CommandSpec, ModuleCore, StoryModule};
use crate::core::scheduler::ChannelSet;
use crate::schema::screen::ScreenFader;
use crate::schema::script::ScriptEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenEffectModuleConfig {
    pub enabled: bool,
    pub channels: usize,
    pub delay: CommandSpec,
    pub fade_enter: CommandSpec,
    pub fade_exit: CommandSpec,
}

impl Default for ScreenEffectModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: 1,
            delay: CommandSpec::new("screen_wait", 0),
            fade_enter: CommandSpec::new("screen_fade_enter", 0),
            fade_exit: CommandSpec::new("screen_fade_exit", 0),
        }
    }
}

impl ScreenEffectModuleConfig {
    pub fn load_from_ron(path: &Path) -> Result<ScreenEffectModuleConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&contents)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fade {
    Enter,
    Exit,
}

pub struct ScreenEffectModule {
    core: ModuleCore,
    config: ScreenEffectModuleConfig,
    fader: Rc<dyn ScreenFader>,
    /// Cleared when the run ends, so fades still in flight cannot release
    /// the channels of a later run.
    run_alive: Rc<Cell<bool>>,
}

impl ScreenEffectModule {
    pub fn new(config: ScreenEffectModuleConfig, fader: Rc<dyn ScreenFader>) -> Self {
        let core = ModuleCore::new("screen_effect", config.channels).with_enabled(config.enabled);
        Self {
            core,
            config,
            fader,
            run_alive: Rc::new(Cell::new(false)),
        }
    }

    pub fn config(&self) -> &ScreenEffectModuleConfig {
        &self.config
    }

    pub fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn bind_fade(&mut self, story: &mut dyn ScriptEngine, spec: &CommandSpec, fade: Fade) {
        let fader = Rc::clone(&self.fader);
        let channels = self.core.channels().downgrade();
        let run_alive = Rc::clone(&self.run_alive);
        self.core.bind_spec(story, spec, move |seconds: f32| {
            let Some(channels) = channels.upgrade() else {
                return;
            };
            run_fade(
                fader.as_ref(),
                &channels,
                &run_alive,
                duration_from_seconds(seconds),
                fade,
            )
        });
    }
}

/// Zero duration switches the screen instantly. Otherwise every channel is
/// held for `duration` and released early once the fader completes, as
/// long as the run that started the fade is still going.
fn run_fade(
    fader: &dyn ScreenFader,
    channels: &ChannelSet,
    run_alive: &Rc<Cell<bool>>,
    duration: Duration,
    fade: Fade,
) {
    log::debug!("screen fade {:?} over {:?}", fade, duration);
    if duration.is_zero() {
        match fade {
            Fade::Enter => fader.fill(),
            Fade::Exit => fader.clear(),
        }
        return;
    }

    channels.delay_all_channels(duration);
    let release = channels.clone();
    let run_alive = Rc::clone(run_alive);
    let on_complete = Box::new(move || {
        if run_alive.get() {
            release.break_all_channels();
        } else {
            log::debug!("screen fade {:?} completed after its run ended", fade);
        }
    });
    match fade {
        Fade::Enter => fader.fade_in(duration, on_complete),
        Fade::Exit => fader.fade_out(duration, on_complete),
    }
}

impl StoryModule for ScreenEffectModule {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn init_module(&mut self) {
        self.core.init();
    }

    fn story_start(&mut self, story: &mut dyn ScriptEngine, knot: &str) {
        if !self.core.start(story, knot) {
            return;
        }
        self.run_alive = Rc::new(Cell::new(true));

        let delay = self.config.delay.clone();
        if let Err(err) = self.core.bind_delay(story, &delay.name, delay.channel) {
            log::error!("[screen_effect] cannot bind '{}': {}", delay.name, err);
        }

        let enter = self.config.fade_enter.clone();
        let exit = self.config.fade_exit.clone();
        self.bind_fade(story, &enter, Fade::Enter);
        self.bind_fade(story, &exit, Fade::Exit);
    }

    fn story_end(&mut self, story: &mut dyn ScriptEngine) {
        self.run_alive.set(false);
        self.core.end(story);
    }

    fn tick(&mut self, dt: Duration) {
        self.core.tick(dt);
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn should_update(&self) -> bool {
        false
    }

    fn channels(&self) -> &ChannelSet {
        self.core.channels()
    }
}
