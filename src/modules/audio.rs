/// Audio story module.
///
/// Script commands (default names):
///   Audio_Delay(duration)
///   Audio_SoundEffectPlay(sound_id)
///   Audio_MusicPlay(music_id)
///   Audio_MusicStop(music_id)
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crate::core::config::ConfigError;
use crate::core::module::{CommandSpec, ModuleCore, StoryModule};
use crate::core::scheduler::ChannelSet;
use crate::schema::audio::{AudioCollection, AudioDefinition, AudioPlayer};
use crate::schema::script::ScriptEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioModuleConfig {
    pub enabled: bool,
    pub channels: usize,
    pub delay: CommandSpec,
    pub sound_effect_play: CommandSpec,
    pub music_play: CommandSpec,
    pub music_stop: CommandSpec,
}

impl Default for AudioModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: 1,
            delay: CommandSpec::new("Audio_Delay", 0),
            sound_effect_play: CommandSpec::new("Audio_SoundEffectPlay", 0),
            music_play: CommandSpec::new("Audio_MusicPlay", 0),
            music_stop: CommandSpec::new("Audio_MusicStop", 0),
        }
    }
}

impl AudioModuleConfig {
    pub fn load_from_ron(path: &Path) -> Result<AudioModuleConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&contents)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioCommand {
    PlayOneShot,
    FadeInAndPlay,
    FadeOutAndStop,
}

/// Plays clips from a configured collection when the script asks for them.
/// Purely command-driven: receives no text.
pub struct AudioModule {
    core: ModuleCore,
    config: AudioModuleConfig,
    collection: Rc<AudioCollection>,
    player: Rc<dyn AudioPlayer>,
}

impl AudioModule {
    pub fn new(
        config: AudioModuleConfig,
        collection: Rc<AudioCollection>,
        player: Rc<dyn AudioPlayer>,
    ) -> Self {
        let core = ModuleCore::new("audio", config.channels).with_enabled(config.enabled);
        Self {
            core,
            config,
            collection,
            player,
        }
    }

    pub fn config(&self) -> &AudioModuleConfig {
        &self.config
    }

    pub fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn bind_clip_command(&mut self, story: &mut dyn ScriptEngine, spec: &CommandSpec, command: AudioCommand) {
        let collection = Rc::clone(&self.collection);
        let player = Rc::clone(&self.player);
        self.core.bind_spec(story, spec, move |id: String| {
            run_clip_command(&collection, player.as_ref(), &id, command)
        });
    }
}

fn run_clip_command(collection: &AudioCollection, player: &dyn AudioPlayer, id: &str, command: AudioCommand) {
    let clip: &AudioDefinition = match collection.require(id) {
        Ok(clip) => clip,
        Err(err) => {
            log::error!("audio command {:?} failed: {}", command, err);
            debug_assert!(false, "unknown audio id '{}'", id);
            return;
        }
    };

    log::debug!("audio {:?}: {}", command, clip.id);
    match command {
        AudioCommand::PlayOneShot => player.play_one_shot(clip),
        AudioCommand::FadeInAndPlay => player.fade_in_and_play(clip),
        AudioCommand::FadeOutAndStop => player.fade_out_and_stop(clip),
    }
}

impl StoryModule for AudioModule {
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

        let delay = self.config.delay.clone();
        if let Err(err) = self.core.bind_delay(story, &delay.name, delay.channel) {
            log::error!("[audio] cannot bind '{}': {}", delay.name, err);
        }

        let sound = self.config.sound_effect_play.clone();
        let music_play = self.config.music_play.clone();
        let music_stop = self.config.music_stop.clone();
        self.bind_clip_command(story, &sound, AudioCommand::PlayOneShot);
        self.bind_clip_command(story, &music_play, AudioCommand::FadeInAndPlay);
        self.bind_clip_command(story, &music_stop, AudioCommand::FadeOutAndStop);
    }

    fn story_end(&mut self, story: &mut dyn ScriptEngine) {
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
