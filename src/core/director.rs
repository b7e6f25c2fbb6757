/// The story director: script advancement against module lifecycles.
///
/// Wires together the script engine, the ordered story modules, the
/// global wait command and skip mode.
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::core::binding::{duration_from_seconds, FromScriptValue};
use crate::core::config::{ConfigError, DirectorConfig};
use crate::core::module::StoryModule;
use crate::core::scheduler::ChannelSet;
use crate::schema::persistence::{StateStore, STORY_STATE_KEY};
use crate::schema::script::{ScriptEngine, ScriptError, ScriptErrorKind, ScriptValue};

#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("cannot start knot '{requested}': story '{in_progress}' is already in progress")]
    AlreadyRunning {
        requested: String,
        in_progress: String,
    },
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result of a single `advance` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryProgress {
    /// A line was produced and delivered to the modules.
    Line { text: String, tags: Vec<String> },
    /// The script ran out of content; the run is over.
    Ended,
    /// No run is in progress.
    Idle,
}

type StoryEndedListener = Box<dyn FnMut(&str)>;

/// The top-level story orchestrator. Built via `StoryDirector::builder()`.
pub struct StoryDirector<E: ScriptEngine> {
    engine: E,
    modules: Vec<Box<dyn StoryModule>>,
    config: DirectorConfig,
    knot_in_progress: Option<String>,
    is_story_telling: bool,
    skip_enabled: bool,
    skip_elapsed: Duration,
    ended_listeners: Vec<StoryEndedListener>,
}

/// Builder for constructing a `StoryDirector`.
pub struct StoryDirectorBuilder<E: ScriptEngine> {
    engine: E,
    modules: Vec<Box<dyn StoryModule>>,
    config: Option<DirectorConfig>,
    config_path: Option<String>,
}

impl<E: ScriptEngine> StoryDirector<E> {
    pub fn builder(engine: E) -> StoryDirectorBuilder<E> {
        StoryDirectorBuilder {
            engine,
            modules: Vec::new(),
            config: None,
            config_path: None,
        }
    }

    /// Begin telling `knot`.
    ///
    /// Fails without touching any state while another story is told.
    pub fn start_story(&mut self, knot: &str) -> Result<(), DirectorError> {
        if self.is_story_telling {
            let in_progress = self.knot_in_progress.clone().unwrap_or_default();
            log::warn!(
                "trying to start knot '{}' but story '{}' is already in progress",
                knot,
                in_progress
            );
            return Err(DirectorError::AlreadyRunning {
                requested: knot.to_string(),
                in_progress,
            });
        }

        let path = self.config.entry_path(knot);
        self.engine.choose_path(&path)?;

        for module in self.modules.iter_mut() {
            module.story_start(&mut self.engine, knot);
            self.is_story_telling |= module.is_running();
        }

        if !self.is_story_telling {
            log::error!("story '{}' started but no module is running", knot);
        }

        self.knot_in_progress = Some(knot.to_string());
        self.bind_global_wait();
        log::info!("story '{}' started", knot);

        if self.config.display_first_line_on_start {
            self.advance();
        }
        Ok(())
    }

    /// Produce the next line, or finish the run when the script is out of
    /// content.
    pub fn advance(&mut self) -> StoryProgress {
        if self.knot_in_progress.is_none() {
            log::debug!("advance ignored: no story in progress");
            return StoryProgress::Idle;
        }

        if !self.engine.can_continue() {
            self.finish_story();
            return StoryProgress::Ended;
        }

        let text = self.engine.continue_story().trim().to_string();
        let tags = self.engine.current_tags().to_vec();

        for module in self.modules.iter_mut().rev() {
            if !module.is_running() || !module.should_update() {
                continue;
            }
            module.story_update(&text, &tags);
        }

        StoryProgress::Line { text, tags }
    }

    /// Force-advance a line every skip interval until the story ends or
    /// `stop_skip` is called.
    pub fn skip(&mut self) {
        if self.knot_in_progress.is_none() {
            log::warn!("skip ignored: no story in progress");
            return;
        }
        self.skip_enabled = true;
        self.skip_elapsed = Duration::ZERO;
    }

    pub fn stop_skip(&mut self) {
        self.skip_enabled = false;
        self.skip_elapsed = Duration::ZERO;
    }

    /// One fixed-rate step: drain module schedulers, then run skip mode.
    pub fn tick(&mut self, dt: Duration) {
        for module in self.modules.iter_mut() {
            module.tick(dt);
        }

        if !self.skip_enabled {
            return;
        }

        let interval = self.config.skip_interval();
        self.skip_elapsed += dt;
        if interval.is_zero() {
            self.skip_elapsed = Duration::ZERO;
            self.advance();
            return;
        }
        while self.skip_enabled && self.skip_elapsed >= interval {
            self.skip_elapsed -= interval;
            self.advance();
        }
    }

    /// Write the engine state under the story state key.
    pub fn save(&self, store: &mut dyn StateStore) -> Result<(), DirectorError> {
        let json = self.engine.state_to_json()?;
        store.set(STORY_STATE_KEY, json);
        Ok(())
    }

    /// Restore the engine state. Returns false when nothing was stored.
    pub fn load(&mut self, store: &dyn StateStore) -> Result<bool, DirectorError> {
        match store.get(STORY_STATE_KEY) {
            Some(json) if !json.is_empty() => {
                self.engine.load_state_json(&json)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Register a callback fired once per finished run with the knot id.
    pub fn on_story_ended<F>(&mut self, listener: F)
    where
        F: FnMut(&str) + 'static,
    {
        self.ended_listeners.push(Box::new(listener));
    }

    pub fn is_story_telling(&self) -> bool {
        self.is_story_telling
    }

    pub fn is_skipping(&self) -> bool {
        self.skip_enabled
    }

    pub fn knot_in_progress(&self) -> Option<&str> {
        self.knot_in_progress.as_deref()
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn modules(&self) -> &[Box<dyn StoryModule>] {
        &self.modules
    }

    fn finish_story(&mut self) {
        let knot = self.knot_in_progress.take().unwrap_or_default();
        log::info!("end of story '{}'", knot);

        for module in self.modules.iter_mut().rev() {
            if !module.is_running() {
                continue;
            }
            module.story_end(&mut self.engine);
        }

        self.engine
            .unbind_external_function(&self.config.global_wait_command);

        self.skip_enabled = false;
        self.skip_elapsed = Duration::ZERO;
        self.is_story_telling = false;

        for listener in self.ended_listeners.iter_mut() {
            listener(&knot);
        }
    }

    fn bind_global_wait(&mut self) {
        let schedulers: Vec<ChannelSet> = self
            .modules
            .iter()
            .filter(|module| module.is_running())
            .map(|module| module.channels().clone())
            .collect();
        let command = self.config.global_wait_command.clone();

        self.engine.bind_external_function(
            &self.config.global_wait_command,
            Box::new(move |args: &[ScriptValue]| {
                let seconds = f32::from_script_arg(&command, 0, args.first());
                let duration = duration_from_seconds(seconds);
                for scheduler in &schedulers {
                    scheduler.queue_delay_all_channels(duration);
                }
            }),
        );
    }
}

impl<E: ScriptEngine> StoryDirectorBuilder<E> {
    pub fn config(mut self, config: DirectorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the config from a RON file at build time.
    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Append a module. Declaration order is start order; update and end
    /// run in reverse.
    pub fn module(mut self, module: Box<dyn StoryModule>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn build(self) -> Result<StoryDirector<E>, DirectorError> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => DirectorConfig::load_from_ron(Path::new(&path))?,
            (None, None) => DirectorConfig::default(),
        };

        let mut engine = self.engine;
        engine.set_error_handler(Box::new(|message: &str, kind: ScriptErrorKind| match kind {
            ScriptErrorKind::Warning => log::warn!("{}", message),
            ScriptErrorKind::Error => log::error!("{}", message),
        }));

        let mut modules = self.modules;
        if modules.is_empty() {
            log::error!("story director built without any story module");
        }
        for module in modules.iter_mut() {
            module.init_module();
        }

        Ok(StoryDirector {
            engine,
            modules,
            config,
            knot_in_progress: None,
            is_story_telling: false,
            skip_enabled: false,
            skip_elapsed: Duration::ZERO,
            ended_listeners: Vec::new(),
        })
    }
}
