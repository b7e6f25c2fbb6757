/// Story modules — presentation adapters driven by the director.
///
/// Every module implements [`StoryModule`]. The scheduling capability is
/// shared through [`ModuleCore`], which owns the module's [`ChannelSet`]
/// and its table of bound commands.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Duration;

use crate::core::binding::{duration_from_seconds, CommandHandler};
use crate::core::scheduler::{ChannelSet, SchedulerError};
use crate::schema::script::{ScriptEngine, ScriptValue};

/// A script-facing command name and the channel its calls are queued on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub channel: usize,
}

impl CommandSpec {
    pub fn new(name: &str, channel: usize) -> Self {
        Self {
            name: name.to_string(),
            channel,
        }
    }
}

/// The lifecycle contract between the director and a module.
pub trait StoryModule {
    fn name(&self) -> &str;

    /// Called once when the director is built.
    fn init_module(&mut self) {}

    /// Reset scheduling state and bind this module's commands.
    fn story_start(&mut self, story: &mut dyn ScriptEngine, knot: &str);

    /// Receive a line of text and its tags. Only called when
    /// `should_update` is true.
    fn story_update(&mut self, _text: &str, _tags: &[String]) {}

    /// Unbind every command and drop pending work.
    fn story_end(&mut self, story: &mut dyn ScriptEngine);

    /// Advance the module's scheduler by one fixed tick.
    fn tick(&mut self, dt: Duration);

    fn is_running(&self) -> bool;

    /// Purely command-driven modules opt out of text delivery.
    fn should_update(&self) -> bool {
        true
    }

    fn channels(&self) -> &ChannelSet;
}

#[derive(Debug, Clone, Copy)]
struct BoundCommand {
    channel: usize,
}

/// Shared scheduling state of a module: running flag, channel set, and the
/// commands currently registered with the script engine.
#[derive(Debug)]
pub struct ModuleCore {
    name: String,
    enabled: bool,
    is_running: bool,
    channels: ChannelSet,
    bound: FxHashMap<String, BoundCommand>,
}

impl ModuleCore {
    pub fn new(name: &str, channel_count: usize) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            is_running: false,
            channels: ChannelSet::new(channel_count),
            bound: FxHashMap::default(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn init(&mut self) {
        self.is_running = false;
    }

    /// Begin a run. Returns false, leaving the module stopped, when the
    /// module is disabled. Commands left over from a previous run are
    /// unbound first.
    pub fn start(&mut self, story: &mut dyn ScriptEngine, knot: &str) -> bool {
        self.unbind_all(story);
        self.channels.reset();

        if !self.enabled {
            log::debug!("[{}] disabled, not starting knot '{}'", self.name, knot);
            self.is_running = false;
            return false;
        }

        self.is_running = true;
        log::debug!("[{}] story start ({})", self.name, knot);
        true
    }

    pub fn end(&mut self, story: &mut dyn ScriptEngine) {
        self.unbind_all(story);
        self.channels.reset();
        self.is_running = false;
        log::debug!("[{}] story end", self.name);
    }

    pub fn tick(&mut self, dt: Duration) {
        self.channels.tick(dt);
    }

    /// Register `name` with the script engine so that calling it queues
    /// `handler` on `channel` instead of running it.
    pub fn bind<Args, H>(
        &mut self,
        story: &mut dyn ScriptEngine,
        name: &str,
        handler: H,
        channel: usize,
    ) -> Result<(), SchedulerError>
    where
        H: CommandHandler<Args>,
    {
        let count = self.channels.channel_count();
        if channel >= count {
            return Err(SchedulerError::ChannelOutOfRange { channel, count });
        }

        if self.bound.contains_key(name) {
            story.unbind_external_function(name);
        }

        let handler = Rc::new(handler);
        let channels = self.channels.clone();
        let command = name.to_string();
        story.bind_external_function(
            name,
            Box::new(move |args: &[ScriptValue]| {
                let action = H::capture(&handler, &command, args);
                if let Err(err) = channels.enqueue(channel, action) {
                    log::error!("command '{}' dropped: {}", command, err);
                }
            }),
        );
        self.bound.insert(name.to_string(), BoundCommand { channel });
        Ok(())
    }

    /// Bind `spec.name` to `handler` on `spec.channel`, logging failures.
    pub fn bind_spec<Args, H>(&mut self, story: &mut dyn ScriptEngine, spec: &CommandSpec, handler: H)
    where
        H: CommandHandler<Args>,
    {
        if let Err(err) = self.bind(story, &spec.name, handler, spec.channel) {
            log::error!("[{}] cannot bind '{}': {}", self.name, spec.name, err);
        }
    }

    /// Bind a one-argument delay command: `name(seconds)` pauses `channel`
    /// once the commands queued before it have run.
    pub fn bind_delay(
        &mut self,
        story: &mut dyn ScriptEngine,
        name: &str,
        channel: usize,
    ) -> Result<(), SchedulerError> {
        let channels = self.channels.downgrade();
        self.bind(
            story,
            name,
            move |seconds: f32| {
                let Some(channels) = channels.upgrade() else {
                    return;
                };
                if let Err(err) = channels.request_delay(channel, duration_from_seconds(seconds)) {
                    log::error!("delay dropped: {}", err);
                }
            },
            channel,
        )
    }

    /// Remove a binding. Unknown names are ignored.
    pub fn unbind(&mut self, story: &mut dyn ScriptEngine, name: &str) {
        if self.bound.remove(name).is_some() {
            story.unbind_external_function(name);
        }
    }

    pub fn unbind_all(&mut self, story: &mut dyn ScriptEngine) {
        for (name, _) in self.bound.drain() {
            story.unbind_external_function(&name);
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bound.contains_key(name)
    }

    /// Channel a bound command queues on.
    pub fn bound_channel(&self, name: &str) -> Option<usize> {
        self.bound.get(name).map(|b| b.channel)
    }

    pub fn bound_commands(&self) -> impl Iterator<Item = &str> {
        self.bound.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::line_script::LineScript;
    use std::cell::RefCell;

    const SCRIPT: &str = r#"(
        knots: {
            "intro.begin": [
                (text: "One.", calls: [(name: "mark", args: [String("a")])]),
                (text: "Two.", calls: [
                    (name: "pause", args: [Float(1.0)]),
                    (name: "mark", args: [String("b")]),
                ]),
            ],
        },
    )"#;

    fn story() -> LineScript {
        let mut story = LineScript::parse_ron(SCRIPT).unwrap();
        story.choose_path("intro.begin").unwrap();
        story
    }

    #[test]
    fn bound_command_is_deferred_until_tick() {
        let mut story = story();
        let mut core = ModuleCore::new("probe", 1);
        assert!(core.start(&mut story, "intro"));

        let marks: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&marks);
        core.bind(&mut story, "mark", move |m: String| sink.borrow_mut().push(m), 0)
            .unwrap();

        assert_eq!(story.continue_story(), "One.");
        assert!(marks.borrow().is_empty());
        assert_eq!(core.channels().pending(0), 1);

        core.tick(Duration::ZERO);
        assert_eq!(*marks.borrow(), vec!["a"]);
    }

    #[test]
    fn delay_command_pauses_its_channel() {
        let mut story = story();
        let mut core = ModuleCore::new("probe", 1);
        core.start(&mut story, "intro");

        let marks: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&marks);
        core.bind(&mut story, "mark", move |m: String| sink.borrow_mut().push(m), 0)
            .unwrap();
        core.bind_delay(&mut story, "pause", 0).unwrap();

        story.continue_story();
        story.continue_story();
        core.tick(Duration::from_millis(500));
        assert_eq!(*marks.borrow(), vec!["a"]);
        assert_eq!(core.channels().pause_remaining(0), Duration::from_secs(1));

        core.tick(Duration::from_millis(500));
        assert_eq!(*marks.borrow(), vec!["a"]);
        core.tick(Duration::from_millis(500));
        assert_eq!(*marks.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn core_dropped_with_a_queued_delay_frees_its_channels() {
        let mut story = story();
        let mut core = ModuleCore::new("probe", 1);
        core.start(&mut story, "intro");
        core.bind_delay(&mut story, "pause", 0).unwrap();
        story.invoke("pause", &[ScriptValue::Float(1.0)]);
        assert_eq!(core.channels().pending(0), 1);

        let weak = core.channels().downgrade();
        core.unbind_all(&mut story);
        drop(core);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn bind_rejects_unknown_channel() {
        let mut story = story();
        let mut core = ModuleCore::new("probe", 2);
        let result = core.bind(&mut story, "mark", |_: String| {}, 2);
        assert_eq!(
            result,
            Err(SchedulerError::ChannelOutOfRange { channel: 2, count: 2 })
        );
        assert!(!story.is_bound("mark"));
        assert!(!core.is_bound("mark"));
    }

    #[test]
    fn unbind_is_symmetric_and_tolerant() {
        let mut story = story();
        let mut core = ModuleCore::new("probe", 2);
        core.start(&mut story, "intro");
        core.bind(&mut story, "mark", |_: String| {}, 1).unwrap();
        assert!(story.is_bound("mark"));
        assert_eq!(core.bound_channel("mark"), Some(1));

        core.unbind(&mut story, "mark");
        assert!(!story.is_bound("mark"));
        // Unbinding twice, or something never bound, is a no-op
        core.unbind(&mut story, "mark");
        core.unbind(&mut story, "never_bound");
    }

    #[test]
    fn end_then_start_leaves_no_residue() {
        let mut story = story();
        let mut core = ModuleCore::new("probe", 1);
        core.start(&mut story, "intro");
        core.bind(&mut story, "mark", |_: String| {}, 0).unwrap();
        core.bind_delay(&mut story, "pause", 0).unwrap();
        story.continue_story();
        core.channels().request_delay(0, Duration::from_secs(3)).unwrap();

        core.end(&mut story);
        assert!(!core.is_running());
        assert!(!story.is_bound("mark"));
        assert!(!story.is_bound("pause"));

        assert!(core.start(&mut story, "intro"));
        assert!(core.channels().is_idle());
        assert_eq!(core.channels().pause_remaining(0), Duration::ZERO);
        assert_eq!(core.bound_commands().count(), 0);
    }

    #[test]
    fn disabled_module_does_not_run() {
        let mut story = story();
        let mut core = ModuleCore::new("probe", 1).with_enabled(false);
        assert!(!core.start(&mut story, "intro"));
        assert!(!core.is_running());
    }

    #[test]
    fn calls_with_bad_arguments_still_queue() {
        let mut story = story();
        let mut core = ModuleCore::new("probe", 1);
        core.start(&mut story, "intro");
        core.bind_delay(&mut story, "pause", 0).unwrap();

        story.invoke("pause", &[ScriptValue::String("soon".into())]);
        core.tick(Duration::ZERO);
        // Malformed duration became zero: a pure yield
        assert!(core.channels().is_paused(0));
        assert_eq!(core.channels().pause_remaining(0), Duration::ZERO);
    }
}
