//! Shared test doubles: recording back-ends and a probe module that logs
//! its lifecycle.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use story_director::core::line_script::LineScript;
use story_director::core::module::{ModuleCore, StoryModule};
use story_director::core::scheduler::ChannelSet;
use story_director::schema::audio::{AudioDefinition, AudioPlayer};
use story_director::schema::screen::{FadeCallback, ScreenFader};
use story_director::schema::script::ScriptEngine;

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> Log {
    Rc::default()
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

pub fn load_prologue() -> LineScript {
    LineScript::load_from_ron(std::path::Path::new("tests/fixtures/prologue.ron")).unwrap()
}

#[derive(Default)]
pub struct RecordingAudio {
    pub log: Log,
}

impl AudioPlayer for RecordingAudio {
    fn play_one_shot(&self, clip: &AudioDefinition) {
        self.log.borrow_mut().push(format!("sfx:{}", clip.id));
    }
    fn fade_in_and_play(&self, clip: &AudioDefinition) {
        self.log.borrow_mut().push(format!("music_play:{}", clip.id));
    }
    fn fade_out_and_stop(&self, clip: &AudioDefinition) {
        self.log.borrow_mut().push(format!("music_stop:{}", clip.id));
    }
}

/// Fader whose timed fades complete only when the test says so.
#[derive(Default)]
pub struct RecordingFader {
    pub log: Log,
    covered: Cell<bool>,
    pending: RefCell<Vec<FadeCallback>>,
}

impl RecordingFader {
    pub fn pending_fades(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn complete_fades(&self) {
        let pending: Vec<FadeCallback> = self.pending.borrow_mut().drain(..).collect();
        for callback in pending {
            callback();
        }
    }
}

impl ScreenFader for RecordingFader {
    fn is_faded_in(&self) -> bool {
        self.covered.get()
    }
    fn fill(&self) {
        self.covered.set(true);
        self.log.borrow_mut().push("fill".into());
    }
    fn clear(&self) {
        self.covered.set(false);
        self.log.borrow_mut().push("clear".into());
    }
    fn fade_in(&self, _duration: Duration, on_complete: FadeCallback) {
        self.covered.set(true);
        self.log.borrow_mut().push("fade_in".into());
        self.pending.borrow_mut().push(on_complete);
    }
    fn fade_out(&self, _duration: Duration, on_complete: FadeCallback) {
        self.covered.set(false);
        self.log.borrow_mut().push("fade_out".into());
        self.pending.borrow_mut().push(on_complete);
    }
}

/// Module that records `<name>:<event>` into a shared log and binds a
/// `<name>_mark(label)` command that records `<name>:mark:<label>` when
/// dispatched.
pub struct ProbeModule {
    core: ModuleCore,
    log: Log,
    wants_text: bool,
}

impl ProbeModule {
    pub fn new(name: &str, channels: usize, log: &Log) -> Self {
        Self {
            core: ModuleCore::new(name, channels),
            log: Rc::clone(log),
            wants_text: true,
        }
    }

    pub fn without_text(mut self) -> Self {
        self.wants_text = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.core.set_enabled(false);
        self
    }

    fn record(&self, event: &str) {
        self.log
            .borrow_mut()
            .push(format!("{}:{}", self.core.name(), event));
    }
}

impl StoryModule for ProbeModule {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn init_module(&mut self) {
        self.core.init();
        self.record("init");
    }

    fn story_start(&mut self, story: &mut dyn ScriptEngine, knot: &str) {
        if !self.core.start(story, knot) {
            return;
        }
        self.record(&format!("start:{}", knot));
        if self.core.channels().channel_count() == 0 {
            return;
        }

        let log = Rc::clone(&self.log);
        let prefix = self.core.name().to_string();
        let command = format!("{}_mark", prefix);
        self.core
            .bind(
                story,
                &command,
                move |label: String| log.borrow_mut().push(format!("{}:mark:{}", prefix, label)),
                0,
            )
            .unwrap();
    }

    fn story_update(&mut self, text: &str, tags: &[String]) {
        self.record(&format!("update:{}:{}", text, tags.join(",")));
    }

    fn story_end(&mut self, story: &mut dyn ScriptEngine) {
        self.core.end(story);
        self.record("end");
    }

    fn tick(&mut self, dt: Duration) {
        self.core.tick(dt);
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn should_update(&self) -> bool {
        self.wants_text
    }

    fn channels(&self) -> &ChannelSet {
        self.core.channels()
    }
}
