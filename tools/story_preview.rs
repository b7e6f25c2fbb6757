/// Story preview — runs a line script through the director with console
/// audio and screen back-ends.
///
/// Usage: story_preview --script <path> --knot <id> [--config <path>]
///        [--audio <path>] [--tick-ms <n>] [--skip]
///
/// Commands:
///   next            — advance one line, then tick until the channels settle
///   tick <ms>       — run fixed ticks covering <ms> milliseconds
///   skip / stop     — toggle skip mode
///   save / load     — snapshot or restore the story state in memory
///   start <knot>    — start another knot
///   help            — list commands
///   quit            — exit
use std::cell::{Cell, RefCell};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use story_director::core::config::DirectorConfig;
use story_director::core::director::{StoryDirector, StoryProgress};
use story_director::core::line_script::LineScript;
use story_director::core::module::{ModuleCore, StoryModule};
use story_director::core::scheduler::ChannelSet;
use story_director::modules::audio::{AudioModule, AudioModuleConfig};
use story_director::modules::screen_effect::{ScreenEffectModule, ScreenEffectModuleConfig};
use story_director::schema::audio::{AudioCollection, AudioDefinition, AudioPlayer};
use story_director::schema::persistence::MemoryStateStore;
use story_director::schema::screen::{FadeCallback, ScreenFader};
use story_director::schema::script::ScriptEngine;

/// Longest stretch `next` keeps ticking while waiting for channels.
const SETTLE_LIMIT: Duration = Duration::from_secs(30);

struct ConsoleAudio;

impl AudioPlayer for ConsoleAudio {
    fn play_one_shot(&self, clip: &AudioDefinition) {
        println!("  [sfx] {} ({}, volume {:.2})", clip.id, clip.clip, clip.volume);
    }

    fn fade_in_and_play(&self, clip: &AudioDefinition) {
        let looping = if clip.looping { ", looping" } else { "" };
        println!("  [music] fade in {} ({}{})", clip.id, clip.clip, looping);
    }

    fn fade_out_and_stop(&self, clip: &AudioDefinition) {
        println!("  [music] fade out {}", clip.id);
    }
}

struct PendingFade {
    remaining: Duration,
    on_complete: FadeCallback,
}

/// Fader that completes its fades after their duration of preview ticks.
#[derive(Default)]
struct ConsoleFader {
    covered: Cell<bool>,
    pending: RefCell<Vec<PendingFade>>,
}

impl ConsoleFader {
    fn advance(&self, dt: Duration) {
        let finished: Vec<FadeCallback> = {
            let mut pending = self.pending.borrow_mut();
            for fade in pending.iter_mut() {
                fade.remaining = fade.remaining.saturating_sub(dt);
            }
            let (done, waiting): (Vec<PendingFade>, Vec<PendingFade>) =
                pending.drain(..).partition(|fade| fade.remaining.is_zero());
            *pending = waiting;
            done.into_iter().map(|fade| fade.on_complete).collect()
        };
        for on_complete in finished {
            println!("  [screen] fade complete");
            on_complete();
        }
    }

    fn is_settled(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

impl ScreenFader for ConsoleFader {
    fn is_faded_in(&self) -> bool {
        self.covered.get()
    }

    fn fill(&self) {
        self.covered.set(true);
        println!("  [screen] fill");
    }

    fn clear(&self) {
        self.covered.set(false);
        println!("  [screen] clear");
    }

    fn fade_in(&self, duration: Duration, on_complete: FadeCallback) {
        self.covered.set(true);
        println!("  [screen] fade in over {:.2}s", duration.as_secs_f32());
        self.pending.borrow_mut().push(PendingFade {
            remaining: duration,
            on_complete,
        });
    }

    fn fade_out(&self, duration: Duration, on_complete: FadeCallback) {
        self.covered.set(false);
        println!("  [screen] fade out over {:.2}s", duration.as_secs_f32());
        self.pending.borrow_mut().push(PendingFade {
            remaining: duration,
            on_complete,
        });
    }
}

struct Preview {
    director: StoryDirector<LineScript>,
    fader: Rc<ConsoleFader>,
    tick: Duration,
}

impl Preview {
    fn step(&mut self) {
        self.director.tick(self.tick);
        self.fader.advance(self.tick);
    }

    fn run_for(&mut self, total: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.step();
            elapsed += self.tick;
        }
    }

    fn settle(&mut self) {
        let mut elapsed = Duration::ZERO;
        loop {
            self.step();
            elapsed += self.tick;
            let idle = self
                .director
                .modules()
                .iter()
                .all(|module| module.channels().is_idle());
            if (idle && self.fader.is_settled()) || elapsed >= SETTLE_LIMIT {
                break;
            }
        }
    }
}

/// Prints every line the director delivers.
struct ConsoleText {
    core: ModuleCore,
}

impl StoryModule for ConsoleText {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn story_start(&mut self, story: &mut dyn ScriptEngine, knot: &str) {
        if self.core.start(story, knot) {
            println!("--- {} ---", knot);
        }
    }

    fn story_update(&mut self, text: &str, tags: &[String]) {
        if tags.is_empty() {
            println!("{}", text);
        } else {
            println!("{}  #{}", text, tags.join(" #"));
        }
    }

    fn story_end(&mut self, story: &mut dyn ScriptEngine) {
        self.core.end(story);
        println!("--- end of story ---");
    }

    fn tick(&mut self, dt: Duration) {
        self.core.tick(dt);
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn channels(&self) -> &ChannelSet {
        self.core.channels()
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut script_path = None;
    let mut knot = None;
    let mut config_path = None;
    let mut audio_path = None;
    let mut tick_ms: u64 = 16;
    let mut skip = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--script" if i + 1 < args.len() => {
                i += 1;
                script_path = Some(args[i].clone());
            }
            "--knot" if i + 1 < args.len() => {
                i += 1;
                knot = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--audio" if i + 1 < args.len() => {
                i += 1;
                audio_path = Some(args[i].clone());
            }
            "--tick-ms" if i + 1 < args.len() => {
                i += 1;
                tick_ms = args[i].parse().unwrap_or(16).max(1);
            }
            "--skip" => skip = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let (Some(script_path), Some(knot)) = (script_path, knot) else {
        eprintln!("--script and --knot are required");
        print_usage();
        std::process::exit(1);
    };

    let script = match LineScript::load_from_ron(Path::new(&script_path)) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("Failed to load script {}: {}", script_path, e);
            std::process::exit(1);
        }
    };

    let config = match config_path {
        Some(ref path) => match DirectorConfig::load_from_ron(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => DirectorConfig::default(),
    };

    // Without a collection every audio command would name an unknown clip,
    // so the audio module only runs when one is given.
    let collection = match audio_path {
        Some(ref path) => match AudioCollection::load_from_ron(Path::new(path)) {
            Ok(collection) => {
                println!("Loaded {} audio clips", collection.len());
                Some(collection)
            }
            Err(e) => {
                eprintln!("Failed to load audio collection {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            println!("No --audio given; audio commands stay unbound");
            None
        }
    };

    let fader = Rc::new(ConsoleFader::default());
    let mut builder = StoryDirector::builder(script)
        .config(config)
        .module(Box::new(ConsoleText {
            core: ModuleCore::new("console_text", 1),
        }))
        .module(Box::new(ScreenEffectModule::new(
            ScreenEffectModuleConfig::default(),
            fader.clone(),
        )));
    if let Some(collection) = collection {
        builder = builder.module(Box::new(AudioModule::new(
            AudioModuleConfig::default(),
            Rc::new(collection),
            Rc::new(ConsoleAudio),
        )));
    }
    let director = builder.build();
    let director = match director {
        Ok(director) => director,
        Err(e) => {
            eprintln!("Failed to build director: {}", e);
            std::process::exit(1);
        }
    };

    let mut preview = Preview {
        director,
        fader,
        tick: Duration::from_millis(tick_ms),
    };

    if let Err(e) = preview.director.start_story(&knot) {
        eprintln!("Failed to start '{}': {}", knot, e);
        std::process::exit(1);
    }

    if skip {
        run_skipping(&mut preview);
        return;
    }

    println!("Type 'help' for commands.\n");
    run_interactive(&mut preview);
}

fn run_skipping(preview: &mut Preview) {
    preview.director.skip();
    while preview.director.knot_in_progress().is_some() {
        preview.step();
    }
    preview.settle();
}

fn run_interactive(preview: &mut Preview) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut store = MemoryStateStore::new();

    loop {
        print!("story> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts.first().map(|c| c.to_lowercase()).unwrap_or_else(|| "next".to_string());

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "next" | "n" => {
                if preview.director.advance() == StoryProgress::Idle {
                    println!("(no story in progress)");
                }
                preview.settle();
            }
            "tick" => {
                let ms = parts.get(1).and_then(|p| p.parse().ok()).unwrap_or(100);
                preview.run_for(Duration::from_millis(ms));
            }
            "skip" => preview.director.skip(),
            "stop" => preview.director.stop_skip(),
            "save" => match preview.director.save(&mut store) {
                Ok(()) => println!("State saved."),
                Err(e) => println!("ERROR: {}", e),
            },
            "load" => match preview.director.load(&store) {
                Ok(true) => println!("State restored."),
                Ok(false) => println!("Nothing saved yet."),
                Err(e) => println!("ERROR: {}", e),
            },
            "start" => match parts.get(1) {
                Some(knot) => {
                    if let Err(e) = preview.director.start_story(knot) {
                        println!("ERROR: {}", e);
                    }
                }
                None => println!("Usage: start <knot>"),
            },
            _ => println!("Unknown command: {}. Type 'help' for commands.", cmd),
        }
    }
}

fn print_usage() {
    println!("Usage: story_preview --script <path> --knot <id> [--config <path>]");
    println!("                     [--audio <path>] [--tick-ms <n>] [--skip]");
}

fn print_help() {
    println!("Commands:");
    println!("  next (or empty line)  advance one line and let the channels settle");
    println!("  tick <ms>             run fixed ticks covering <ms> milliseconds");
    println!("  skip / stop           toggle skip mode");
    println!("  save / load           snapshot or restore the story state");
    println!("  start <knot>          start another knot");
    println!("  quit                  exit");
}
