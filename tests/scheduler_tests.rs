/// Scheduler integration tests — bound commands flowing through a module
/// core into its channels at a fixed frame rate.
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use story_director::core::channel::DeferredAction;
use story_director::core::line_script::LineScript;
use story_director::core::module::ModuleCore;
use story_director::core::scheduler::ChannelSet;
use story_director::schema::script::{ScriptEngine, ScriptValue};

const FRAME: Duration = Duration::from_millis(16);

type Log = Rc<RefCell<Vec<String>>>;

fn story() -> LineScript {
    let mut story = LineScript::parse_ron(r#"(knots: {"test.begin": []})"#).unwrap();
    story.choose_path("test.begin").unwrap();
    story
}

fn started_core(channels: usize, story: &mut LineScript) -> ModuleCore {
    let mut core = ModuleCore::new("probe", channels);
    assert!(core.start(story, "test"));
    core
}

#[test]
fn multi_argument_commands_convert_at_call_time() {
    let mut story = story();
    let mut core = started_core(1, &mut story);
    let log: Log = Rc::default();

    let sink = Rc::clone(&log);
    core.bind(
        &mut story,
        "show",
        move |actor: String, x: f32, layer: i32, flip: bool| {
            sink.borrow_mut()
                .push(format!("{} {} {} {}", actor, x, layer, flip))
        },
        0,
    )
    .unwrap();

    story.invoke(
        "show",
        &[
            ScriptValue::String("mara".into()),
            ScriptValue::Float(0.5),
            ScriptValue::Int(2),
            ScriptValue::Bool(true),
        ],
    );
    // Missing trailing arguments fall back to defaults
    story.invoke("show", &[ScriptValue::String("ivo".into())]);

    core.tick(FRAME);
    assert_eq!(*log.borrow(), vec!["mara 0.5 2 true", "ivo 0 0 false"]);
}

#[test]
fn delays_resolve_at_frame_granularity() {
    let mut story = story();
    let mut core = started_core(1, &mut story);
    let log: Log = Rc::default();

    let sink = Rc::clone(&log);
    core.bind(&mut story, "mark", move |m: String| sink.borrow_mut().push(m), 0)
        .unwrap();
    core.bind_delay(&mut story, "pause", 0).unwrap();

    story.invoke("pause", &[ScriptValue::Float(0.5)]);
    story.invoke("mark", &[ScriptValue::String("late".into())]);
    core.tick(FRAME);

    // 31 frames of 16ms is 496ms: still waiting
    for _ in 0..31 {
        core.tick(FRAME);
    }
    assert!(log.borrow().is_empty());

    core.tick(FRAME);
    assert_eq!(*log.borrow(), vec!["late"]);
}

#[test]
fn handlers_may_enqueue_follow_up_work() {
    let channels = ChannelSet::new(1);
    let log: Log = Rc::default();

    let scheduler = channels.clone();
    let sink = Rc::clone(&log);
    let first: DeferredAction = Box::new(move || {
        sink.borrow_mut().push("first".into());
        let sink = Rc::clone(&sink);
        scheduler
            .enqueue(0, Box::new(move || sink.borrow_mut().push("follow_up".into())))
            .unwrap();
    });
    channels.enqueue(0, first).unwrap();

    channels.tick(FRAME);
    assert_eq!(*log.borrow(), vec!["first"]);
    assert!(channels.is_dirty());

    channels.tick(FRAME);
    assert_eq!(*log.borrow(), vec!["first", "follow_up"]);
    assert!(channels.is_idle());
}

#[test]
fn reset_from_inside_a_handler_stops_the_drain() {
    let channels = ChannelSet::new(2);
    let log: Log = Rc::default();

    let scheduler = channels.clone();
    let sink = Rc::clone(&log);
    channels
        .enqueue(
            0,
            Box::new(move || {
                sink.borrow_mut().push("resetting".into());
                scheduler.reset();
            }),
        )
        .unwrap();
    let sink = Rc::clone(&log);
    channels
        .enqueue(0, Box::new(move || sink.borrow_mut().push("dropped".into())))
        .unwrap();
    let sink = Rc::clone(&log);
    channels
        .enqueue(1, Box::new(move || sink.borrow_mut().push("also_dropped".into())))
        .unwrap();

    channels.tick(FRAME);
    assert_eq!(*log.borrow(), vec!["resetting"]);
    assert!(channels.is_idle());
}

#[test]
fn channels_of_one_module_pace_independently() {
    let mut story = story();
    let mut core = started_core(2, &mut story);
    let log: Log = Rc::default();

    for channel in 0..2 {
        let sink = Rc::clone(&log);
        core.bind(
            &mut story,
            &format!("mark{}", channel),
            move |m: String| sink.borrow_mut().push(format!("{}:{}", channel, m)),
            channel,
        )
        .unwrap();
        core.bind_delay(&mut story, &format!("pause{}", channel), channel)
            .unwrap();
    }

    story.invoke("mark0", &[ScriptValue::String("a".into())]);
    story.invoke("pause0", &[ScriptValue::Float(1.0)]);
    story.invoke("mark0", &[ScriptValue::String("b".into())]);
    story.invoke("mark1", &[ScriptValue::String("c".into())]);
    story.invoke("pause1", &[ScriptValue::Float(0.5)]);
    story.invoke("mark1", &[ScriptValue::String("d".into())]);

    core.tick(Duration::ZERO);
    assert_eq!(*log.borrow(), vec!["0:a", "1:c"]);

    core.tick(Duration::from_millis(500));
    assert_eq!(*log.borrow(), vec!["0:a", "1:c", "1:d"]);

    core.tick(Duration::from_millis(500));
    assert_eq!(*log.borrow(), vec!["0:a", "1:c", "1:d", "0:b"]);
}
