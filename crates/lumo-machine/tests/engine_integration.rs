//! End-to-end engine scenarios over a recording output device.

use std::sync::Arc;
use std::time::Duration;

use lumo_core::{RecordingDevice, Rgb};
use lumo_machine::{Engine, Pipeline, PipelineStep, RuleSpec, State, EVENT_BUTTON_CLICK};
use serde_json::json;

fn engine() -> (Engine, Arc<RecordingDevice>) {
    let device = Arc::new(RecordingDevice::new());
    (Engine::with_defaults(device.clone()), device)
}

async fn settle() {
    for _ in 0..25 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn toggle_scenario_off_on_off() {
    let (engine, device) = engine();
    assert_eq!(engine.current_state(), "off");

    engine.execute_transition(EVENT_BUTTON_CLICK);
    assert_eq!(engine.current_state(), "on");
    assert_eq!(device.last(), Some(Rgb::WHITE));

    engine.execute_transition(EVENT_BUTTON_CLICK);
    assert_eq!(engine.current_state(), "off");
    assert_eq!(device.last(), Some(Rgb::BLACK));
}

#[tokio::test(start_paused = true)]
async fn static_red_schedules_no_renders() {
    let (engine, device) = engine();
    engine.add_state(State::code("red", "return rgb(255, 0, 0)"));
    engine.set_state("red");

    assert_eq!(device.last(), Some(Rgb(255, 0, 0)));
    let pushes = device.push_count();

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    // Static state: nothing further was rendered.
    assert_eq!(device.push_count(), pushes);
}

#[tokio::test(start_paused = true)]
async fn timer_rule_with_auto_cleanup_fires_and_disappears() {
    let (engine, _device) = engine();
    engine
        .add_rule(
            serde_json::from_value(json!({
                "from": "*", "on": "timer", "to": "off",
                "trigger_config": {"delay_ms": 100, "auto_cleanup": true},
            }))
            .unwrap(),
        )
        .unwrap();
    engine.set_state("on");
    let rules_before = engine.rules().len();

    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;

    assert_eq!(engine.current_state(), "off");
    assert_eq!(engine.rules().len(), rules_before - 1);
}

#[tokio::test(start_paused = true)]
async fn completion_chain_flash_then_off() {
    let (engine, device) = engine();
    // Flashes white for ~120 ms, then reports completion.
    engine.add_state(State::code(
        "flash",
        "if (t < 0.12) { return rgb(255,255,255), 30 }\nreturn prev, 0",
    ));
    engine
        .add_rule(RuleSpec::transition("flash", "state_complete", "off"))
        .unwrap();

    engine.set_state("flash");
    assert_eq!(device.last(), Some(Rgb::WHITE));

    tokio::time::sleep(Duration::from_millis(300)).await;
    settle().await;
    assert_eq!(engine.current_state(), "off");
    assert_eq!(device.last(), Some(Rgb::BLACK));
}

#[tokio::test(start_paused = true)]
async fn pipeline_runs_off_the_dispatch_path() {
    let (engine, _device) = engine();
    engine.register_pipeline(Pipeline {
        name: "announce".to_string(),
        steps: vec![
            PipelineStep::SetData {
                key: "stage".to_string(),
                value: json!("started"),
            },
            PipelineStep::Wait { ms: 50 },
            PipelineStep::SetData {
                key: "stage".to_string(),
                value: json!("done"),
            },
        ],
    });
    engine
        .add_rule(
            serde_json::from_value(json!({
                "from": "*", "on": "announce", "pipeline": "announce",
            }))
            .unwrap(),
        )
        .unwrap();

    // Dispatch returns immediately; the pipeline finishes later.
    assert!(engine.execute_transition("announce"));
    settle().await;
    assert_eq!(engine.data().get("stage"), Some(json!("started")));

    tokio::time::sleep(Duration::from_millis(80)).await;
    settle().await;
    assert_eq!(engine.data().get("stage"), Some(json!("done")));
}

#[tokio::test(start_paused = true)]
async fn sensor_driven_state_reads_data_store() {
    let (engine, device) = engine();
    engine.add_state(State::code(
        "mood",
        "let level = getData(\"volume\", 0)\n\
         return lerp_color(rgb(0,0,60), rgb(255,0,60), clamp(level, 0, 1)), 50",
    ));
    engine.set_state("mood");
    let quiet = device.last().unwrap();

    engine.set_variable("volume", json!(1.0));
    tokio::time::sleep(Duration::from_millis(120)).await;
    settle().await;
    let loud = device.last().unwrap();

    assert_ne!(quiet, loud);
    assert_eq!(loud, Rgb(255, 0, 60));
}

#[tokio::test]
async fn replacing_current_state_applies_on_next_entry() {
    let (engine, device) = engine();
    engine.add_state(State::code("lamp", "return rgb(10, 10, 10)"));
    engine.set_state("lamp");
    assert_eq!(device.last(), Some(Rgb(10, 10, 10)));

    engine.add_state(State::code("lamp", "return rgb(99, 99, 99)"));
    // Still showing the old definition until re-entered.
    assert_eq!(device.last(), Some(Rgb(10, 10, 10)));

    engine.set_state("lamp");
    assert_eq!(device.last(), Some(Rgb(99, 99, 99)));
}
