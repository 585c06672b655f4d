//! A desk lamp driven by simulated button presses.
//!
//! Builds an engine over a recording device, defines a breathing state and
//! a party state, then walks through a short interaction script, printing
//! what the "hardware" would show.
//!
//! Run with:
//! ```bash
//! cargo run --example button_lamp -p lumo-machine
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lumo_core::RecordingDevice;
use lumo_machine::{Engine, RuleSpec, State};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let device = Arc::new(RecordingDevice::new());
    let engine = Engine::with_defaults(device.clone());

    engine.add_state(
        State::code(
            "breathe",
            "let w = (sin(t * tau / 4) + 1) / 2\n\
             return lerp_color(rgb(10, 10, 30), rgb(80, 80, 255), ease_in_out(w)), 40",
        )
        .with_description("slow blue breathing"),
    );
    engine.add_state(
        State::code(
            "party",
            "return hsv(t * 180, 1, 1), 33",
        )
        .with_description("fast hue cycle"),
    );

    engine.add_rule(RuleSpec::transition("on", "double_click", "breathe"))?;
    engine.add_rule(RuleSpec::transition("breathe", "double_click", "party"))?;
    engine.add_rule(RuleSpec::transition("party", "double_click", "on"))?;
    // Long-press always bails out.
    engine.add_rule(RuleSpec::transition("*", "long_press", "off"))?;

    let script = [
        ("button_click", 300u64),
        ("double_click", 1500),
        ("double_click", 1500),
        ("long_press", 300),
    ];

    for (event, dwell_ms) in script {
        engine.execute_transition(event);
        println!(
            "{event:>13} -> {:<8} showing {}",
            engine.current_state(),
            engine.current_color(),
        );
        tokio::time::sleep(Duration::from_millis(dwell_ms)).await;
    }

    println!(
        "device saw {} frames during the session",
        device.push_count()
    );
    engine.shutdown();
    Ok(())
}
