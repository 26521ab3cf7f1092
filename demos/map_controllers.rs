//! Map Zwift Play controllers to logged key events
//!
//! Run with: cargo run --example map_controllers

use std::sync::Arc;

use zwift_play_bridge::{
    ActuationEvent, ActuationSink, Bridge, BridgeConfig, PowerProfileConfig, Result,
    TargetPowerSample, TrainerControl,
};

/// Prints every press/release instead of injecting keys.
struct PrintSink;

impl ActuationSink for PrintSink {
    fn actuate(&self, event: &ActuationEvent) {
        println!("[{}] {} {}", event.device, event.action, event.key);
    }
}

/// No trainer attached in this demo.
struct NoTrainer;

#[async_trait::async_trait]
impl TrainerControl for NoTrainer {
    async fn set_target_power(&self, _sample: &TargetPowerSample) -> Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!("Zwift Play -> key event mapper");
    println!("==============================\n");
    println!("Squeeze buttons and paddles to see events. Ctrl+C to exit.\n");

    let config = BridgeConfig {
        // No trainer in the loop; keep the tick inert.
        profile: PowerProfileConfig::Constant { watts: 0 },
        ..Default::default()
    };

    let bridge = Bridge::new(config, Arc::new(PrintSink), Arc::new(NoTrainer)).await?;
    bridge.start();

    tokio::signal::ctrl_c().await.ok();
    println!("\nExiting...");

    bridge.shutdown().await;

    for (label, state) in bridge.session_states() {
        println!("  {} ended in state {}", label, state);
    }

    Ok(())
}
