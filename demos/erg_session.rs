//! Full session: controllers, cadence keys, and a chaos-peaks ERG profile
//!
//! Run with: cargo run --example erg_session

use std::sync::Arc;

use zwift_play_bridge::{
    ActuationEvent, ActuationSink, Bridge, BridgeConfig, PowerProfileConfig, Result,
    TargetPowerSample, TrainerControl,
};

struct PrintSink;

impl ActuationSink for PrintSink {
    fn actuate(&self, event: &ActuationEvent) {
        println!("[{}] {} {}", event.device, event.action, event.key);
    }
}

/// Prints the target instead of writing to a trainer's control point.
struct PrintTrainer;

#[async_trait::async_trait]
impl TrainerControl for PrintTrainer {
    async fn set_target_power(&self, sample: &TargetPowerSample) -> Result<()> {
        println!("ERG target {} W [{}]", sample.watts, sample.phase);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!("Chaos Peaks ERG session");
    println!("=======================\n");
    println!("Random power spikes on a 140 W base. Stay ready for peaks!\n");

    let config = BridgeConfig {
        profile: PowerProfileConfig::ChaosPeaks {
            base_watts: 140,
            max_multiplier: 3.0,
            seed: None,
        },
        ..Default::default()
    };

    let bridge = Bridge::new(config, Arc::new(PrintSink), Arc::new(PrintTrainer)).await?;
    bridge.start();

    println!("Scanning for controllers... Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await.ok();
    println!("\nStopping ERG session...");

    bridge.shutdown().await;

    Ok(())
}
