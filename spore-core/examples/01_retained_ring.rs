//! Retained Ring Example
//!
//! This example walks a simulated node through several wake cycles and a
//! power loss, printing what survives each one.
//!
//! ## What You'll Learn
//!
//! - Validating retained memory on every wake
//! - Buffering readings and timestamps across deep sleep
//! - How uptime keeps counting while the chip is off
//! - What a power loss does to the buffer
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_retained_ring
//! ```

use spore_core::{
    header, settings::names, timebase, FixedTime, MemorySettings, NodeState, SensorKind,
    SettingsStore, SimulatedRegion, SleepClock, StoreError, TelemetryRing, BUILD_MAGIC,
};

fn wake(
    region: &mut SimulatedRegion,
    settings: &mut MemorySettings,
    timer: &FixedTime,
    state: &mut NodeState,
) -> Result<bool, StoreError> {
    timer.reset();
    *state = NodeState::new();
    header::load(state, region, settings, BUILD_MAGIC)
}

fn print_ring(state: &NodeState) {
    for (i, reading) in state.readings().enumerate() {
        match reading.kind {
            SensorKind::TimestampOffset => {
                println!("  [{i:2}] {:<12} t={} ms", reading.kind.label(), timebase::decode(state, reading.value))
            }
            kind => println!("  [{i:2}] {:<12} {:.3}", kind.label(), f64::from(reading.value) / 1000.0),
        }
    }
}

fn main() -> Result<(), StoreError> {
    println!("Spore Retained Ring Example");
    println!("===========================\n");

    // Everything below survives deep sleep; only `state` is rebuilt per wake
    let mut region = SimulatedRegion::new();
    let mut settings = MemorySettings::new();
    settings.write(names::CLOCK_DRIFT, b"150")?;
    let timer = FixedTime::new(0);
    let mut state = NodeState::new();

    for cycle in 0..4 {
        let warm = wake(&mut region, &mut settings, &timer, &mut state)?;
        timer.advance(180);

        let clock = SleepClock::new(&timer);
        let mut ring = TelemetryRing::new(&mut state, &clock);
        let now = ring.uptime();
        ring.store_timestamp(now)?;
        ring.store(SensorKind::Temperature, 21_000 + cycle * 250)?;
        ring.store(SensorKind::BatteryVoltage, 3_700 - cycle * 5)?;

        println!(
            "wake {} ({}): uptime {} ms, {} readings buffered",
            state.boot_count(),
            if warm { "warm" } else { "cold" },
            now,
            state.num_readings()
        );

        timer.advance(40);
        clock.save(&mut state, &mut region, BUILD_MAGIC, 15_000)?;
    }

    println!("\nBuffer before power loss:");
    wake(&mut region, &mut settings, &timer, &mut state)?;
    print_ring(&state);

    println!("\nPulling the battery...");
    region.power_loss();
    let warm = wake(&mut region, &mut settings, &timer, &mut state)?;
    println!(
        "wake {} ({}): {} readings, clock calibration {} ms re-seeded from settings",
        state.boot_count(),
        if warm { "warm" } else { "cold" },
        state.num_readings(),
        state.sleep_clock().clock_cal_ms
    );

    Ok(())
}
