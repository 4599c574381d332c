//! TCP Upload Example
//!
//! This example runs a tiny report server on localhost and drains a
//! node's buffer into it over a real socket.
//!
//! ## What You'll Learn
//!
//! - Building a `DrainConfig` from node settings
//! - What the NUL-terminated JSON batches look like on the wire
//! - How partial acknowledgements spread a drain over several batches
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 02_tcp_upload
//! ```

use spore_connectors::{
    ConnectorResult, DrainConfig, DrainSession, FirmwareTarget, NodeContext, Platform, TcpConnector,
};
use spore_core::{
    header, FixedTime, MemorySettings, NodeSettings, NodeState, SensorKind, SimulatedRegion,
    SleepClock, TelemetryRing, BUILD_MAGIC,
};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;

struct NoFirmware;

impl FirmwareTarget for NoFirmware {
    fn begin(&mut self, _len: usize, _checksum: &str) -> ConnectorResult<()> {
        Ok(())
    }
    fn write(&mut self, _chunk: &[u8]) -> ConnectorResult<()> {
        Ok(())
    }
    fn finish(&mut self, _verified: bool) -> ConnectorResult<()> {
        Ok(())
    }
}

struct NoRestart;

impl Platform for NoRestart {
    fn restart(&mut self) {}
}

/// Acknowledge at most three entries per batch
fn serve(listener: TcpListener) -> std::io::Result<()> {
    let (stream, peer) = listener.accept()?;
    println!("server: connection from {peer}");
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    loop {
        let mut message = Vec::new();
        if reader.read_until(0, &mut message)? == 0 {
            break;
        }
        message.pop();
        println!("server: <- {}", String::from_utf8_lossy(&message));
        writer.write_all(b"OK,3\0")?;
    }
    println!("server: connection closed");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Spore TCP Upload Example");
    println!("========================\n");

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let server = thread::spawn(move || serve(listener));

    let mut region = SimulatedRegion::new();
    let mut settings = MemorySettings::new();
    let timer = FixedTime::new(0);
    let mut state = NodeState::new();
    header::load(&mut state, &mut region, &mut settings, BUILD_MAGIC)?;

    let node = NodeSettings::load(&mut settings, 0x00C0_FFEE)?;
    let config = DrainConfig::from_settings(&node)
        .firmware("spore-example")
        .response_timeout_ms(1_000);
    let config = DrainConfig { host: "127.0.0.1".into(), port, ..config };
    println!("uploading as {} to {}:{}\n", config.node, config.host, config.port);

    let clock = SleepClock::new(&timer);
    let mut ring = TelemetryRing::new(&mut state, &clock);
    for i in 0..4 {
        timer.advance(15_000);
        let now = ring.uptime();
        ring.store_timestamp(now)?;
        ring.store(SensorKind::Temperature, 20_500 + i * 100)?;
    }

    let mut firmware = NoFirmware;
    let mut platform = NoRestart;
    let mut ctx = NodeContext {
        retained: &mut region,
        settings: &mut settings,
        firmware: &mut firmware,
        platform: &mut platform,
    };
    let report = DrainSession::new(&config.clone().batch_size(3)).run(
        &mut TcpConnector::new().nodelay(true),
        &mut ring,
        &mut ctx,
    );

    println!("\n{} batches, {} entries acknowledged", report.sent_batches, report.acked);
    println!("{} entries left in the ring", ring.len());

    match server.join() {
        Ok(result) => result?,
        Err(_) => println!("server thread panicked"),
    }
    Ok(())
}
