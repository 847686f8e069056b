//! Tunnel capture dissector.
//!
//! Reads a text capture of tunnel traffic, reassembles the byte stream per
//! direction, decodes every frame, and prints either a colored timeline or
//! JSON lines for scripting. Requests are paired with their responses by
//! frame id so latencies and unanswered requests stand out.

mod capture;
mod dissect;
mod pairing;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use capture::{Direction, FrameAssembler};
use dissect::{dissect_frame, DissectedFrame, FrameContent};
use pairing::pair;

#[derive(Parser)]
#[command(name = "kitsune-dissect", about = "Decode a tunnel wire capture")]
struct Args {
    /// Capture file: "> ts hex..." / "< ts hex..." lines
    capture: PathBuf,

    /// Emit one JSON object per frame instead of the timeline
    #[arg(long)]
    json: bool,

    /// Also list request/response pairs with latencies
    #[arg(long)]
    pairs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let content = std::fs::read_to_string(&args.capture)
        .with_context(|| format!("Failed to read {}", args.capture.display()))?;
    let records = capture::parse_capture(&content)?;

    let mut to_daemon = FrameAssembler::new(Direction::GuestToDaemon);
    let mut to_guest = FrameAssembler::new(Direction::DaemonToGuest);
    let mut frames = Vec::new();
    for record in &records {
        let assembler = match record.direction {
            Direction::GuestToDaemon => &mut to_daemon,
            Direction::DaemonToGuest => &mut to_guest,
        };
        for raw in assembler.feed(record) {
            frames.push(dissect_frame(&raw));
        }
    }
    frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    if args.json {
        for frame in &frames {
            println!("{}", to_json(frame));
        }
        return Ok(());
    }

    for frame in &frames {
        print_frame(frame);
    }

    if args.pairs {
        print_pairs(frames);
    }

    Ok(())
}

fn print_frame(frame: &DissectedFrame) {
    let id = match frame.id() {
        Some(id) => format!("#{id:<3}"),
        None => "?   ".to_string(),
    };
    println!(
        "{:>10.6} {} {} {} {}",
        frame.timestamp,
        frame.direction,
        id.dimmed(),
        frame.describe(),
        frame.crc_status,
    );
}

fn print_pairs(frames: Vec<DissectedFrame>) {
    let report = pair(frames);

    println!();
    println!("{}", "Exchanges:".bold());
    for exchange in &report.exchanges {
        let latency = match exchange.latency() {
            Some(latency) => format!("{:.3} ms", latency * 1e3),
            None => "no response".red().to_string(),
        };
        println!("  {}  [{}]", exchange.request.describe(), latency);
    }

    if !report.orphans.is_empty() {
        println!("{}", "Orphan frames:".bold());
        for orphan in &report.orphans {
            println!("  {:>10.6} {} {}", orphan.timestamp, orphan.direction, orphan.describe());
        }
    }
}

fn to_json(frame: &DissectedFrame) -> serde_json::Value {
    let direction = match frame.direction {
        Direction::GuestToDaemon => "request",
        Direction::DaemonToGuest => "response",
    };
    serde_json::json!({
        "timestamp": frame.timestamp,
        "direction": direction,
        "id": frame.id(),
        "valid": matches!(frame.content, FrameContent::Frame(_)),
        "crc_ok": frame.crc_status == dissect::CrcStatus::Valid,
        "content": frame.describe_plain(),
        "raw": hex::encode(&frame.raw_data),
    })
}
