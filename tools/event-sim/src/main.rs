//! event-sim: synthetic object-down detection candidates as JSON lines
//!
//! Usage:
//!   event-sim [--count N] [--interval-ms MS] [--source-id ID]
//!             [--lat LAT] [--lon LON] [--radius DEG]
//!
//! Emits one candidate per line on stdout, ready to POST to the gateway:
//!
//!   event-sim --count 10 --interval-ms 500 | while read -r line; do
//!     curl -s -X POST localhost:5006/events \
//!       -H 'content-type: application/json' -d "$line"
//!   done
//!
//! Positions jitter uniformly within --radius degrees of the center point
//! (default: Seoul City Hall), confidence is uniform in [0.5, 0.99].

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use std::env;
use std::process;
use std::thread;
use std::time::Duration;

const DEFAULT_LAT: f64 = 37.5665;
const DEFAULT_LON: f64 = 126.9780;

#[derive(serde::Serialize)]
struct Candidate {
    #[serde(rename = "type")]
    event_type: &'static str,
    source_id: String,
    lat: f64,
    lon: f64,
    confidence: f64,
    timestamp: String,
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_or_exit<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> T {
    match arg_value(args, name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("event-sim: invalid value for {}: {}", name, raw);
            process::exit(2);
        }),
        None => default,
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: event-sim [--count N] [--interval-ms MS] [--source-id ID]");
        eprintln!("                 [--lat LAT] [--lon LON] [--radius DEG]");
        process::exit(2);
    }

    let count: u64 = parse_or_exit(&args, "--count", 10);
    let interval_ms: u64 = parse_or_exit(&args, "--interval-ms", 0);
    let lat: f64 = parse_or_exit(&args, "--lat", DEFAULT_LAT);
    let lon: f64 = parse_or_exit(&args, "--lon", DEFAULT_LON);
    let radius: f64 = parse_or_exit(&args, "--radius", 0.001);
    let source_id = arg_value(&args, "--source-id").unwrap_or_else(|| "bus-1".to_string());

    let mut rng = rand::thread_rng();
    for i in 0..count {
        let candidate = Candidate {
            event_type: "fallen_pm",
            source_id: source_id.clone(),
            lat: lat + rng.gen_range(-radius..=radius),
            lon: lon + rng.gen_range(-radius..=radius),
            confidence: rng.gen_range(0.5..=0.99),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        match serde_json::to_string(&candidate) {
            Ok(line) => println!("{}", line),
            Err(e) => {
                eprintln!("event-sim: serialize failed: {}", e);
                process::exit(1);
            }
        }
        if interval_ms > 0 && i + 1 < count {
            thread::sleep(Duration::from_millis(interval_ms));
        }
    }
}
