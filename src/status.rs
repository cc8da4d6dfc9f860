//! Torrent status rendering for `/status` replies.
//!
//! Reproduces the established chat output: one block per torrent with queue
//! position, state glyph, bold name, size, progress, swarm counts, transfer
//! rates, ETA (omitted when non-positive), and the added date.

use crate::channel::telegram::escape_markdown;
use crate::engine::TorrentStatus;
use chrono::{Local, TimeZone};

/// States worth listing in `/status`.
pub const ACTIVE_STATES: &[&str] = &[
    "Active",
    "Downloading",
    "Seeding",
    "Paused",
    "Checking",
    "Error",
    "Queued",
];

fn state_glyph(state: &str) -> &str {
    match state.to_lowercase().as_str() {
        "seeding" => "\u{23eb}",
        "queued" => "\u{23ef}",
        "paused" => "\u{23f8}",
        "error" => "\u{2757}\u{fe0f}",
        "downloading" => "\u{23ec}",
        _ => state,
    }
}

/// Format a byte count with binary units.
pub fn fsize(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else if b < KIB * KIB * KIB {
        format!("{:.1} MiB", b / (KIB * KIB))
    } else {
        format!("{:.1} GiB", b / (KIB * KIB * KIB))
    }
}

/// Format a percentage (input 0.0..=100.0).
pub fn fpcnt(progress: f64) -> String {
    format!("{progress:.2}%")
}

/// Format a transfer rate in bytes per second.
pub fn fspeed(rate: f64) -> String {
    format!("{}/s", fsize(rate.max(0.0) as u64))
}

/// Format a peer count with its swarm total when known.
pub fn fpeer(connected: i64, total: i64) -> String {
    if total > -1 {
        format!("{connected} ({total})")
    } else {
        format!("{connected}")
    }
}

/// Format a duration in seconds as a compact two-unit string.
pub fn ftime(secs: i64) -> String {
    if secs <= 0 {
        return String::new();
    }
    let (m, s) = (secs / 60, secs % 60);
    let (h, m) = (m / 60, m % 60);
    let (d, h) = (h / 24, h % 24);
    let (w, d) = (d / 7, d % 7);
    if w > 0 {
        format!("{w}w {d}d")
    } else if d > 0 {
        format!("{d}d {h}h")
    } else if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Format a unix timestamp as a local date-time string.
pub fn fdate(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        _ => String::new(),
    }
}

/// Render one torrent's status block. Field order and conditional
/// formatting are a compatibility contract with existing chat output.
pub fn format_status(s: &TorrentStatus) -> String {
    let queue = if s.queue_position != -1 {
        s.queue_position.to_string()
    } else {
        "#".to_owned()
    };

    let mut out = String::new();
    out.push_str(&queue);
    out.push_str(&format!(
        " {} {}\n*{}* ",
        state_glyph(&s.state),
        s.state,
        escape_markdown(&s.name)
    ));
    out.push_str(&format!("({}) ", fsize(s.total_wanted)));
    out.push_str(&format!("{}\n", fpcnt(s.progress)));
    out.push_str(&format!(
        "{} / {} seeds\n",
        fpeer(s.num_seeds, s.total_seeds),
        fpeer(s.num_peers, s.total_peers)
    ));
    out.push_str(&format!(
        "{} : {}\n",
        fspeed(s.download_rate),
        fspeed(s.upload_rate)
    ));
    if s.eta_secs > 0 {
        out.push_str(&format!("*ETA:* {} ", ftime(s.eta_secs)));
    }
    out.push_str(&format!("*Added:* {}", fdate(s.time_added)));
    out
}
