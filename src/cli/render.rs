//! Plain-text rendering for the list and scan views.

use chrono::{Local, TimeZone};

use crate::{
    capture::{ApiStatus, RecognitionEvent, ScanSnapshot, ScanUpdate, Severity},
    watchlist::WatchedPlate,
};

pub fn plate_row(index: usize, plate: &WatchedPlate) -> String {
    let added = Local
        .timestamp_millis_opt(plate.created_at)
        .single()
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".into());
    format!("{:>3}. {:<12} added {}  [{}]", index + 1, plate.number, added, plate.id)
}

pub fn watchlist(plates: &[WatchedPlate]) -> String {
    if plates.is_empty() {
        return "Watchlist is empty.".into();
    }
    plates
        .iter()
        .enumerate()
        .map(|(i, plate)| plate_row(i, plate))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn event(event: &RecognitionEvent) -> String {
    let tag = match event.severity {
        Severity::Success => "MATCH",
        Severity::Info => "seen ",
        Severity::Error => "ERROR",
    };
    format!("{} {} {}", event.timestamp, tag, event.plate_text)
}

pub fn status(status: ApiStatus) -> &'static str {
    match status {
        ApiStatus::Ok => "api ok",
        ApiStatus::QuotaExceeded => "api QUOTA EXCEEDED",
        ApiStatus::Error => "api error",
    }
}

pub fn match_banner(plate: &str) -> String {
    let line = "!".repeat(plate.len() + 24);
    format!("{line}\n!!!  WATCHLIST HIT: {plate}  !!!\n{line}")
}

pub fn snapshot(snapshot: &ScanSnapshot) -> String {
    let session = &snapshot.session;
    let mut out = format!(
        "scanning: {}  request: {}  {}",
        if session.active { "on" } else { "off" },
        if session.in_flight { "in flight" } else { "idle" },
        status(session.api_status)
    );
    if let Some(last) = &session.last_match {
        out.push_str(&format!("  last match: {}", last.plate));
    }
    out
}

pub fn log(entries: &[RecognitionEvent]) -> String {
    if entries.is_empty() {
        return "No recognitions yet.".into();
    }
    entries.iter().map(event).collect::<Vec<_>>().join("\n")
}

/// Text for one live update, `None` for updates the scan view does not print.
pub fn update(update: &ScanUpdate) -> Option<String> {
    match update {
        ScanUpdate::Started => Some("scan started, Ctrl-C to stop".into()),
        ScanUpdate::Stopped => Some("scan stopped".into()),
        ScanUpdate::Event(e) => Some(event(e)),
        ScanUpdate::StatusChanged(s) => Some(format!("-- {}", status(*s))),
        ScanUpdate::Match(plate) => Some(match_banner(plate)),
        ScanUpdate::MatchCleared => None,
        ScanUpdate::CameraError(message) => Some(format!("camera unavailable: {message}")),
    }
}
