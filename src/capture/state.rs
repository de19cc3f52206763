use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiStatus {
    #[default]
    Ok,
    QuotaExceeded,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastMatch {
    pub plate: String,
    /// Bumped on every match so a stale decay timer cannot clear a newer one.
    pub seq: u64,
}

/// Transient scan state. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub active: bool,
    pub in_flight: bool,
    pub api_status: ApiStatus,
    pub last_match: Option<LastMatch>,
    /// Identifies the armed session; results from an older epoch are dropped.
    #[serde(skip)]
    pub epoch: u64,
    #[serde(skip)]
    match_seq: u64,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `Armed`. Returns the epoch stamped on requests issued from now on.
    pub fn arm(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.active = true;
        self.epoch
    }

    pub fn disarm(&mut self) {
        self.active = false;
        self.last_match = None;
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.active && self.epoch == epoch
    }

    pub fn record_match(&mut self, plate: String) -> u64 {
        self.match_seq = self.match_seq.wrapping_add(1);
        self.last_match = Some(LastMatch {
            plate,
            seq: self.match_seq,
        });
        self.match_seq
    }

    /// Clears `last_match` only if it is still the one identified by `seq`.
    pub fn clear_match(&mut self, seq: u64) -> bool {
        match &self.last_match {
            Some(current) if current.seq == seq => {
                self.last_match = None;
                true
            }
            _ => false,
        }
    }
}

/// Single-slot admission for recognition requests: acquiring fails while a
/// permit is outstanding, and dropping the permit frees the slot.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct InFlightPermit {
    busy: Arc<AtomicBool>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<InFlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
