use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::Local;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    alert::Alerter,
    recognition::RecognitionError,
    watchlist::{normalize, WatchlistStore},
};

use super::{
    session_log::{RecognitionEvent, SessionLog},
    state::{ApiStatus, CaptureSession, InFlightGuard},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Pushed to whoever renders the scan view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum ScanUpdate {
    Started,
    Stopped,
    Event(RecognitionEvent),
    StatusChanged(ApiStatus),
    Match(String),
    MatchCleared,
    CameraError(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub session: CaptureSession,
    pub log: Vec<RecognitionEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The session that issued the request is gone; nothing was touched.
    Discarded,
    Applied { matches: Vec<String> },
}

/// Everything the capture loop and the presentation layer share while
/// scanning: watchlist, session state, rolling log and the in-flight guard.
pub struct ScanContext {
    watchlist: Arc<WatchlistStore>,
    session: Mutex<CaptureSession>,
    log: Mutex<SessionLog>,
    guard: InFlightGuard,
    alerter: Arc<dyn Alerter>,
    updates: broadcast::Sender<ScanUpdate>,
    match_display: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScanContext {
    pub fn new(
        watchlist: Arc<WatchlistStore>,
        alerter: Arc<dyn Alerter>,
        log_capacity: usize,
        match_display: Duration,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            watchlist,
            session: Mutex::new(CaptureSession::new()),
            log: Mutex::new(SessionLog::with_capacity(log_capacity)),
            guard: InFlightGuard::new(),
            alerter,
            updates,
            match_display,
        }
    }

    pub fn watchlist(&self) -> &Arc<WatchlistStore> {
        &self.watchlist
    }

    pub fn guard(&self) -> &InFlightGuard {
        &self.guard
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanUpdate> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        let mut session = lock(&self.session).clone();
        session.in_flight = self.guard.is_busy();
        ScanSnapshot {
            session,
            log: lock(&self.log).entries(),
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.session).active
    }

    pub fn api_status(&self) -> ApiStatus {
        lock(&self.session).api_status
    }

    pub fn log_entries(&self) -> Vec<RecognitionEvent> {
        lock(&self.log).entries()
    }

    pub(crate) fn arm(&self) -> u64 {
        let epoch = lock(&self.session).arm();
        self.publish(ScanUpdate::Started);
        epoch
    }

    pub(crate) fn disarm(&self) {
        let (was_active, had_match) = {
            let mut session = lock(&self.session);
            let flags = (session.active, session.last_match.is_some());
            session.disarm();
            flags
        };
        if had_match {
            self.publish(ScanUpdate::MatchCleared);
        }
        if was_active {
            self.publish(ScanUpdate::Stopped);
        }
    }

    pub(crate) fn publish(&self, update: ScanUpdate) {
        // No subscribers is fine: nobody is rendering.
        let _ = self.updates.send(update);
    }

    /// Apply a recognition outcome issued under `epoch`. Watchlist membership
    /// is read now, not when the request was sent.
    pub async fn reconcile(
        self: &Arc<Self>,
        epoch: u64,
        outcome: Result<Vec<String>, RecognitionError>,
    ) -> Reconciled {
        let sightings = match &outcome {
            Ok(plates) => {
                let mut sightings = Vec::with_capacity(plates.len());
                for raw in plates {
                    let number = normalize(raw);
                    let matched = !number.is_empty() && self.watchlist.contains(&number).await;
                    sightings.push((raw.clone(), number, matched));
                }
                sightings
            }
            Err(_) => Vec::new(),
        };

        let now = Local::now();
        let mut updates = Vec::new();
        let mut matches = Vec::new();
        let mut decays = Vec::new();

        {
            let mut session = lock(&self.session);
            if !session.is_current(epoch) {
                log_debug!("Dropping recognition result from stale session {epoch}");
                return Reconciled::Discarded;
            }
            let mut log = lock(&self.log);

            let status = match outcome {
                Ok(_) => ApiStatus::Ok,
                Err(RecognitionError::QuotaExceeded) => ApiStatus::QuotaExceeded,
                Err(RecognitionError::Transient(_)) => {
                    let event = RecognitionEvent::signal_loss(now);
                    log.push(event.clone());
                    updates.push(ScanUpdate::Event(event));
                    ApiStatus::Error
                }
            };
            if session.api_status != status {
                session.api_status = status;
                updates.push(ScanUpdate::StatusChanged(status));
            }

            for (raw, number, matched) in sightings {
                let event = RecognitionEvent::sighting(raw, matched, now);
                log.push(event.clone());
                updates.push(ScanUpdate::Event(event));

                if matched {
                    decays.push(session.record_match(number.clone()));
                    updates.push(ScanUpdate::Match(number.clone()));
                    matches.push(number);
                }
            }
        }

        for plate in &matches {
            log_info!("Watchlist hit: {plate}");
            self.alerter.alert(plate);
        }
        for update in updates {
            self.publish(update);
        }
        for seq in decays {
            self.schedule_match_decay(seq);
        }

        Reconciled::Applied { matches }
    }

    fn schedule_match_decay(self: &Arc<Self>, seq: u64) {
        let ctx = Arc::clone(self);
        let display = self.match_display;
        tokio::spawn(async move {
            tokio::time::sleep(display).await;
            let cleared = lock(&ctx.session).clear_match(seq);
            if cleared {
                ctx.publish(ScanUpdate::MatchCleared);
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{capture::Severity, db::MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct CountingAlert {
        pub(crate) hits: AtomicUsize,
    }

    impl Alerter for CountingAlert {
        fn alert(&self, _plate: &str) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) async fn context_with(plates: &[&str]) -> (Arc<ScanContext>, Arc<CountingAlert>) {
        let watchlist = Arc::new(WatchlistStore::load(Arc::new(MemoryStore::new())).await);
        for plate in plates {
            watchlist.add(plate).await.unwrap();
        }
        let alert = Arc::new(CountingAlert::default());
        let ctx = Arc::new(ScanContext::new(
            watchlist,
            alert.clone(),
            15,
            Duration::from_secs(5),
        ));
        (ctx, alert)
    }

    #[tokio::test]
    async fn formatted_result_matches_watchlist() {
        let (ctx, alert) = context_with(&["AB123CD"]).await;
        let epoch = ctx.arm();

        let outcome = ctx.reconcile(epoch, Ok(vec!["AB-123-CD".into()])).await;
        assert_eq!(
            outcome,
            Reconciled::Applied {
                matches: vec!["AB123CD".into()]
            }
        );

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.log.len(), 1);
        assert!(snapshot.log[0].matched);
        assert_eq!(snapshot.log[0].plate_text, "AB-123-CD");
        assert_eq!(snapshot.log[0].severity, Severity::Success);
        assert_eq!(
            snapshot.session.last_match.map(|m| m.plate),
            Some("AB123CD".to_string())
        );
        assert_eq!(alert.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_plate_is_logged_as_info() {
        let (ctx, alert) = context_with(&["AB123CD"]).await;
        let epoch = ctx.arm();

        ctx.reconcile(epoch, Ok(vec!["ZZ999ZZ".into()])).await;

        let log = ctx.log_entries();
        assert_eq!(log.len(), 1);
        assert!(!log[0].matched);
        assert_eq!(log[0].severity, Severity::Info);
        assert!(ctx.snapshot().session.last_match.is_none());
        assert_eq!(alert.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quota_sets_status_without_logging() {
        let (ctx, _) = context_with(&[]).await;
        let epoch = ctx.arm();

        ctx.reconcile(epoch, Err(RecognitionError::QuotaExceeded)).await;

        assert_eq!(ctx.api_status(), ApiStatus::QuotaExceeded);
        assert!(ctx.log_entries().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_logs_one_error() {
        let (ctx, _) = context_with(&[]).await;
        let epoch = ctx.arm();

        ctx.reconcile(epoch, Err(RecognitionError::Transient("reset".into())))
            .await;

        let log = ctx.log_entries();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].severity, Severity::Error);
        assert_eq!(ctx.api_status(), ApiStatus::Error);

        // A later success restores health.
        ctx.reconcile(epoch, Ok(vec![])).await;
        assert_eq!(ctx.api_status(), ApiStatus::Ok);
        assert_eq!(ctx.log_entries().len(), 1);
    }

    #[tokio::test]
    async fn stale_results_are_discarded() {
        let (ctx, alert) = context_with(&["AB123CD"]).await;
        let epoch = ctx.arm();
        ctx.disarm();

        let outcome = ctx.reconcile(epoch, Ok(vec!["AB123CD".into()])).await;
        assert_eq!(outcome, Reconciled::Discarded);

        let next = ctx.arm();
        let outcome = ctx
            .reconcile(epoch, Err(RecognitionError::Transient("late".into())))
            .await;
        assert_eq!(outcome, Reconciled::Discarded);
        assert!(ctx.log_entries().is_empty());
        assert_eq!(ctx.api_status(), ApiStatus::Ok);
        assert_eq!(alert.hits.load(Ordering::SeqCst), 0);
        assert!(ctx.snapshot().session.is_current(next));
    }

    #[tokio::test]
    async fn membership_is_read_at_reconciliation_time() {
        let (ctx, _) = context_with(&["AB123CD"]).await;
        let epoch = ctx.arm();

        // Plate removed while the request was in flight.
        let id = ctx.watchlist().list().await[0].id.clone();
        ctx.watchlist().remove(&id).await.unwrap();

        ctx.reconcile(epoch, Ok(vec!["AB-123-CD".into()])).await;
        assert!(!ctx.log_entries()[0].matched);
    }

    #[tokio::test(start_paused = true)]
    async fn last_match_decays_after_display_window() {
        let (ctx, _) = context_with(&["AB123CD"]).await;
        let mut updates = ctx.subscribe();
        let epoch = ctx.arm();

        ctx.reconcile(epoch, Ok(vec!["AB123CD".into()])).await;
        assert!(ctx.snapshot().session.last_match.is_some());

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(ctx.snapshot().session.last_match.is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(ctx.snapshot().session.last_match.is_none());

        let mut seen = Vec::new();
        while let Ok(update) = updates.try_recv() {
            seen.push(update);
        }
        assert_eq!(seen.first(), Some(&ScanUpdate::Started));
        assert!(seen.contains(&ScanUpdate::Match("AB123CD".into())));
        assert_eq!(seen.last(), Some(&ScanUpdate::MatchCleared));
    }

    #[tokio::test]
    async fn stopping_clears_a_shown_match() {
        let (ctx, _) = context_with(&["AB123CD"]).await;
        let epoch = ctx.arm();
        ctx.reconcile(epoch, Ok(vec!["AB123CD".into()])).await;

        let mut updates = ctx.subscribe();
        ctx.disarm();

        assert!(ctx.snapshot().session.last_match.is_none());
        assert_eq!(updates.try_recv().ok(), Some(ScanUpdate::MatchCleared));
        assert_eq!(updates.try_recv().ok(), Some(ScanUpdate::Stopped));

        // Nothing to clear the second time round.
        ctx.arm();
        let mut updates = ctx.subscribe();
        ctx.disarm();
        assert_eq!(updates.try_recv().ok(), Some(ScanUpdate::Stopped));
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn log_is_bounded_across_ticks() {
        let (ctx, _) = context_with(&[]).await;
        let epoch = ctx.arm();
        for n in 1..=20 {
            ctx.reconcile(epoch, Ok(vec![format!("PLATE{n:02}")])).await;
        }
        let log = ctx.log_entries();
        assert_eq!(log.len(), 15);
        assert_eq!(log[0].plate_text, "PLATE20");
        assert_eq!(log[14].plate_text, "PLATE06");
    }
}
