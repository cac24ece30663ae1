//! Scan cycle: refresh every watched track from the carrier, notify watchers
//! about changes, then run the retention sweep.

use std::{sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
    carrier::{fetch_with_timeout, CarrierClient},
    domain::Track,
    formatting::escape_html,
    notifier::Notifier,
    retention::RetentionSweeper,
    store::{TrackPager, TrackStore, DEFAULT_PAGE_SIZE},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub refreshed: usize,
    pub failed: usize,
    pub notified: usize,
    pub pruned: usize,
    /// Stale tracks the sweep could not delete.
    pub prune_failed: usize,
}

pub struct ScanLoop {
    store: Arc<dyn TrackStore>,
    carrier: Arc<dyn CarrierClient>,
    notifier: Notifier,
    sweeper: RetentionSweeper,
    carrier_timeout: Duration,
}

impl ScanLoop {
    pub fn new(
        store: Arc<dyn TrackStore>,
        carrier: Arc<dyn CarrierClient>,
        notifier: Notifier,
        sweeper: RetentionSweeper,
        carrier_timeout: Duration,
    ) -> Self {
        Self {
            store,
            carrier,
            notifier,
            sweeper,
            carrier_timeout,
        }
    }

    /// Run one full cycle. Never fails: every problem is logged and the cycle moves on.
    pub async fn run(&self) -> ScanReport {
        tracing::info!("starting scan");

        let mut report = self.refresh_watched().await;

        let sweep = self.sweeper.sweep(Utc::now()).await;
        report.pruned = sweep.pruned;
        report.prune_failed = sweep.failed;
        report.notified += sweep.notified;

        tracing::info!(
            refreshed = report.refreshed,
            failed = report.failed,
            notified = report.notified,
            pruned = report.pruned,
            prune_failed = report.prune_failed,
            "finished scan"
        );
        report
    }

    async fn refresh_watched(&self) -> ScanReport {
        let mut report = ScanReport::default();
        let mut pager = TrackPager::watched(self.store.as_ref(), DEFAULT_PAGE_SIZE);

        loop {
            let track = match pager.next().await {
                Ok(Some(track)) => track,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "could not list watched tracks; ending refresh early");
                    break;
                }
            };

            tracing::info!(number = %track.number, "scanning");
            if self.refresh_one(&track, &mut report).await {
                report.refreshed += 1;
            } else {
                report.failed += 1;
            }
        }

        report
    }

    async fn refresh_one(&self, track: &Track, report: &mut ScanReport) -> bool {
        let snapshot =
            match fetch_with_timeout(self.carrier.as_ref(), &track.number, self.carrier_timeout)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(number = %track.number, error = %e, "carrier lookup failed");
                    return false;
                }
            };

        if let Err(e) = self
            .store
            .update_track_status(track, &snapshot.text, Utc::now())
            .await
        {
            tracing::error!(number = %track.number, error = %e, "failed to store status");
            return false;
        }

        if track.status.as_deref() != Some(snapshot.text.as_str()) {
            report.notified += self.notify_change(track, &snapshot.text).await;
        }
        true
    }

    async fn notify_change(&self, track: &Track, status: &str) -> usize {
        let watchers = match self.store.watchers(track).await {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(number = %track.number, error = %e, "could not load watchers");
                return 0;
            }
        };

        let mut delivered = 0;
        for w in watchers {
            let html = status_notice(&track.number, &w.comment, status);
            if self.notifier.notify(&w.chat, &html).await {
                delivered += 1;
            }
        }
        delivered
    }
}

fn status_notice(number: &str, comment: &str, status: &str) -> String {
    let mut out = format!("📦 <b>{}</b>", escape_html(number));
    if !comment.trim().is_empty() {
        out.push_str(&format!(" <i>{}</i>", escape_html(comment)));
    }
    out.push('\n');
    out.push_str(&escape_html(status));
    out
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration as ChronoDuration};

    use super::*;
    use crate::domain::ChatId;
    use crate::retention::RetentionWindow;
    use crate::store::SqliteTrackStore;
    use crate::testing::{temp_store, FakeCarrier, FakeMessenger};

    struct Harness {
        store: Arc<SqliteTrackStore>,
        carrier: Arc<FakeCarrier>,
        messenger: Arc<FakeMessenger>,
        scan: ScanLoop,
    }

    async fn harness(timeout: Duration) -> Harness {
        let store = Arc::new(temp_store().await);
        let carrier = Arc::new(FakeCarrier::default());
        let messenger = Arc::new(FakeMessenger::default());
        let notifier = Notifier::new(store.clone(), messenger.clone());
        let sweeper =
            RetentionSweeper::new(store.clone(), notifier.clone(), RetentionWindow::default());
        let scan = ScanLoop::new(store.clone(), carrier.clone(), notifier, sweeper, timeout);
        Harness {
            store,
            carrier,
            messenger,
            scan,
        }
    }

    async fn watch(h: &Harness, chat: i64, number: &str, comment: &str) {
        let chat = h.store.find_or_create_chat(ChatId(chat)).await.unwrap();
        let track = h.store.find_or_create_track(number).await.unwrap();
        h.store.add_watch(&track, &chat, comment).await.unwrap();
    }

    /// Backdate `updated_at` without touching the status.
    async fn age(h: &Harness, number: &str, at: DateTime<Utc>) {
        sqlx::query("UPDATE tracks SET updated_at = ? WHERE number = ?")
            .bind(at.timestamp_micros())
            .bind(number)
            .execute(&h.store.pool().writer)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_failing_track_does_not_stop_the_others() {
        let h = harness(Duration::from_secs(5)).await;
        let old = Utc::now() - ChronoDuration::days(1);
        for number in ["T1", "T2", "T3", "T4"] {
            watch(&h, 1, number, "").await;
            age(&h, number, old).await;
            h.carrier.set_status(number, "Accepted");
        }
        h.carrier.set_failing("T2");

        let report = h.scan.run().await;

        assert_eq!(report.refreshed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(h.carrier.calls(), vec!["T1", "T2", "T3", "T4"]);
        for number in ["T1", "T3", "T4"] {
            let t = h.store.find_track(number).await.unwrap().unwrap();
            assert!(t.updated_at > old, "{number} should be refreshed");
            assert_eq!(t.status.as_deref(), Some("Accepted"));
        }
        let t2 = h.store.find_track("T2").await.unwrap().unwrap();
        assert_eq!(
            t2.updated_at,
            DateTime::from_timestamp_micros(old.timestamp_micros()).unwrap()
        );
        assert_eq!(t2.status, None);
    }

    #[tokio::test]
    async fn hanging_carrier_times_out() {
        let h = harness(Duration::from_millis(20)).await;
        watch(&h, 1, "SLOW", "").await;
        watch(&h, 1, "FAST", "").await;
        h.carrier.set_hanging("SLOW");
        h.carrier.set_status("FAST", "Delivered");

        let report = h.scan.run().await;

        assert_eq!(report.refreshed, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn unwatched_tracks_are_not_refreshed() {
        let h = harness(Duration::from_secs(5)).await;
        h.store.find_or_create_track("LONELY").await.unwrap();
        watch(&h, 1, "BUSY", "").await;
        h.carrier.set_status("BUSY", "x");
        h.carrier.set_status("LONELY", "x");

        h.scan.run().await;

        assert_eq!(h.carrier.calls(), vec!["BUSY"]);
    }

    #[tokio::test]
    async fn notifies_watchers_only_when_status_changes() {
        let h = harness(Duration::from_secs(5)).await;
        watch(&h, 1, "PKG", "birthday gift").await;
        watch(&h, 2, "PKG", "").await;
        h.carrier.set_status("PKG", "Arrived at sorting center");

        let first = h.scan.run().await;
        assert_eq!(first.notified, 2);
        let sent = h.messenger.sent_to(ChatId(1));
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("<b>PKG</b>"));
        assert!(sent[0].contains("birthday gift"));
        assert!(sent[0].contains("Arrived at sorting center"));

        let second = h.scan.run().await;
        assert_eq!(second.notified, 0);
        assert_eq!(h.messenger.sent_to(ChatId(1)).len(), 1);

        h.carrier.set_status("PKG", "Delivered");
        let third = h.scan.run().await;
        assert_eq!(third.notified, 2);
    }

    #[tokio::test]
    async fn sweep_runs_at_the_end_of_the_cycle() {
        let h = harness(Duration::from_secs(5)).await;
        watch(&h, 1, "ANCIENT", "").await;
        age(&h, "ANCIENT", Utc::now() - ChronoDuration::days(400)).await;
        // Carrier has nothing for it, so it stays stale.
        h.carrier.set_failing("ANCIENT");

        let report = h.scan.run().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.pruned, 1);
        assert_eq!(report.prune_failed, 0);
        assert!(h.store.find_track("ANCIENT").await.unwrap().is_none());
        let sent = h.messenger.sent_to(ChatId(1));
        assert!(sent[0].contains("was not updated for too long"));
    }

    #[test]
    fn status_notice_escapes_user_text() {
        let html = status_notice("A1", "<mom>", "In transit & sorted");
        assert_eq!(html, "📦 <b>A1</b> <i>&lt;mom&gt;</i>\nIn transit &amp; sorted");
    }
}
