//! Retention sweep: drop tracks the carrier has not refreshed for too long.

use std::sync::Arc;

use chrono::{DateTime, Months, TimeDelta, Utc};

use crate::{
    formatting::escape_html,
    notifier::Notifier,
    store::{TrackPager, TrackStore, DEFAULT_PAGE_SIZE},
};

/// Maximum age of the last successful refresh before a track is pruned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetentionWindow {
    /// Calendar months.
    Months(u32),
    Days(u64),
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::Months(4)
    }
}

impl RetentionWindow {
    /// Tracks last refreshed strictly before this instant are stale.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let cutoff = match *self {
            Self::Months(m) => now.checked_sub_months(Months::new(m)),
            Self::Days(d) => i64::try_from(d)
                .ok()
                .and_then(TimeDelta::try_days)
                .and_then(|delta| now.checked_sub_signed(delta)),
        };
        cutoff.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pruned: usize,
    pub notified: usize,
    /// Stale tracks whose deletion failed; the next sweep retries them.
    pub failed: usize,
}

pub struct RetentionSweeper {
    store: Arc<dyn TrackStore>,
    notifier: Notifier,
    window: RetentionWindow,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn TrackStore>, notifier: Notifier, window: RetentionWindow) -> Self {
        Self {
            store,
            notifier,
            window,
        }
    }

    /// Notify enabled watchers of every stale track, then delete it.
    ///
    /// Deletion does not depend on the notices going through. A track that
    /// fails to delete is counted and skipped; only a failing page read ends
    /// the sweep early.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let cutoff = self.window.cutoff(now);
        let mut report = SweepReport::default();
        let mut pager = TrackPager::stale(self.store.as_ref(), cutoff, DEFAULT_PAGE_SIZE);

        loop {
            let track = match pager.next().await {
                Ok(Some(track)) => track,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load stale tracks; sweep cut short");
                    break;
                }
            };
            tracing::info!(number = %track.number, updated_at = %track.updated_at, "dropping stale track");

            match self.store.watchers(&track).await {
                Ok(watchers) => {
                    let notice = removal_notice(&track.number);
                    for w in watchers {
                        if self.notifier.notify(&w.chat, &notice).await {
                            report.notified += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(number = %track.number, error = %e, "could not load watchers of stale track");
                }
            }

            match self.store.delete_track(&track).await {
                Ok(()) => report.pruned += 1,
                Err(e) => {
                    tracing::warn!(number = %track.number, error = %e, "failed to delete stale track");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

fn removal_notice(number: &str) -> String {
    // Telegram ends a tappable `/command` at the first `-`.
    let readd = if number.contains('-') {
        format!("/add {number}")
    } else {
        format!("/add_{number}")
    };
    format!(
        "{} was not updated for too long, removing it from watchlist\n\
         If you still want to watch it, add it again with {}",
        escape_html(number),
        escape_html(&readd)
    )
}
