//! Sweep orchestration: fetch every profile, reconcile the roster against
//! the fetched evidence, retry failures, and report a run summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sjt_core::{completion_met, AchievementName, FetchOutcome, ProfileRecord, NAME_LIST_SEPARATOR};
use sjt_storage::{ProfileFetcher, ProfileSource, RosterStore};

pub const CRATE_NAME: &str = "sjt-sync";

/// What applying one fetch outcome did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    Updated,
    Unchanged,
    NoMatch,
}

/// Apply one successful fetch outcome to the roster.
///
/// A record is rewritten only when the fetched evidence strictly improves
/// at least one category count. The rewrite then replaces both name lists
/// and both counts wholesale, recomputes the course total, and refreshes
/// whichever completion flags the record already carries.
pub fn reconcile(outcome: &FetchOutcome, records: &mut [ProfileRecord]) -> UpdateDecision {
    let Some(index) = find_record_index(records, &outcome.source_url) else {
        warn!(url = %outcome.source_url, "fetched a profile no roster record claims");
        return UpdateDecision::NoMatch;
    };
    let record = &mut records[index];

    let new_badges = outcome.badges.len() as u32;
    let new_games = outcome.arcade_games.len() as u32;
    let stored_badges = record.skill_badge_count.unwrap_or(0);
    let stored_games = record.arcade_game_count.unwrap_or(0);

    if new_badges <= stored_badges && new_games <= stored_games {
        return UpdateDecision::Unchanged;
    }

    record.skill_badge_count = Some(new_badges);
    record.skill_badge_names = Some(join_names(&outcome.badges));
    record.arcade_game_count = Some(new_games);
    record.arcade_game_names = Some(join_names(&outcome.arcade_games));
    record.total_course_count = Some(new_badges + new_games);

    let completed = completion_met(new_badges, new_games);
    if record.all_completed_flag.is_some() {
        record.all_completed_flag = Some(yes_no(completed));
    }
    if record.pathways_completed_flag.is_some() {
        record.pathways_completed_flag = Some(yes_no(completed));
    }
    if record.arcade_short_flag.is_some() {
        record.arcade_short_flag = Some(if new_games > 0 { "1" } else { "0" }.to_string());
    }

    info!(
        user = record.user_name.as_deref().unwrap_or("<unnamed>"),
        badges = new_badges,
        arcade_games = new_games,
        "updated roster record"
    );
    UpdateDecision::Updated
}

/// Exact URL match first, then containment in either direction to absorb
/// scheme and redirect differences.
fn find_record_index(records: &[ProfileRecord], url: &str) -> Option<usize> {
    if let Some(index) = records.iter().position(|r| r.url() == Some(url)) {
        return Some(index);
    }
    records.iter().position(|r| {
        r.url()
            .map(|record_url| record_url.contains(url) || url.contains(record_url))
            .unwrap_or(false)
    })
}

fn join_names(names: &[AchievementName]) -> String {
    names
        .iter()
        .map(AchievementName::as_str)
        .collect::<Vec<_>>()
        .join(NAME_LIST_SEPARATOR)
}

fn yes_no(value: bool) -> String {
    if value { "Yes" } else { "No" }.to_string()
}

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub concurrency: usize,
    pub delay: Duration,
    pub timeout: Duration,
    pub retry_rounds: u32,
    pub dry_run: bool,
    pub max_records: usize,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::from("main/data.json"),
            output: PathBuf::from("main/data.json"),
            concurrency: 10,
            delay: Duration::from_secs(1),
            timeout: Duration::from_secs(15),
            retry_rounds: 1,
            dry_run: false,
            max_records: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFetch {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub updated: usize,
    pub errors: usize,
    pub still_failing: Vec<FailedFetch>,
}

struct SweepStats {
    processed: usize,
    updated: usize,
    errors: usize,
    still_failing: Vec<FailedFetch>,
}

/// Runs sweeps of the roster against a profile source.
pub struct ProgressTracker<S> {
    options: TrackerOptions,
    source: Arc<S>,
}

impl ProgressTracker<ProfileFetcher> {
    pub fn new(options: TrackerOptions) -> Result<Self> {
        let source = Arc::new(ProfileFetcher::new(options.timeout)?);
        Ok(Self { options, source })
    }
}

impl<S> ProgressTracker<S>
where
    S: ProfileSource + 'static,
{
    pub fn with_source(options: TrackerOptions, source: Arc<S>) -> Self {
        Self { options, source }
    }

    /// Load the roster, sweep it, and write it back when anything improved.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let store = RosterStore::new(&self.options.input);
        let mut records = store.load().await?;

        let stats = self.sweep(&mut records).await;

        if stats.updated > 0 && !self.options.dry_run {
            RosterStore::new(&self.options.output).save(&records).await?;
        } else if self.options.dry_run {
            info!(updated = stats.updated, "dry run, roster left untouched");
        }

        let finished_at = Utc::now();
        info!(
            processed = stats.processed,
            updated = stats.updated,
            errors = stats.errors,
            still_failing = stats.still_failing.len(),
            "sweep finished"
        );

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at,
            processed: stats.processed,
            updated: stats.updated,
            errors: stats.errors,
            still_failing: stats.still_failing,
        })
    }

    /// Phase one fans fetches out across a bounded pool; phase two retries
    /// failures one at a time. Only phase-one failures count as errors.
    async fn sweep(&self, records: &mut [ProfileRecord]) -> SweepStats {
        let limit = if self.options.max_records == 0 {
            records.len()
        } else {
            records.len().min(self.options.max_records)
        };
        let concurrency = self.options.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel(concurrency);

        let mut processed = 0usize;
        for record in records.iter().take(limit) {
            let Some(url) = record.url() else {
                debug!(
                    user = record.user_name.as_deref().unwrap_or("<unnamed>"),
                    "record has no profile url, skipping"
                );
                continue;
            };
            processed += 1;

            let url = url.to_string();
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let delay = self.options.delay;
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore not closed");
                let outcome = source.fetch(&url).await;
                // Courtesy pause happens inside the pool slot so the pause
                // throttles the pool, not just this task.
                tokio::time::sleep(delay).await;
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut updated = 0usize;
        let mut errors = 0usize;
        let mut retry_queue = Vec::new();

        // The receive loop is the only place the roster mutates.
        while let Some(outcome) = rx.recv().await {
            if outcome.is_failure() {
                errors += 1;
                retry_queue.push(FailedFetch {
                    url: outcome.source_url.clone(),
                    error: outcome.error.clone().unwrap_or_default(),
                });
            } else if reconcile(&outcome, records) == UpdateDecision::Updated {
                updated += 1;
            }
        }

        for round in 1..=self.options.retry_rounds {
            if retry_queue.is_empty() {
                break;
            }
            info!(round, failures = retry_queue.len(), "retrying failed fetches");

            let mut remaining = Vec::new();
            for failed in retry_queue.drain(..) {
                let outcome = self.source.fetch(&failed.url).await;
                if outcome.is_failure() {
                    remaining.push(FailedFetch {
                        url: outcome.source_url.clone(),
                        error: outcome.error.clone().unwrap_or_default(),
                    });
                } else if reconcile(&outcome, records) == UpdateDecision::Updated {
                    updated += 1;
                }
                tokio::time::sleep(self.options.delay).await;
            }
            retry_queue = remaining;
        }

        if !retry_queue.is_empty() {
            warn!(
                rounds = self.options.retry_rounds,
                failures = retry_queue.len(),
                "fetches still failing after retries"
            );
        }

        SweepStats {
            processed,
            updated,
            errors,
            still_failing: retry_queue,
        }
    }
}

/// Build the HTTP-backed tracker and run one sweep.
pub async fn run_tracker(options: TrackerOptions) -> Result<RunSummary> {
    ProgressTracker::new(options)?.run_once().await
}
