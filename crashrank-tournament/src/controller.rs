//! Tournament controller - the single-writer run loop
//!
//! Level 1 - Orchestration and Level 2 - Phases
//!
//! The controller is the only code that mutates ratings, the in-flight set
//! and the counters, and the only code that writes to persistence. Workers
//! hand results back over the pool's completion channel; results are
//! consumed one at a time in completion order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use crashrank_core::{
    GroupError, ItemId, ItemSource, Judge, Persistence, RatingStore, RunSnapshot, MIN_GROUP_SIZE,
};
use tracing::{debug, error, info, warn};

use crate::abort::AbortPolicy;
use crate::cancel::CancellationToken;
use crate::config::TournamentConfig;
use crate::error::TournamentError;
use crate::in_flight::InFlightSet;
use crate::pool::{Completion, WorkerPool};
use crate::report::{RunOutcome, RunReport};
use crate::selector::{build_selector, selector_rng, GroupSelector, RandomSelector};

/// How often the loop wakes up to check for a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Counters handed to the progress callback after every consumed result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
    pub budget: u64,
    pub budget_remaining: u64,
    /// Whether the result just consumed was a success
    pub last_succeeded: bool,
}

impl Progress {
    pub fn consumed(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Mutable state of a run, owned by the control path
struct RunState {
    ratings: RatingStore,
    in_flight: InFlightSet,
    completed: u64,
    failed: u64,
    budget_remaining: u64,
    dispatch_seq: u64,
}

impl RunState {
    fn consumed(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Drives one ranking run
pub struct TournamentController<'a> {
    config: TournamentConfig,
    source: Arc<dyn ItemSource>,
    judge: Arc<dyn Judge>,
    persistence: &'a mut dyn Persistence,
    selector: Box<dyn GroupSelector>,
    seed_selector: RandomSelector,
    abort_policy: AbortPolicy,
    cancel: CancellationToken,
}

impl<'a> TournamentController<'a> {
    pub fn new(
        config: TournamentConfig,
        source: Arc<dyn ItemSource>,
        judge: Arc<dyn Judge>,
        persistence: &'a mut dyn Persistence,
    ) -> Self {
        let selector = build_selector(&config.selector);
        Self {
            config,
            source,
            judge,
            persistence,
            selector,
            seed_selector: RandomSelector,
            abort_policy: AbortPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the configured selector (used once the seed phase is over)
    pub fn with_selector(mut self, selector: Box<dyn GroupSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_abort_policy(mut self, policy: AbortPolicy) -> Self {
        self.abort_policy = policy;
        self
    }

    /// Use an externally owned stop signal
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ========================================================================
    // Level 1 - Orchestration
    // ========================================================================

    /// Run to completion, abort or interrupt
    pub fn run(self) -> Result<RunReport, TournamentError> {
        self.run_with_progress(|_, _| {})
    }

    /// Run, calling `on_progress` after every consumed result
    pub fn run_with_progress<F>(mut self, mut on_progress: F) -> Result<RunReport, TournamentError>
    where
        F: FnMut(&Progress, &RatingStore),
    {
        self.config.validate()?;
        let started_at = Utc::now();

        let universe = self.load_universe()?;
        let mut state = self.restore_state(&universe)?;
        let resumed_from = state.consumed();

        info!(
            "Starting run: {} items, k={}, budget {} ({} remaining), {} workers, {} seed groups then selector {}, judge {}",
            universe.len(),
            self.config.group_size,
            self.config.budget,
            state.budget_remaining,
            self.config.workers,
            self.config.seed_groups,
            self.selector.name(),
            self.judge.judge_id()
        );

        let pool = WorkerPool::new(self.config.workers)?;
        let outcome = self.run_loop(&pool, &universe, &mut state, &mut on_progress)?;

        let (discarded, abandoned) = if state.in_flight.is_empty() {
            (0, 0)
        } else {
            self.drain(&pool, &mut state)
        };

        self.save_snapshot(&state)?;
        let snapshot_location = self.persistence.snapshot_location();

        match &outcome {
            RunOutcome::Aborted(reason) => error!("Run aborted: {}", reason),
            other => info!("Run {}", other),
        }
        info!(
            "{} succeeded, {} failed; snapshot at {}",
            state.completed, state.failed, snapshot_location
        );

        Ok(RunReport {
            outcome,
            standings: state.ratings.standings(universe.iter()),
            completed: state.completed,
            failed: state.failed,
            resumed_from,
            discarded,
            abandoned,
            budget: self.config.budget,
            budget_remaining: self.config.budget.saturating_sub(state.consumed()),
            snapshot_location,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn run_loop<F>(
        &mut self,
        pool: &WorkerPool,
        universe: &[ItemId],
        state: &mut RunState,
        on_progress: &mut F,
    ) -> Result<RunOutcome, TournamentError>
    where
        F: FnMut(&Progress, &RatingStore),
    {
        loop {
            if self.cancel.is_cancelled() {
                warn!("Stop requested, no further groups will be dispatched");
                return Ok(RunOutcome::Interrupted);
            }

            self.fill_slots(pool, universe, state)?;

            if state.in_flight.is_empty() {
                if state.budget_remaining == 0 {
                    return Ok(RunOutcome::Completed);
                }
                warn!(
                    "No group can be formed from {} items with nothing in flight",
                    universe.len()
                );
                return Ok(RunOutcome::Exhausted);
            }

            let completion = match pool.next_completion(POLL_INTERVAL) {
                Some(completion) => completion,
                None => continue,
            };

            let succeeded = self.consume(completion, state)?;
            let progress = Progress {
                completed: state.completed,
                failed: state.failed,
                in_flight: state.in_flight.group_count(),
                budget: self.config.budget,
                budget_remaining: state.budget_remaining,
                last_succeeded: succeeded,
            };
            on_progress(&progress, &state.ratings);

            if let Some(reason) = self.abort_policy.check(state.consumed(), state.failed) {
                return Ok(RunOutcome::Aborted(reason));
            }

            // Run-wide count, so the points match across resumes
            if state.consumed() % self.config.snapshot_every == 0 {
                self.save_snapshot(state)?;
            }
        }
    }

    // ========================================================================
    // Level 2 - Phases
    // ========================================================================

    /// Fetch the id universe, sorted
    fn load_universe(&self) -> Result<Vec<ItemId>, TournamentError> {
        let ids = self.source.list_ids()?;
        if ids.len() < MIN_GROUP_SIZE {
            return Err(TournamentError::InsufficientItems { found: ids.len() });
        }
        if ids.len() < self.config.group_size {
            warn!(
                "Only {} items for group size {}; groups will hold every available item",
                ids.len(),
                self.config.group_size
            );
        }
        Ok(ids.into_iter().collect())
    }

    /// Fresh state, or state restored from the stored snapshot
    fn restore_state(&self, universe: &[ItemId]) -> Result<RunState, TournamentError> {
        let mut ratings = RatingStore::new(self.config.rating.clone());
        let mut completed = 0;
        let mut failed = 0;

        if let Some(snapshot) = self.persistence.load_snapshot()? {
            snapshot.check_version()?;
            ratings.restore(&snapshot.ratings);
            completed = snapshot.completed;
            failed = snapshot.failed;

            info!(
                "Resuming from snapshot saved {}: {} succeeded, {} failed",
                snapshot.saved_at.format("%Y-%m-%d %H:%M:%S"),
                completed,
                failed
            );

            let logged = self.persistence.load_observations()?.len() as u64;
            if logged != completed {
                warn!(
                    "Observation log holds {} entries but the snapshot counts {}; continuing from the snapshot",
                    logged, completed
                );
            }

            let unknown = snapshot
                .ratings
                .beliefs
                .keys()
                .filter(|id| universe.binary_search(id).is_err())
                .count();
            if unknown > 0 {
                warn!("{} rated items are no longer present in the item source", unknown);
            }

            if completed + failed >= self.config.budget {
                info!("Snapshot already covers the budget of {}", self.config.budget);
            }
        }

        let consumed = completed + failed;
        Ok(RunState {
            ratings,
            in_flight: InFlightSet::new(),
            completed,
            failed,
            budget_remaining: self.config.budget.saturating_sub(consumed),
            dispatch_seq: consumed,
        })
    }

    /// Dispatch groups until every worker is busy, the budget is reserved or
    /// no group can be formed
    fn fill_slots(
        &self,
        pool: &WorkerPool,
        universe: &[ItemId],
        state: &mut RunState,
    ) -> Result<(), TournamentError> {
        while state.budget_remaining > 0 && state.in_flight.group_count() < self.config.workers {
            if self.abort_policy.holds_dispatch(state.consumed(), state.failed, state.dispatch_seq) {
                break;
            }
            let eligible = state.in_flight.eligible(universe);
            let mut rng = selector_rng(self.config.seed, state.dispatch_seq);
            if self.config.seed_groups > 0 && state.dispatch_seq == self.config.seed_groups {
                info!("Seed phase complete, switching to selector {}", self.selector.name());
            }
            let selector: &dyn GroupSelector = if self.config.in_seed_phase(state.dispatch_seq) {
                &self.seed_selector
            } else {
                self.selector.as_ref()
            };
            let group = match selector.propose(
                &eligible,
                self.config.group_size,
                &state.ratings,
                &mut rng,
            ) {
                Some(group) => group,
                None => break,
            };

            check_proposal(&group, &eligible, &state.in_flight)?;
            state.in_flight.admit(&group)?;
            state.budget_remaining -= 1;

            debug!("Dispatching #{}: {:?}", state.dispatch_seq, group);
            pool.dispatch(
                state.dispatch_seq,
                group,
                Arc::clone(&self.source),
                Arc::clone(&self.judge),
            );
            state.dispatch_seq += 1;
        }
        Ok(())
    }

    /// Fold one result into the run state; returns whether it succeeded
    fn consume(&mut self, completion: Completion, state: &mut RunState) -> Result<bool, TournamentError> {
        state.in_flight.release(&completion.group);

        match completion.result {
            Ok(observation) => {
                self.persistence.append_observation(&observation)?;
                let weight = self.config.weight_for(observation.group_size());
                state.ratings.update(&observation, weight);
                state.completed += 1;
                debug!(
                    "Result #{}: {:?} (weight {:.3})",
                    completion.ticket, observation.ordered_ids, weight
                );
                Ok(true)
            }
            Err(e) => {
                state.failed += 1;
                warn!("Evaluation #{} failed: {}", completion.ticket, e);
                Ok(false)
            }
        }
    }

    /// Wait out in-flight work after a stop, discarding whatever arrives
    fn drain(&self, pool: &WorkerPool, state: &mut RunState) -> (u64, u64) {
        let grace = self.config.drain_grace();
        info!(
            "Waiting up to {:.1}s for {} in-flight groups",
            grace.as_secs_f64(),
            state.in_flight.group_count()
        );

        let deadline = Instant::now() + grace;
        let mut discarded = 0;
        while !state.in_flight.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if let Some(completion) = pool.next_completion((deadline - now).min(POLL_INTERVAL)) {
                debug!("Discarding result #{} that arrived after the stop", completion.ticket);
                state.in_flight.release(&completion.group);
                discarded += 1;
            }
        }

        let abandoned = state.in_flight.group_count() as u64;
        if abandoned > 0 {
            warn!("Abandoning {} groups still running after the grace period", abandoned);
        }
        (discarded, abandoned)
    }

    fn save_snapshot(&mut self, state: &RunState) -> Result<(), TournamentError> {
        let snapshot = RunSnapshot::new(
            state.ratings.snapshot(),
            state.completed,
            state.failed,
            self.config.budget.saturating_sub(state.consumed()),
        );
        self.persistence.save_snapshot(&snapshot)?;
        debug!(
            "Snapshot saved: {} succeeded, {} failed",
            snapshot.completed, snapshot.failed
        );
        Ok(())
    }
}

// ============================================================================
// Level 3 - Steps
// ============================================================================

/// Every proposed id must be eligible: known and not in flight
fn check_proposal(
    group: &[ItemId],
    eligible: &[ItemId],
    in_flight: &InFlightSet,
) -> Result<(), TournamentError> {
    for id in group {
        if eligible.binary_search(id).is_err() {
            if in_flight.contains(id) {
                return Err(TournamentError::InFlightViolation(id.clone()));
            }
            return Err(GroupError::Foreign(id.clone()).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortReason;
    use crate::config::SelectorConfig;
    use crashrank_core::{
        Item, JudgeError, Judgment, OrdinalObservation, PersistenceError, SourceError,
    };
    use rand_chacha::ChaCha8Rng;
    use std::collections::{BTreeSet, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    struct VecSource(Vec<ItemId>);

    impl VecSource {
        fn new(n: usize) -> Arc<Self> {
            Arc::new(Self((0..n).map(|i| format!("item{:02}", i)).collect()))
        }
    }

    impl ItemSource for VecSource {
        fn list_ids(&self) -> Result<BTreeSet<ItemId>, SourceError> {
            Ok(self.0.iter().cloned().collect())
        }

        fn resolve(&self, id: &str) -> Result<Item, SourceError> {
            Ok(Item::new(id, format!("/crashes/{}.json", id)))
        }
    }

    /// Orders by the numeric suffix of the id (higher is more exploitable)
    struct ScriptedJudge {
        fail: Box<dyn Fn(usize) -> bool + Send + Sync>,
        delay: Duration,
        cancel_at: Option<(usize, CancellationToken)>,
        calls: AtomicUsize,
        active: Mutex<HashSet<ItemId>>,
        overlap: AtomicBool,
        concurrent: AtomicUsize,
        max_concurrent: AtomicUsize,
    }

    impl ScriptedJudge {
        fn new() -> Self {
            Self {
                fail: Box::new(|_| false),
                delay: Duration::ZERO,
                cancel_at: None,
                calls: AtomicUsize::new(0),
                active: Mutex::new(HashSet::new()),
                overlap: AtomicBool::new(false),
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
            }
        }

        fn failing_when(mut self, fail: impl Fn(usize) -> bool + Send + Sync + 'static) -> Self {
            self.fail = Box::new(fail);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn cancelling_at(mut self, call: usize, token: CancellationToken) -> Self {
            self.cancel_at = Some((call, token));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn truth(id: &str) -> u32 {
        id.trim_start_matches("item").parse().unwrap_or(0)
    }

    impl Judge for ScriptedJudge {
        fn judge_id(&self) -> &str {
            "scripted"
        }

        fn evaluate(&self, group: &[Item]) -> Result<Judgment, JudgeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            {
                let mut active = self.active.lock().unwrap();
                for item in group {
                    if !active.insert(item.id.clone()) {
                        self.overlap.store(true, Ordering::SeqCst);
                    }
                }
            }
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);

            if let Some((at, token)) = &self.cancel_at {
                if call + 1 == *at {
                    token.cancel();
                }
            }
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }

            let result = if (self.fail)(call) {
                Err(JudgeError::Failed(format!("scripted failure on call {}", call)))
            } else {
                let mut ordered: Vec<ItemId> = group.iter().map(|i| i.id.clone()).collect();
                ordered.sort_by_key(|id| std::cmp::Reverse(truth(id)));
                Ok(Judgment {
                    ordered_ids: ordered,
                    rationale: "by index".to_string(),
                    raw_output: String::new(),
                })
            };

            {
                let mut active = self.active.lock().unwrap();
                for item in group {
                    active.remove(&item.id);
                }
            }
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[derive(Default)]
    struct MemoryPersistence {
        observations: Vec<OrdinalObservation>,
        snapshot: Option<RunSnapshot>,
        snapshot_saves: usize,
        /// `completed + failed` at every save
        saved_at: Vec<u64>,
        fail_appends: bool,
    }

    impl Persistence for MemoryPersistence {
        fn append_observation(&mut self, observation: &OrdinalObservation) -> Result<(), PersistenceError> {
            if self.fail_appends {
                return Err(PersistenceError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.observations.push(observation.clone());
            Ok(())
        }

        fn load_observations(&self) -> Result<Vec<OrdinalObservation>, PersistenceError> {
            Ok(self.observations.clone())
        }

        fn save_snapshot(&mut self, snapshot: &RunSnapshot) -> Result<(), PersistenceError> {
            self.snapshot = Some(snapshot.clone());
            self.snapshot_saves += 1;
            self.saved_at.push(snapshot.consumed());
            Ok(())
        }

        fn load_snapshot(&self) -> Result<Option<RunSnapshot>, PersistenceError> {
            Ok(self.snapshot.clone())
        }

        fn snapshot_location(&self) -> String {
            "memory".to_string()
        }
    }

    fn run(
        config: TournamentConfig,
        items: usize,
        judge: Arc<ScriptedJudge>,
        persistence: &mut MemoryPersistence,
    ) -> Result<RunReport, TournamentError> {
        TournamentController::new(config, VecSource::new(items), judge, persistence).run()
    }

    fn sequential(budget: u64) -> TournamentConfig {
        TournamentConfig::new(3, budget)
            .with_workers(1)
            .with_snapshot_every(5)
            .with_drain_grace(Duration::from_secs(5))
    }

    fn ordered_log(persistence: &MemoryPersistence) -> Vec<Vec<ItemId>> {
        persistence
            .observations
            .iter()
            .map(|o| o.ordered_ids.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Normal runs
    // ------------------------------------------------------------------

    #[test]
    fn test_sequential_run_spends_budget() {
        let judge = Arc::new(ScriptedJudge::new());
        let mut persistence = MemoryPersistence::default();
        let report = run(sequential(20), 10, judge.clone(), &mut persistence).unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.completed, 20);
        assert_eq!(report.failed, 0);
        assert_eq!(report.budget_remaining, 0);
        assert_eq!(judge.calls(), 20);
        assert_eq!(persistence.observations.len(), 20);
        assert_eq!(report.standings.len(), 10);
        assert!(report.standings.windows(2).all(|w| w[0].mu >= w[1].mu));

        // 4 periodic + final
        assert_eq!(persistence.snapshot_saves, 5);
        let snapshot = persistence.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.completed, 20);
        assert_eq!(snapshot.budget_remaining, 0);
    }

    #[test]
    fn test_progress_called_per_result() {
        let judge = Arc::new(ScriptedJudge::new());
        let mut persistence = MemoryPersistence::default();
        let mut seen = Vec::new();
        TournamentController::new(sequential(8), VecSource::new(6), judge, &mut persistence)
            .run_with_progress(|progress, _| seen.push(progress.consumed()))
            .unwrap();
        assert_eq!(seen, (1..=8).collect::<Vec<u64>>());
    }

    #[test]
    fn test_sequential_runs_are_deterministic() {
        let mut first = MemoryPersistence::default();
        let mut second = MemoryPersistence::default();
        run(sequential(30), 12, Arc::new(ScriptedJudge::new()), &mut first).unwrap();
        run(sequential(30), 12, Arc::new(ScriptedJudge::new()), &mut second).unwrap();

        assert_eq!(ordered_log(&first), ordered_log(&second));
        assert_eq!(
            first.snapshot.unwrap().ratings,
            second.snapshot.unwrap().ratings
        );
    }

    #[test]
    fn test_resume_matches_uninterrupted_run() {
        let mut resumed = MemoryPersistence::default();
        run(sequential(15), 10, Arc::new(ScriptedJudge::new()), &mut resumed).unwrap();
        let report = run(sequential(30), 10, Arc::new(ScriptedJudge::new()), &mut resumed).unwrap();
        assert_eq!(report.resumed_from, 15);
        assert_eq!(report.evaluated_this_run(), 15);

        let mut straight = MemoryPersistence::default();
        run(sequential(30), 10, Arc::new(ScriptedJudge::new()), &mut straight).unwrap();

        assert_eq!(ordered_log(&resumed), ordered_log(&straight));
        let a = resumed.snapshot.unwrap();
        let b = straight.snapshot.unwrap();
        assert_eq!(a.ratings, b.ratings);
        assert_eq!(a.completed, 30);
        assert_eq!(b.completed, 30);
    }

    #[test]
    fn test_resume_with_spent_budget_finishes_immediately() {
        let mut persistence = MemoryPersistence::default();
        run(sequential(10), 8, Arc::new(ScriptedJudge::new()), &mut persistence).unwrap();
        let saves = persistence.snapshot_saves;

        let judge = Arc::new(ScriptedJudge::new());
        let report = run(sequential(10), 8, judge.clone(), &mut persistence).unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(judge.calls(), 0);
        assert_eq!(report.completed, 10);
        assert_eq!(persistence.snapshot_saves, saves + 1);
    }

    #[test]
    fn test_resume_trusts_snapshot_over_shorter_log() {
        let obs = |a: &str, b: &str| {
            OrdinalObservation::from_ordering(vec![a.to_string(), b.to_string()], "earlier").unwrap()
        };
        let log = vec![obs("item03", "item01"), obs("item02", "item00"), obs("item04", "item03")];

        // Snapshot counts 5 successes, the log only holds 3
        let mut ratings = RatingStore::default();
        ratings.update(&log[0], 1.0);
        let mut persistence = MemoryPersistence {
            observations: log.clone(),
            snapshot: Some(RunSnapshot::new(ratings.snapshot(), 5, 1, 4)),
            ..Default::default()
        };

        let judge = Arc::new(ScriptedJudge::new());
        let report = run(sequential(10), 6, judge.clone(), &mut persistence).unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.resumed_from, 6);
        assert_eq!(judge.calls(), 4);
        assert_eq!(report.completed, 9);
        assert_eq!(report.failed, 1);

        // Earlier entries untouched, new ones appended after them
        assert_eq!(persistence.observations.len(), 7);
        assert_eq!(&persistence.observations[..3], &log[..]);
        // Ratings continue from the snapshot, which only saw the first entry
        let mut expected = RatingStore::default();
        expected.update(&log[0], 1.0);
        let config = sequential(10);
        for o in &persistence.observations[3..] {
            expected.update(o, config.weight_for(o.group_size()));
        }
        assert_eq!(persistence.snapshot.unwrap().ratings, expected.snapshot());
    }

    #[test]
    fn test_snapshot_cadence_survives_resume() {
        let mut persistence = MemoryPersistence::default();
        run(sequential(7), 10, Arc::new(ScriptedJudge::new()), &mut persistence).unwrap();
        assert_eq!(persistence.saved_at, vec![5, 7]);

        run(sequential(12), 10, Arc::new(ScriptedJudge::new()), &mut persistence).unwrap();
        assert_eq!(persistence.saved_at, vec![5, 7, 10, 12]);
    }

    // ------------------------------------------------------------------
    // Concurrency
    // ------------------------------------------------------------------

    #[test]
    fn test_parallel_groups_never_share_items() {
        let judge = Arc::new(ScriptedJudge::new().with_delay(Duration::from_millis(5)));
        let mut persistence = MemoryPersistence::default();
        let config = TournamentConfig::new(3, 40).with_workers(4);
        let report = run(config, 12, judge.clone(), &mut persistence).unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.completed, 40);
        assert!(!judge.overlap.load(Ordering::SeqCst));
        assert!(judge.max_concurrent.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn test_two_items_with_many_workers() {
        let judge = Arc::new(ScriptedJudge::new().with_delay(Duration::from_millis(2)));
        let mut persistence = MemoryPersistence::default();
        let config = TournamentConfig::new(4, 6).with_workers(3);
        let report = run(config, 2, judge.clone(), &mut persistence).unwrap();

        assert_eq!(report.completed, 6);
        assert_eq!(judge.max_concurrent.load(Ordering::SeqCst), 1);
        assert!(persistence.observations.iter().all(|o| o.group_size() == 2));
    }

    #[test]
    fn test_parallel_run_keeps_extremes_in_place() {
        let config = TournamentConfig::new(4, 150)
            .with_workers(4)
            .with_selector(SelectorConfig::random());

        let mut parallel = MemoryPersistence::default();
        let report = run(config.clone(), 8, Arc::new(ScriptedJudge::new()), &mut parallel).unwrap();
        let mut serial = MemoryPersistence::default();
        let baseline = run(config.with_workers(1), 8, Arc::new(ScriptedJudge::new()), &mut serial).unwrap();

        for r in [&report, &baseline] {
            assert_eq!(r.standings.first().unwrap().id, "item07");
            assert_eq!(r.standings.last().unwrap().id, "item00");
        }
    }

    // ------------------------------------------------------------------
    // Failures and stops
    // ------------------------------------------------------------------

    #[test]
    fn test_early_abort_after_four_failures() {
        let judge = Arc::new(ScriptedJudge::new().failing_when(|_| true));
        let mut persistence = MemoryPersistence::default();
        let report = run(sequential(100), 10, judge.clone(), &mut persistence).unwrap();

        assert_eq!(report.outcome, RunOutcome::Aborted(AbortReason::EarlyFailures { failed: 4 }));
        assert_eq!(judge.calls(), 4);
        assert!(persistence.observations.is_empty());

        let snapshot = persistence.snapshot.unwrap();
        assert_eq!(snapshot.failed, 4);
        assert_eq!(snapshot.budget_remaining, 96);
    }

    #[test]
    fn test_early_abort_with_parallel_workers_calls_judge_four_times() {
        let judge = Arc::new(
            ScriptedJudge::new()
                .failing_when(|_| true)
                .with_delay(Duration::from_millis(5)),
        );
        let mut persistence = MemoryPersistence::default();
        let config = TournamentConfig::new(3, 100).with_workers(4);
        let report = run(config, 20, judge.clone(), &mut persistence).unwrap();

        assert_eq!(report.outcome, RunOutcome::Aborted(AbortReason::EarlyFailures { failed: 4 }));
        assert_eq!(judge.calls(), 4);
        assert_eq!(report.discarded + report.abandoned, 0);
        assert_eq!(persistence.snapshot.unwrap().budget_remaining, 96);
    }

    #[test]
    fn test_early_success_releases_parallel_dispatch() {
        let judge = Arc::new(ScriptedJudge::new().failing_when(|call| call < 3));
        let mut persistence = MemoryPersistence::default();
        let config = TournamentConfig::new(3, 30).with_workers(4);
        let report = run(config, 20, judge.clone(), &mut persistence).unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.failed, 3);
        assert_eq!(report.completed, 27);
    }

    #[test]
    fn test_late_abort_over_failure_rate() {
        let judge = Arc::new(ScriptedJudge::new().failing_when(|call| call >= 40));
        let mut persistence = MemoryPersistence::default();
        let report = run(sequential(100), 10, judge.clone(), &mut persistence).unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Aborted(AbortReason::FailureRate { failed: 11, consumed: 51 })
        );
        assert_eq!(judge.calls(), 51);
        assert_eq!(report.completed, 40);
        assert_eq!(persistence.observations.len(), 40);
    }

    #[test]
    fn test_failure_rate_at_threshold_is_tolerated() {
        let judge = Arc::new(ScriptedJudge::new().failing_when(|call| call >= 41));
        let mut persistence = MemoryPersistence::default();
        let report = run(sequential(51), 10, judge, &mut persistence).unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.completed, 41);
        assert_eq!(report.failed, 10);
    }

    #[test]
    fn test_interrupt_stops_dispatch_and_snapshots() {
        let token = CancellationToken::new();
        let judge = Arc::new(ScriptedJudge::new().cancelling_at(3, token.clone()));
        let mut persistence = MemoryPersistence::default();
        let report = TournamentController::new(sequential(100), VecSource::new(10), judge.clone(), &mut persistence)
            .with_cancellation(token)
            .run()
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Interrupted);
        assert_eq!(judge.calls(), 3);
        assert!(report.completed <= 3);
        assert_eq!(report.completed + report.discarded, 3);

        let snapshot = persistence.snapshot.unwrap();
        assert_eq!(snapshot.completed, report.completed);
        assert_eq!(snapshot.budget_remaining, 100 - report.completed);
    }

    #[test]
    fn test_stuck_work_abandoned_after_grace() {
        let token = CancellationToken::new();
        let judge = Arc::new(
            ScriptedJudge::new()
                .with_delay(Duration::from_millis(1500))
                .cancelling_at(2, token.clone()),
        );
        let mut persistence = MemoryPersistence::default();
        let config = TournamentConfig::new(2, 10)
            .with_workers(2)
            .with_drain_grace(Duration::from_millis(50));

        let started = Instant::now();
        let report = TournamentController::new(config, VecSource::new(6), judge, &mut persistence)
            .with_cancellation(token)
            .run()
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Interrupted);
        assert_eq!(report.abandoned, 2);
        assert_eq!(report.completed, 0);
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(persistence.snapshot.unwrap().budget_remaining, 10);
    }

    #[test]
    fn test_persistence_failure_is_fatal() {
        let mut persistence = MemoryPersistence {
            fail_appends: true,
            ..Default::default()
        };
        let result = run(sequential(10), 5, Arc::new(ScriptedJudge::new()), &mut persistence);
        assert!(matches!(result, Err(TournamentError::Persistence(_))));
    }

    // ------------------------------------------------------------------
    // Degenerate inputs
    // ------------------------------------------------------------------

    #[test]
    fn test_single_item_universe_rejected() {
        let mut persistence = MemoryPersistence::default();
        let result = run(sequential(10), 1, Arc::new(ScriptedJudge::new()), &mut persistence);
        assert!(matches!(result, Err(TournamentError::InsufficientItems { found: 1 })));
    }

    #[test]
    fn test_universe_smaller_than_k() {
        let mut persistence = MemoryPersistence::default();
        let config = TournamentConfig::new(5, 5).with_workers(1);
        let report = run(config, 3, Arc::new(ScriptedJudge::new()), &mut persistence).unwrap();

        assert_eq!(report.completed, 5);
        assert!(persistence.observations.iter().all(|o| o.group_size() == 3));
        assert_eq!(report.standings[0].id, "item02");
    }

    #[test]
    fn test_invalid_config_rejected_before_start() {
        let judge = Arc::new(ScriptedJudge::new());
        let mut persistence = MemoryPersistence::default();
        let result = run(TournamentConfig::new(9, 10), 10, judge.clone(), &mut persistence);
        assert!(matches!(result, Err(TournamentError::Config(_))));
        assert_eq!(judge.calls(), 0);
        assert!(persistence.snapshot.is_none());
    }

    struct StubbornSelector(Vec<ItemId>);

    impl GroupSelector for StubbornSelector {
        fn name(&self) -> &'static str {
            "stubborn"
        }

        fn propose(
            &self,
            _eligible: &[ItemId],
            _k: usize,
            _ratings: &RatingStore,
            _rng: &mut ChaCha8Rng,
        ) -> Option<Vec<ItemId>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn test_rejects_in_flight_proposal() {
        let judge = Arc::new(ScriptedJudge::new().with_delay(Duration::from_millis(200)));
        let mut persistence = MemoryPersistence::default();
        let config = TournamentConfig::new(2, 10).with_workers(2).with_seed_groups(0);
        let result = TournamentController::new(config, VecSource::new(4), judge, &mut persistence)
            .with_selector(Box::new(StubbornSelector(vec!["item00".into(), "item01".into()])))
            .run();
        assert!(matches!(result, Err(TournamentError::InFlightViolation(id)) if id == "item00"));
    }

    #[test]
    fn test_rejects_unknown_proposal() {
        let mut persistence = MemoryPersistence::default();
        let config = sequential(10).with_seed_groups(0);
        let result = TournamentController::new(config, VecSource::new(4), Arc::new(ScriptedJudge::new()), &mut persistence)
            .with_selector(Box::new(StubbornSelector(vec!["item00".into(), "ghost".into()])))
            .run();
        assert!(matches!(result, Err(TournamentError::InvalidGroup(GroupError::Foreign(id))) if id == "ghost"));
    }

    #[test]
    fn test_seed_phase_dispatches_random_groups_first() {
        let universe: Vec<ItemId> = (0..8).map(|i| format!("item{:02}", i)).collect();
        let stubborn = vec!["item00".to_string(), "item01".to_string()];
        let config = sequential(5).with_seed_groups(3);
        let mut persistence = MemoryPersistence::default();
        TournamentController::new(config.clone(), VecSource::new(8), Arc::new(ScriptedJudge::new()), &mut persistence)
            .with_selector(Box::new(StubbornSelector(stubborn.clone())))
            .run()
            .unwrap();

        let sorted = |mut ids: Vec<ItemId>| {
            ids.sort();
            ids
        };
        let log = ordered_log(&persistence);
        assert_eq!(log.len(), 5);
        for (seq, logged) in log.iter().take(3).enumerate() {
            let mut rng = selector_rng(config.seed, seq as u64);
            let expected = RandomSelector
                .propose(&universe, 3, &RatingStore::default(), &mut rng)
                .unwrap();
            assert_eq!(sorted(logged.clone()), sorted(expected));
        }
        for logged in &log[3..] {
            assert_eq!(sorted(logged.clone()), stubborn);
        }
    }
}
