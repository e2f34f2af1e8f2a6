//! Bounded worker pool with a completion channel
//!
//! Workers resolve items, call the judge and send the outcome back. They
//! never touch ratings, the in-flight set or persistence.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use crashrank_core::{ItemId, ItemSource, Judge, JudgeError, OrdinalObservation};

use crate::error::TournamentError;

/// Outcome of one dispatched group
#[derive(Debug)]
pub struct Completion {
    /// Dispatch sequence number
    pub ticket: u64,
    pub group: Vec<ItemId>,
    pub result: Result<OrdinalObservation, JudgeError>,
}

/// Fixed-size rayon pool feeding a single completion channel
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, TournamentError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("crashrank-worker-{}", i))
            .build()
            .map_err(|e| TournamentError::Pool(e.to_string()))?;
        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            pool,
            sender,
            receiver,
        })
    }

    /// Queue one group for evaluation
    pub fn dispatch(
        &self,
        ticket: u64,
        group: Vec<ItemId>,
        source: Arc<dyn ItemSource>,
        judge: Arc<dyn Judge>,
    ) {
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let result = evaluate_group(&group, source.as_ref(), judge.as_ref());
            // Receiver gone means the run already finished; the result is abandoned
            let _ = sender.send(Completion {
                ticket,
                group,
                result,
            });
        });
    }

    /// Next completion, or `None` if nothing arrived within `timeout`
    pub fn next_completion(&self, timeout: Duration) -> Option<Completion> {
        match self.receiver.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Resolve, judge and validate one group (Level 3 step, runs on a worker)
pub fn evaluate_group(
    group: &[ItemId],
    source: &dyn ItemSource,
    judge: &dyn Judge,
) -> Result<OrdinalObservation, JudgeError> {
    let items = group
        .iter()
        .map(|id| {
            source.resolve(id).map_err(|e| JudgeError::Unresolved {
                id: id.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let judgment = panic::catch_unwind(AssertUnwindSafe(|| judge.evaluate(&items)))
        .map_err(|payload| JudgeError::Panicked(panic_message(payload.as_ref())))??;

    Ok(OrdinalObservation::from_judgment(group, judgment, judge.judge_id())?)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashrank_core::{Item, Judgment, SourceError};
    use std::collections::BTreeSet;

    struct Names;

    impl ItemSource for Names {
        fn list_ids(&self) -> Result<BTreeSet<ItemId>, SourceError> {
            Ok(["a", "b", "c"].iter().map(|s| s.to_string()).collect())
        }

        fn resolve(&self, id: &str) -> Result<Item, SourceError> {
            if id == "missing" {
                return Err(SourceError::UnknownItem(id.to_string()));
            }
            Ok(Item::new(id, format!("/crashes/{}", id)))
        }
    }

    enum Behaviour {
        Reverse,
        Drop,
        Panic,
    }

    struct TestJudge(Behaviour);

    impl Judge for TestJudge {
        fn judge_id(&self) -> &str {
            "test"
        }

        fn evaluate(&self, group: &[Item]) -> Result<Judgment, JudgeError> {
            let mut ordered: Vec<ItemId> = group.iter().map(|i| i.id.clone()).collect();
            match self.0 {
                Behaviour::Reverse => ordered.reverse(),
                Behaviour::Drop => {
                    ordered.pop();
                }
                Behaviour::Panic => panic!("judge exploded"),
            }
            Ok(Judgment {
                ordered_ids: ordered,
                rationale: String::new(),
                raw_output: String::new(),
            })
        }
    }

    fn group(names: &[&str]) -> Vec<ItemId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_evaluate_group_success() {
        let obs = evaluate_group(&group(&["a", "b", "c"]), &Names, &TestJudge(Behaviour::Reverse)).unwrap();
        assert_eq!(obs.ordered_ids, group(&["c", "b", "a"]));
        assert_eq!(obs.judge_id, "test");
    }

    #[test]
    fn test_evaluate_group_rejects_partial_ordering() {
        let err = evaluate_group(&group(&["a", "b", "c"]), &Names, &TestJudge(Behaviour::Drop)).unwrap_err();
        assert!(matches!(err, JudgeError::InvalidOrdering(_)));
    }

    #[test]
    fn test_evaluate_group_catches_panic() {
        let err = evaluate_group(&group(&["a", "b"]), &Names, &TestJudge(Behaviour::Panic)).unwrap_err();
        match err {
            JudgeError::Panicked(msg) => assert!(msg.contains("judge exploded")),
            other => panic!("expected panic error, got {:?}", other),
        }
    }

    #[test]
    fn test_evaluate_group_unresolved_item() {
        let err = evaluate_group(&group(&["a", "missing"]), &Names, &TestJudge(Behaviour::Reverse)).unwrap_err();
        assert!(matches!(err, JudgeError::Unresolved { id, .. } if id == "missing"));
    }

    #[test]
    fn test_pool_delivers_completions() {
        let pool = WorkerPool::new(2).unwrap();
        let source: Arc<dyn ItemSource> = Arc::new(Names);
        let judge: Arc<dyn Judge> = Arc::new(TestJudge(Behaviour::Reverse));

        pool.dispatch(0, group(&["a", "b"]), source.clone(), judge.clone());
        pool.dispatch(1, group(&["c", "missing"]), source, judge);

        let mut tickets = Vec::new();
        for _ in 0..2 {
            let completion = pool.next_completion(Duration::from_secs(10)).unwrap();
            tickets.push((completion.ticket, completion.result.is_ok()));
        }
        tickets.sort();
        assert_eq!(tickets, vec![(0, true), (1, false)]);
    }
}
