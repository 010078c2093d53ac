// Bunching and leveled retry rounds for catalog lookups.
//
// IDs are cut into outer batches of `bunch_size * bunches_per_round`, each
// outer batch into bunches of `bunch_size`. A round dispatches every pending
// bunch of the current outer batch concurrently; whatever failed is retried
// as a unit in the next round, after `base_delay * level`. When the policy's
// max level is reached the remaining IDs are given up on.

use std::future::Future;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::retry::RetryPolicy;

/// How IDs are grouped into requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BunchPlan {
    /// Max IDs per request (provider limit).
    pub bunch_size: usize,
    /// Max bunches in flight per outer batch.
    pub bunches_per_round: usize,
}

impl Default for BunchPlan {
    fn default() -> Self {
        Self {
            bunch_size: 50,
            bunches_per_round: 20,
        }
    }
}

impl BunchPlan {
    pub fn outer_batch_size(&self) -> usize {
        self.bunch_size.max(1) * self.bunches_per_round.max(1)
    }

    /// Split `ids` into outer batches, each a list of bunches.
    pub fn split(&self, ids: &[String]) -> Vec<Vec<Vec<String>>> {
        ids.chunks(self.outer_batch_size())
            .map(|batch| {
                batch
                    .chunks(self.bunch_size.max(1))
                    .map(<[String]>::to_vec)
                    .collect()
            })
            .collect()
    }
}

/// What happened across all rounds of a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundsOutcome {
    /// IDs in bunches that eventually succeeded.
    pub resolved: usize,
    /// IDs in bunches still failing at the max retry level.
    pub failed: Vec<String>,
    /// Total bunch requests issued, retries included.
    pub requests: u64,
}

/// Fetch `ids` bunch by bunch with leveled retries.
///
/// `fetch` is called once per bunch per round. Each successful result is
/// handed to `fold` on the calling task as soon as it arrives, so `fold`
/// can mutate shared state without locking. A result that never arrives
/// (the future was dropped) is never folded.
pub async fn fetch_in_rounds<T, F, Fut, S>(
    ids: &[String],
    plan: BunchPlan,
    policy: RetryPolicy,
    fetch: F,
    mut fold: S,
) -> RoundsOutcome
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    S: FnMut(&[String], Vec<T>),
{
    let mut outcome = RoundsOutcome::default();
    let concurrency = plan.bunches_per_round.max(1);

    for (batch_no, mut pending) in plan.split(ids).into_iter().enumerate() {
        let mut level = 0u32;
        info!(
            batch = batch_no,
            bunches = pending.len(),
            ids = pending.iter().map(Vec::len).sum::<usize>(),
            "Catalog batch starting"
        );

        loop {
            if level > 0 {
                let delay = policy.delay_for(level);
                info!(
                    level = level,
                    failed_bunches = pending.len(),
                    delay_ms = delay.as_millis() as u64,
                    "Retrying failed catalog bunches"
                );
                tokio::time::sleep(delay).await;
            }

            outcome.requests += pending.len() as u64;
            let mut results = stream::iter(pending.into_iter().map(|bunch| {
                let request = fetch(bunch.clone());
                async move { (bunch, request.await) }
            }))
            .buffer_unordered(concurrency);

            let mut failed = Vec::new();
            while let Some((bunch, result)) = results.next().await {
                match result {
                    Ok(items) => {
                        outcome.resolved += bunch.len();
                        fold(&bunch, items);
                    }
                    Err(e) => {
                        warn!(level = level, size = bunch.len(), error = %e, "Catalog bunch failed");
                        failed.push(bunch);
                    }
                }
            }

            if failed.is_empty() {
                break;
            }
            if !policy.allows_retry_after(level) {
                let lost: Vec<String> = failed.into_iter().flatten().collect();
                warn!(count = lost.len(), level = level, "Giving up on catalog IDs");
                outcome.failed.extend(lost);
                break;
            }
            level += 1;
            pending = failed;
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id{i}")).collect()
    }

    fn fast_policy(max_level: u32) -> RetryPolicy {
        RetryPolicy {
            max_level,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_split_sizes() {
        let plan = BunchPlan {
            bunch_size: 3,
            bunches_per_round: 2,
        };
        let batches = plan.split(&ids(14));
        let shape: Vec<Vec<usize>> = batches
            .iter()
            .map(|b| b.iter().map(Vec::len).collect())
            .collect();
        assert_eq!(shape, vec![vec![3, 3], vec![3, 3], vec![2]]);
    }

    #[test]
    fn test_split_empty() {
        assert!(BunchPlan::default().split(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_all_succeed_first_round() {
        let plan = BunchPlan {
            bunch_size: 2,
            bunches_per_round: 2,
        };
        let mut folded = Vec::new();
        let outcome = fetch_in_rounds(
            &ids(5),
            plan,
            fast_policy(3),
            |bunch: Vec<String>| async move { Ok(bunch) },
            |_, items| folded.extend(items),
        )
        .await;

        assert_eq!(outcome.resolved, 5);
        assert_eq!(outcome.requests, 3);
        assert!(outcome.failed.is_empty());
        folded.sort();
        assert_eq!(folded, {
            let mut all = ids(5);
            all.sort();
            all
        });
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let calls = AtomicU64::new(0);
        let outcome = fetch_in_rounds(
            &ids(2),
            BunchPlan {
                bunch_size: 1,
                bunches_per_round: 2,
            },
            fast_policy(3),
            |bunch: Vec<String>| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    // First request for id0 fails once.
                    if n == 0 && bunch[0] == "id0" {
                        anyhow::bail!("timeout");
                    }
                    Ok(bunch)
                }
            },
            |_, _| {},
        )
        .await;

        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.resolved, 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_gives_up_at_max_level() {
        let calls = AtomicU64::new(0);
        let outcome = fetch_in_rounds(
            &ids(3),
            BunchPlan {
                bunch_size: 3,
                bunches_per_round: 1,
            },
            fast_policy(5),
            |_bunch: Vec<String>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<Vec<String>, _>(anyhow::anyhow!("503")) }
            },
            |_, _| panic!("nothing should be folded"),
        )
        .await;

        // Round 0 plus five retry levels.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(outcome.failed, ids(3));
        assert_eq!(outcome.resolved, 0);
    }
}
