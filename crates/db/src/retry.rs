use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::DbError;

const MAX_BACKOFF: Duration = Duration::from_millis(100);
const LOG_EVERY: u32 = 10;

/// Re-runs `op` for as long as it fails with a write conflict.
///
/// Callers above this layer never observe a conflict: the operation either
/// commits or fails with some other error. `op` must be safe to re-run from
/// scratch, which holds for a single statement or a whole transaction.
pub async fn write_conflict_retry<T, F, Fut>(
    op_name: &str,
    ns: &str,
    mut op: F,
) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Err(e) if e.is_write_conflict() => {
                attempt = attempt.saturating_add(1);
                if attempt % LOG_EVERY == 0 {
                    warn!(
                        op = op_name,
                        ns,
                        attempt,
                        error = %e,
                        "Write conflict persists, retrying"
                    );
                } else {
                    debug!(op = op_name, ns, attempt, "Write conflict, retrying");
                }
                tokio::time::sleep(backoff(attempt)).await;
            }
            result => return result,
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt) * 5).min(MAX_BACKOFF)
}
