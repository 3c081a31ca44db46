use std::time::Duration;

use reshard_core::ShardId;

const DEFAULT_READINESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct DonorServiceConfig {
    pub shard_id: ShardId,
    /// How often the shard re-checks the catalog while waiting for a
    /// namespace to become visible.
    pub readiness_poll_interval: Duration,
}

impl DonorServiceConfig {
    pub fn new(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            readiness_poll_interval: DEFAULT_READINESS_POLL_INTERVAL,
        }
    }

    pub fn with_readiness_poll_interval(mut self, interval: Duration) -> Self {
        self.readiness_poll_interval = interval;
        self
    }
}
