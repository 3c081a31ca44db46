use db::OplogRepository;
use reshard_core::{CreateOplogEntry, DonorStateDocument, ShardId};
use serde_json::json;

use crate::error::Result;

/// Namespace of the fence marker. It belongs to no user collection, so every
/// change-stream reader on the shard observes it.
pub const FENCE_NAMESPACE: &str = "config.system.forceOplogBatchBoundary";

pub const FINAL_OP_TYPE: &str = "reshardFinalOp";

/// Builds and appends the no-op markers a donor leaves in the oplog.
///
/// Every append first looks for an equivalent earlier entry, so re-running a
/// phase after failover never duplicates a marker.
#[derive(Clone)]
pub struct OplogMarkerWriter {
    oplog: OplogRepository,
}

impl OplogMarkerWriter {
    pub fn new(oplog: OplogRepository) -> Self {
        Self { oplog }
    }

    pub fn fence_marker(doc: &DonorStateDocument) -> CreateOplogEntry {
        CreateOplogEntry::noop(
            FENCE_NAMESPACE,
            json!({
                "msg": format!(
                    "Resharding operation {} started donating {}",
                    doc.resharding_uuid, doc.source_nss
                ),
            }),
        )
    }

    pub fn final_op_marker(doc: &DonorStateDocument, recipient: &ShardId) -> CreateOplogEntry {
        CreateOplogEntry::noop(
            doc.source_nss.as_str(),
            json!({
                "msg": format!(
                    "Writes to {} are temporarily blocked for resharding",
                    doc.source_nss
                ),
            }),
        )
        .with_uuid(doc.source_uuid)
        .with_destined_recipient(recipient.clone())
        .with_object2(json!({
            "type": FINAL_OP_TYPE,
            "reshardingUUID": doc.resharding_uuid.to_string(),
        }))
    }

    /// Returns the fence's oplog position, which becomes the operation's
    /// minimum fetch timestamp.
    pub async fn write_fence_marker(&self, doc: &DonorStateDocument) -> Result<i64> {
        let positions = self.oplog.append_unique(&[Self::fence_marker(doc)]).await?;
        Ok(positions.into_iter().next().unwrap_or_default())
    }

    /// One marker per recipient, in the document's recipient order.
    pub async fn write_final_op_markers(
        &self,
        doc: &DonorStateDocument,
    ) -> Result<Vec<(ShardId, i64)>> {
        let markers: Vec<_> = doc
            .recipient_shards
            .iter()
            .map(|recipient| Self::final_op_marker(doc, recipient))
            .collect();
        let positions = self.oplog.append_unique(&markers).await?;

        Ok(doc.recipient_shards.iter().cloned().zip(positions).collect())
    }
}
