//! Redis Streams-based "to-download" queue.

use redis::{aio::MultiplexedConnection, streams::*, AsyncCommands, Client};

use pipeline_common::{DownloadMessage, PipelineError, PipelineResult};

const STREAM_KEY: &str = "granule:to-download";
const CONSUMER_GROUP: &str = "download-workers";

/// A message read off the queue, carrying the Redis Streams entry id so the
/// consumer can acknowledge it once the granule transition is committed.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub entry_id: String,
    pub message: DownloadMessage,
}

/// Redis Streams queue of `{id, download_url}` download messages.
///
/// Publish happens after the granule row commits (§9, "publish-after-commit");
/// the consumer acknowledges (`ack`) only after it has durably recorded the
/// outcome, so a crashed worker's message is redelivered by the broker's own
/// visibility timeout rather than lost.
///
/// Cheap to clone: [`MultiplexedConnection`] multiplexes all clones over one
/// underlying TCP connection, so each worker task can hold its own handle.
#[derive(Clone)]
pub struct DownloadQueue {
    conn: MultiplexedConnection,
}

impl DownloadQueue {
    /// Connect to Redis and ensure the consumer group exists.
    pub async fn connect(redis_url: &str) -> PipelineResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| PipelineError::Queue(format!("redis connection failed: {e}")))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PipelineError::Queue(format!("redis connection failed: {e}")))?;

        let _: Result<(), _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(STREAM_KEY)
            .arg(CONSUMER_GROUP)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        Ok(Self { conn })
    }

    /// Publish one `{id, download_url}` message. Admission calls this once
    /// per newly-inserted granule; the requeuer and the worker's own
    /// transient-failure path call it to re-admit an existing id.
    pub async fn publish(&mut self, message: &DownloadMessage) -> PipelineResult<String> {
        let payload = serde_json::to_string(message)?;

        let entry_id: String = redis::cmd("XADD")
            .arg(STREAM_KEY)
            .arg("*")
            .arg("id")
            .arg(&message.id)
            .arg("data")
            .arg(&payload)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| PipelineError::Queue(format!("publish failed: {e}")))?;

        Ok(entry_id)
    }

    /// Claim up to `count` messages for `consumer_name`, blocking up to
    /// `block_ms` for new entries.
    pub async fn claim(
        &mut self,
        consumer_name: &str,
        count: usize,
        block_ms: usize,
    ) -> PipelineResult<Vec<QueueEntry>> {
        let opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, consumer_name)
            .count(count)
            .block(block_ms);

        let result: StreamReadReply = self
            .conn
            .xread_options(&[STREAM_KEY], &[">"], &opts)
            .await
            .map_err(|e| PipelineError::Queue(format!("read failed: {e}")))?;

        let mut entries = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some(data) = entry.map.get("data") {
                    let bytes: Vec<u8> = redis::from_redis_value(data)
                        .map_err(|e| PipelineError::Queue(format!("parse failed: {e}")))?;
                    let message: DownloadMessage = serde_json::from_slice(&bytes)?;
                    entries.push(QueueEntry {
                        entry_id: entry.id.clone(),
                        message,
                    });
                }
            }
        }

        Ok(entries)
    }

    /// Acknowledge successful processing of `entry_id`, removing it from the
    /// consumer group's pending entries list. Per the spec's failure
    /// contract, both "commit success" and "transient failure requeued"
    /// outcomes ack the original message — the broker must not redeliver it
    /// just because a fresh copy was separately published.
    pub async fn ack(&mut self, entry_id: &str) -> PipelineResult<()> {
        self.conn
            .xack(STREAM_KEY, CONSUMER_GROUP, &[entry_id])
            .await
            .map_err(|e| PipelineError::Queue(format!("ack failed: {e}")))?;

        Ok(())
    }

    /// Approximate queue depth (total entries in the stream, acked or not).
    pub async fn depth(&mut self) -> PipelineResult<u64> {
        let info: StreamInfoStreamReply = self
            .conn
            .xinfo_stream(STREAM_KEY)
            .await
            .map_err(|e| PipelineError::Queue(format!("xinfo failed: {e}")))?;

        Ok(info.length as u64)
    }

    /// Number of entries claimed but not yet acked (in-flight leases).
    pub async fn pending_count(&mut self) -> PipelineResult<u64> {
        let reply: StreamPendingReply = self
            .conn
            .xpending(STREAM_KEY, CONSUMER_GROUP)
            .await
            .map_err(|e| PipelineError::Queue(format!("xpending failed: {e}")))?;

        match reply {
            StreamPendingReply::Empty => Ok(0),
            StreamPendingReply::Data(data) => Ok(data.count as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_message_round_trips() {
        let msg = DownloadMessage {
            id: "S2B_MSIL1C_123".to_string(),
            download_url: "https://catalogue.dataspace.copernicus.eu/odata/v1/Products(abc)/$value"
                .to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: DownloadMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg.id, parsed.id);
        assert_eq!(msg.download_url, parsed.download_url);
    }
}
