use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

use crate::models::notification::Channel;

/// Redis list carrying job references from intake to the extraction worker.
pub const JOB_QUEUE: &str = "admission:jobs";

/// Redis list carrying notification tasks for one channel.
pub fn channel_queue(channel: Channel) -> String {
    format!("admission:notify:{}", channel)
}

/// A dequeued message. It stays in the in-flight list until acked or released.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    pub payload: T,
    pub raw: String,
}

/// Durable at-least-once queue.
#[async_trait]
pub trait TaskQueue<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn enqueue(&self, item: &T) -> Result<(), QueueError>;

    /// Moves the next message into the in-flight list and returns it.
    async fn dequeue(&self) -> Result<Option<Delivery<T>>, QueueError>;

    /// Drops a message from the in-flight list once it has been handled.
    async fn ack(&self, delivery: &Delivery<T>) -> Result<(), QueueError>;

    /// Returns a message to the queue for redelivery.
    async fn release(&self, delivery: &Delivery<T>) -> Result<(), QueueError>;

    /// Moves everything left in the in-flight list back onto the queue.
    /// Only safe while no other consumer of this queue is running.
    async fn recover_in_flight(&self) -> Result<u64, QueueError>;

    async fn depth(&self) -> Result<u64, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}

/// Redis-backed queue: LPUSH to enqueue, RPOPLPUSH into `<key>:processing` to dequeue.
pub struct RedisQueue<T> {
    client: redis::Client,
    key: String,
    processing_key: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> RedisQueue<T> {
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        let key = key.into();
        Ok(Self {
            client,
            processing_key: format!("{}:processing", key),
            key,
            _payload: PhantomData,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl<T> TaskQueue<T> for RedisQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn enqueue(&self, item: &T) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(item)?;
        conn.lpush::<_, _, ()>(&self.key, &payload).await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery<T>>, QueueError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.rpoplpush(&self.key, &self.processing_key).await?;

        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(payload) => Ok(Some(Delivery { payload, raw })),
                Err(e) => {
                    // A payload no consumer can read would be redelivered forever.
                    tracing::error!(queue = %self.key, error = %e, "Dropping unreadable message");
                    conn.lrem::<_, _, ()>(&self.processing_key, 1, &raw).await?;
                    Err(QueueError::Serialize(e))
                }
            },
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery<T>) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, &delivery.raw)
            .await?;
        Ok(())
    }

    async fn release(&self, delivery: &Delivery<T>) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .lrem(&self.processing_key, 1, &delivery.raw)
            .ignore()
            .rpush(&self.key, &delivery.raw)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn().await?;
        let mut moved = 0;
        loop {
            let raw: Option<String> = conn.rpoplpush(&self.processing_key, &self.key).await?;
            if raw.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn().await?;
        let depth: u64 = conn.llen(&self.key).await?;
        Ok(depth)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
