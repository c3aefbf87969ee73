//! Downstream data sink seam.
//!
//! The gateway core does not link any broker driver; it only needs the
//! narrow produce capability below. Concrete transports (Kafka, RabbitMQ,
//! ...) live outside this crate and implement [`DataSink`].

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// Capability to deliver one serialised record downstream.
#[async_trait]
pub trait DataSink: Send + Sync {
    /// Deliver `payload` to `topic`. `key` may be empty.
    async fn produce(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;
}

/// Sink that discards everything; used when no downstream is configured.
pub struct NoopSink;

#[async_trait]
impl DataSink for NoopSink {
    async fn produce(&self, _topic: &str, _key: &str, _payload: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Sink that logs each payload at debug level; useful in development.
pub struct LogSink;

#[async_trait]
impl DataSink for LogSink {
    async fn produce(&self, topic: &str, _key: &str, payload: Vec<u8>) -> Result<()> {
        debug!(topic = %topic, payload = %String::from_utf8_lossy(&payload), "record");
        Ok(())
    }
}
