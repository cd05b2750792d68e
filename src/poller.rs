//! Cyclic acquisition on top of [`EipClient`].
//!
//! A [`Poller`] owns its session exclusively: one scan cycle runs to
//! completion before the next starts, and every observation is pushed to a
//! [`ValueSink`] as an owned [`TagUpdate`]. Scalar tags are packed into
//! multiple-service batches by the planner; array element spans are
//! consolidated per tag and fetched with ranged reads.

use crate::{
    client::{EipClient, TagReadResult},
    protocol::{
        planner::{AddressRange, AreaTable, PlannerConfig, TableStatus, TagBatchSet},
        session::SessionConfig,
        types::TagValue,
        Error, Result,
    },
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One observation delivered to a [`ValueSink`].
///
/// `address` is the tag reference as scheduled (`"Motor.Speed"`) or, for
/// array spans, the element reference (`"Counts[12]"`).
#[derive(Debug, Clone)]
pub struct TagUpdate {
    pub address: String,
    /// CIP general status, zero for a good read.
    pub status: u8,
    /// First additional status word when the device supplied one.
    pub ext_status: u16,
    /// Decoded value, absent when the read failed.
    pub value: Option<TagValue>,
}

impl TagUpdate {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

impl From<TagReadResult> for TagUpdate {
    fn from(result: TagReadResult) -> Self {
        Self {
            address: result.tag,
            status: result.status,
            ext_status: result.ext_status,
            value: result.value,
        }
    }
}

/// Receiver side for polled values.
///
/// The scan cycle awaits every publish before moving on, so implementations
/// should hand off quickly instead of blocking on downstream work.
#[async_trait]
pub trait ValueSink: Send + Sync {
    async fn publish(&self, update: TagUpdate);
}

/// Poll loop tuning.
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Period between scan cycle starts.
    pub scan_interval: Duration,
    /// Fixed delay between reconnection attempts after the session is torn
    /// down.
    pub reconnect_delay: Duration,
    /// Batching and span coalescing knobs.
    pub planner: PlannerConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
            planner: PlannerConfig::default(),
        }
    }
}

/// Cyclic reader for one target device.
///
/// Transport failures tear the session down; the poller reconnects after
/// [`PollerConfig::reconnect_delay`] and resumes scanning. Device-reported
/// per-tag failures are published as updates and never abort a cycle.
pub struct Poller<S: ValueSink> {
    session_config: SessionConfig,
    config: PollerConfig,
    batches: TagBatchSet,
    spans: AreaTable<String>,
    sink: Arc<S>,
    cancel: CancellationToken,
}

impl<S: ValueSink> Poller<S> {
    pub fn new(session_config: SessionConfig, config: PollerConfig, sink: Arc<S>) -> Self {
        Self {
            session_config,
            config,
            batches: TagBatchSet::new(config.planner),
            spans: AreaTable::new(config.planner),
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops [`Poller::run`] when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Schedule a scalar tag for every scan cycle. Re-adding is a no-op.
    pub fn add_tag(&mut self, tag: &str) -> TableStatus {
        self.batches.add(tag)
    }

    /// Drop a scalar tag from the scan set.
    pub fn remove_tag(&mut self, tag: &str) -> TableStatus {
        self.batches.remove(tag)
    }

    /// Schedule `quantity` elements of an array tag starting at `start`.
    /// Spans of the same tag coalesce under the planner's gap rule.
    pub fn add_array_span(&mut self, tag: &str, start: u16, quantity: u16) -> Result<TableStatus> {
        let range = AddressRange::new(start, quantity)?;
        let status = self.spans.update(tag.to_owned(), range);
        debug!(tag, "span table updated:\n{}", self.spans);
        Ok(status)
    }

    /// Withdraw `quantity` elements of an array tag starting at `start`.
    /// The span must lie inside one scheduled range.
    pub fn remove_array_span(
        &mut self,
        tag: &str,
        start: u16,
        quantity: u16,
    ) -> Result<TableStatus> {
        let range = AddressRange::new(start, quantity)?;
        let key = tag.to_owned();
        let status = self.spans.remove(&key, range)?;
        debug!(tag, "span table updated:\n{}", self.spans);
        Ok(status)
    }

    /// Run until the cancellation token fires.
    ///
    /// Connection attempts are retried forever with a fixed delay. Scan
    /// failures that are not transport-fatal are logged and the cadence
    /// continues.
    #[instrument(level = "info", skip_all)]
    pub async fn run(self) {
        loop {
            let mut client = match EipClient::connect(self.session_config.clone()).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(error = %e, "connect failed, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = sleep(self.config.reconnect_delay) => {}
                    }
                    continue;
                }
            };
            info!(handle = client.session_handle(), "session registered");

            let cancelled = self.scan_loop(&mut client).await;
            client.close().await;
            if cancelled {
                return;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// Scan on a fixed cadence until cancellation or a fatal transport
    /// error. Returns `true` when the loop ended through cancellation.
    async fn scan_loop(&self, client: &mut EipClient) -> bool {
        let mut ticker = interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return true,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.scan_once(client).await {
                if e.is_fatal() {
                    warn!(error = %e, "scan aborted, session will be re-established");
                    return false;
                }
                warn!(error = %e, "scan cycle failed");
            }
        }
    }

    /// One full pass over the scheduled batches and array spans.
    async fn scan_once(&self, client: &mut EipClient) -> Result<()> {
        for batch in self.batches.batches() {
            if batch.is_empty() {
                continue;
            }
            let results = client.read_tags(batch.tags()).await?;
            debug!(tags = results.len(), "batch scanned");
            for result in results {
                self.sink.publish(TagUpdate::from(result)).await;
            }
        }

        for (tag, ranges) in self.spans.entries() {
            for range in ranges.iter() {
                self.scan_span(client, tag, range).await?;
            }
        }
        Ok(())
    }

    /// Read one consolidated span and publish per-element updates.
    async fn scan_span(
        &self,
        client: &mut EipClient,
        tag: &str,
        range: &AddressRange,
    ) -> Result<()> {
        match client
            .read_tag_array(tag, u32::from(range.start()), range.quantity())
            .await
        {
            Ok(values) => {
                for (offset, value) in values.into_iter().enumerate() {
                    self.sink
                        .publish(TagUpdate {
                            address: element_address(tag, range.start(), offset),
                            status: value.status,
                            ext_status: value.ext_status,
                            value: Some(value),
                        })
                        .await;
                }
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(Error::CipStatus { status, ext_status }) => {
                warn!(tag, status, "span read rejected by device");
                self.publish_span_failure(tag, range, status, ext_status)
                    .await;
                Ok(())
            }
            Err(e) => {
                warn!(tag, error = %e, "span read failed");
                self.publish_span_failure(tag, range, 0xFF, 0).await;
                Ok(())
            }
        }
    }

    async fn publish_span_failure(
        &self,
        tag: &str,
        range: &AddressRange,
        status: u8,
        ext_status: u16,
    ) {
        for offset in 0..usize::from(range.quantity()) {
            self.sink
                .publish(TagUpdate {
                    address: element_address(tag, range.start(), offset),
                    status,
                    ext_status,
                    value: None,
                })
                .await;
        }
    }
}

fn element_address(tag: &str, start: u16, offset: usize) -> String {
    format!("{tag}[{}]", usize::from(start) + offset)
}
