//! High-level tag access client.
//!
//! [`EipClient`] wraps a registered [`Session`] and exposes typed tag and
//! attribute operations. Single-tag operations run one service per exchange;
//! [`EipClient::read_tags`] and [`EipClient::write_tags`] batch many tags
//! into one Multiple Service Packet round trip and report per-tag status
//! without losing request order.

use crate::protocol::{
    error::{Error, Result},
    frame::{
        builder::{self, ConnectionParams, TagWrite},
        response::{self, ServiceReply},
    },
    session::{Session, SessionConfig},
    types::{service, CipDataType, CipValue, TagValue},
};
use bytes::Bytes;
use tracing::{debug, instrument, warn};

/// Outcome of one embedded read in a batched exchange, order-aligned with
/// the request.
#[derive(Debug, Clone)]
pub struct TagReadResult {
    /// Tag reference this result belongs to.
    pub tag: String,
    /// CIP general status for this tag.
    pub status: u8,
    /// First additional status word, when supplied.
    pub ext_status: u16,
    /// Decoded value on success.
    pub value: Option<TagValue>,
}

impl TagReadResult {
    pub fn is_ok(&self) -> bool {
        self.status == 0 && self.value.is_some()
    }
}

/// Outcome of one embedded write in a batched exchange.
#[derive(Debug, Clone)]
pub struct TagWriteResult {
    /// Tag reference this result belongs to.
    pub tag: String,
    /// CIP general status for this tag.
    pub status: u8,
    /// First additional status word, when supplied.
    pub ext_status: u16,
}

impl TagWriteResult {
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Tag access client over a registered EtherNet/IP session.
#[derive(Debug)]
pub struct EipClient {
    session: Session,
    params: ConnectionParams,
}

impl EipClient {
    /// Connect and register a session with the target.
    #[instrument(level = "info", skip_all)]
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let mut session = Session::connect(config).await?;
        session.register().await?;
        Ok(Self {
            session,
            params: ConnectionParams::default(),
        })
    }

    /// Override the class 1 connection parameters used by
    /// [`EipClient::forward_open`] and [`EipClient::forward_close`].
    pub fn with_connection_params(mut self, params: ConnectionParams) -> Self {
        self.params = params;
        self
    }

    /// Read one element of a tag.
    #[instrument(level = "debug", skip_all)]
    pub async fn read_tag(&mut self, tag: &str) -> Result<TagValue> {
        let reply = self
            .service_exchange(builder::build_read_tag(tag, 1)?, service::READ_TAG)
            .await?;
        reply.check_status()?;
        response::decode_read_reply(&reply)
    }

    /// Read `element_count` consecutive elements of an array tag starting at
    /// `element_index`. Index zero addresses the tag head without an element
    /// selector, so plain tags can be read with a count as well.
    #[instrument(level = "debug", skip_all)]
    pub async fn read_tag_array(
        &mut self,
        tag: &str,
        element_index: u32,
        element_count: u16,
    ) -> Result<Vec<TagValue>> {
        let reference = if element_index > 0 {
            format!("{tag}[{element_index}]")
        } else {
            tag.to_string()
        };
        let reply = self
            .service_exchange(
                builder::build_read_tag(&reference, element_count)?,
                service::READ_TAG,
            )
            .await?;
        reply.check_status()?;
        response::decode_read_array_reply(&reply, element_count)
    }

    /// Write one typed value to a tag.
    #[instrument(level = "debug", skip_all)]
    pub async fn write_tag(&mut self, tag: &str, value: &CipValue) -> Result<()> {
        let reply = self
            .service_exchange(builder::build_write_tag(tag, value)?, service::WRITE_TAG)
            .await?;
        reply.check_status()
    }

    /// Write `element_count` elements of raw little-endian data to a tag.
    #[instrument(level = "debug", skip_all)]
    pub async fn write_tag_array(
        &mut self,
        tag: &str,
        ty: CipDataType,
        element_count: u16,
        data: &[u8],
    ) -> Result<()> {
        let reply = self
            .service_exchange(
                builder::build_write_tag_array(tag, ty, element_count, data)?,
                service::WRITE_TAG,
            )
            .await?;
        reply.check_status()
    }

    /// Read one element of each tag in a single Multiple Service Packet
    /// exchange.
    ///
    /// Results are aligned with the input order. A tag that fails keeps its
    /// slot with the device status; a value that cannot be decoded is
    /// reported with status `0xFF` instead of aborting the whole batch.
    #[instrument(level = "debug", skip_all)]
    pub async fn read_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Result<Vec<TagReadResult>> {
        let cip = builder::build_multiple_read(tags)?;
        let reply_cip = self.session.send_request(cip).await?;
        let outer = ServiceReply::parse(&reply_cip)?;
        let items = response::split_multiple_service(&outer)?;
        if items.len() != tags.len() {
            return Err(Error::ProtocolViolation {
                context: "embedded reply count does not match request",
            });
        }
        debug!(tags = tags.len(), "batched read complete");

        let mut results = Vec::with_capacity(items.len());
        for (tag, item) in tags.iter().zip(items) {
            let tag = tag.as_ref().to_string();
            if !item.is_ok() {
                results.push(TagReadResult {
                    tag,
                    status: item.status,
                    ext_status: item.ext_status,
                    value: None,
                });
                continue;
            }
            match response::decode_embedded_read_value(&item) {
                Ok(value) => results.push(TagReadResult {
                    tag,
                    status: 0,
                    ext_status: 0,
                    value: Some(value),
                }),
                Err(e) => {
                    warn!(tag = %tag, error = %e, "embedded read value decode failed");
                    results.push(TagReadResult {
                        tag,
                        status: 0xFF,
                        ext_status: 0,
                        value: None,
                    });
                }
            }
        }
        Ok(results)
    }

    /// Write one value to each tag in a single Multiple Service Packet
    /// exchange, reporting per-tag status in request order.
    #[instrument(level = "debug", skip_all)]
    pub async fn write_tags(&mut self, writes: &[TagWrite]) -> Result<Vec<TagWriteResult>> {
        let cip = builder::build_multiple_write(writes)?;
        let reply_cip = self.session.send_request(cip).await?;
        let outer = ServiceReply::parse(&reply_cip)?;
        let items = response::split_multiple_service(&outer)?;
        if items.len() != writes.len() {
            return Err(Error::ProtocolViolation {
                context: "embedded reply count does not match request",
            });
        }

        Ok(writes
            .iter()
            .zip(items)
            .map(|(w, item)| TagWriteResult {
                tag: w.tag.clone(),
                status: item.status,
                ext_status: item.ext_status,
            })
            .collect())
    }

    /// Read a single object attribute. The value is decoded from the type
    /// code the reply declares, same as a tag read.
    #[instrument(level = "debug", skip_all)]
    pub async fn read_attribute(
        &mut self,
        class: u16,
        instance: u16,
        attribute: u16,
    ) -> Result<TagValue> {
        let reply = self
            .service_exchange(
                builder::build_read_attribute(class, instance, attribute)?,
                service::READ_TAG,
            )
            .await?;
        reply.check_status()?;
        response::decode_read_reply(&reply)
    }

    /// Write a single object attribute.
    #[instrument(level = "debug", skip_all)]
    pub async fn write_attribute(
        &mut self,
        class: u16,
        instance: u16,
        attribute: u16,
        value: &CipValue,
    ) -> Result<()> {
        let reply = self
            .service_exchange(
                builder::build_write_attribute(class, instance, attribute, value)?,
                service::WRITE_TAG,
            )
            .await?;
        reply.check_status()
    }

    /// Open a class 1 connection through the Connection Manager and store
    /// the network connection id the target assigned.
    #[instrument(level = "info", skip_all)]
    pub async fn forward_open(&mut self) -> Result<u32> {
        let cip = builder::build_forward_open(&self.params);
        let reply_cip = self.session.send_request(cip).await?;
        let connection_id = response::parse_forward_open_reply(&reply_cip)?;
        self.session.set_connection_id(connection_id);
        debug!(connection_id, "forward open accepted");
        Ok(connection_id)
    }

    /// Close the class 1 connection opened by [`EipClient::forward_open`].
    /// The reply is drained but its content is not interpreted.
    #[instrument(level = "info", skip_all)]
    pub async fn forward_close(&mut self) -> Result<()> {
        let cip = builder::build_forward_close(&self.params);
        let _ = self.session.send_request(cip).await?;
        self.session.set_connection_id(0);
        Ok(())
    }

    /// Release the session and the transport.
    pub async fn close(&mut self) {
        self.session.close().await;
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.session.is_registered()
    }

    #[inline]
    pub fn session_handle(&self) -> u32 {
        self.session.session_handle()
    }

    #[inline]
    pub fn connection_id(&self) -> u32 {
        self.session.connection_id()
    }

    async fn service_exchange(&mut self, cip: Bytes, request_code: u8) -> Result<ServiceReply> {
        let reply_cip = self.session.send_request(cip).await?;
        let reply = ServiceReply::parse(&reply_cip)?;
        reply.expect_echo_of(request_code)?;
        Ok(reply)
    }
}
