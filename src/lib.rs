//! EtherNet/IP explicit-messaging client for logic controller tag access.
//!
//! The crate is layered bottom-up:
//! - [`protocol`]: encapsulation framing, CIP request/reply codecs, session
//!   management and address/batch planning;
//! - [`client`]: typed single, array and batched tag operations over one
//!   registered session;
//! - [`poller`]: cyclic acquisition pushing decoded values into a
//!   [`ValueSink`];
//! - [`config`]: serde-facing device configuration.

pub mod client;
pub mod config;
pub mod poller;
pub mod protocol;

pub use client::{EipClient, TagReadResult, TagWriteResult};
pub use config::DeviceConfig;
pub use poller::{Poller, PollerConfig, TagUpdate, ValueSink};
pub use protocol::{
    error::{Error, Result},
    frame::builder::{ConnectionParams, TagWrite},
    planner::{
        AddressRange, AddressTable, Area, AreaTable, PlannerConfig, RangeSet, RemovalOutcome,
        TableStatus, TagBatch, TagBatchSet,
    },
    session::{SessionConfig, SessionState},
    types::{CipDataType, CipString, CipValue, TagValue},
};
