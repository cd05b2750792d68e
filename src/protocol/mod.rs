//! EtherNet/IP protocol stack root module.
//!
//! Submodules under this namespace define the encapsulation framing, CIP
//! request/reply codecs, session management, the typed value codec and the
//! address/batch planning logic used by the polling layer.

pub mod codec;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod planner;
pub mod session;
pub mod types;

pub use error::{Error, Result};
