//! # iax-engine
//!
//! An IAX2-style VoIP session engine: any number of call legs multiplexed
//! over one UDP socket, with reliable signalling, voice timestamp
//! prediction, compact mini frames, attended transfer and an adaptive
//! jitter buffer.
//!
//! The engine does not transcode audio. It moves opaque codec payloads and
//! decides when each one was sent and when it should be played.
//!
//! ## Feature Flags
//!
//! - `transport` (default): tokio UDP socket and the async
//!   [`Engine::get_event`] loop
//!
//! Without it the engine is driven entirely by [`Engine::inject`] and
//! [`Engine::poll`] over a [`MemoryTransport`].
//!
//! ## Modules
//!
//! - [`core`]: constants, errors and the clock abstraction
//! - [`frame`]: full/mini headers, information elements, audio formats
//! - [`jitter`]: the adaptive jitter buffer, usable on its own
//! - [`session`]: per-call state and the session registry
//! - [`transport`]: datagram transports
//! - [`engine`]: the engine itself
//!
//! ## Example Usage
//!
//! ```rust
//! use iax_engine::prelude::*;
//!
//! let transport = MemoryTransport::new("127.0.0.1:4569".parse()?);
//! let config = EngineBuilder::new().jitterbuffer(false).build()?;
//! let mut engine = Engine::new(config, transport)?;
//!
//! let call = engine.new_session()?;
//! let request = CallRequest::new("127.0.0.1/100", Format::ULAW, Format::ULAW | Format::GSM);
//! engine.call(call, &request)?;
//! assert_eq!(engine.transport().sent_count(), 1);
//!
//! while let Some(event) = engine.poll() {
//!     if event.kind == EventKind::Hangup {
//!         break;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod engine;
pub mod event;
pub mod frame;
pub mod jitter;
mod scheduler;
pub mod session;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{Clock, EngineError, EngineResult, ManualClock, MonotonicClock};
    #[cfg(feature = "transport")]
    pub use crate::engine::Wait;
    pub use crate::engine::{
        CallRequest, DialString, Engine, EngineBuilder, EngineConfig, ShutdownHandle,
        TransferOptions,
    };
    pub use crate::event::{CallNumber, Event, EventKind};
    pub use crate::frame::{CodecPrefs, Format};
    pub use crate::session::{NetStat, NetStats};
    #[cfg(feature = "transport")]
    pub use crate::transport::IaxSocket;
    pub use crate::transport::{MemoryTransport, Transport};
}

// Re-export commonly used items at crate root
pub use core::{EngineError, EngineResult};
pub use engine::{CallRequest, Engine, EngineBuilder, EngineConfig, TransferOptions};
pub use event::{CallNumber, Event, EventKind};
pub use frame::Format;
pub use transport::{MemoryTransport, Transport};

#[cfg(feature = "transport")]
pub use engine::Wait;
#[cfg(feature = "transport")]
pub use transport::IaxSocket;
