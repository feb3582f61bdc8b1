//! Session registry and per-session state.
//!
//! A session is one call leg: sequence counters, peer addressing, timing,
//! a jitter buffer and transfer bookkeeping.

mod registry;
#[allow(clippy::module_inception)]
mod session;
mod timing;

pub use registry::{SessionRegistry, WrappingCounter};
pub use session::{
    Credentials, LagHistory, NetStat, NetStats, Session, TransferLink, TransferState,
};
pub use timing::{RecvTiming, SendTiming, TxKind};
