//! Wire model: full and mini headers, information elements and audio
//! format helpers.
//!
//! ```text
//!  full frame                              mini frame
//! ┌───────────────────────────────┐      ┌──────────────────────┐
//! │ F|scall  R|dcall  ts(32)      │      │ 0|call  ts(16)       │
//! │ oseq iseq type csub           │      ├──────────────────────┤
//! ├───────────────────────────────┤      │ raw codec bytes      │
//! │ IEs (IAX) or raw payload      │      └──────────────────────┘
//! └───────────────────────────────┘
//! ```

mod codec;
mod header;
pub mod ie;

pub use codec::{CodecPrefs, Format};
pub use header::*;
pub use ie::{IeBuilder, Ies};
