//! Core types shared by every layer: protocol constants, errors and the
//! clock abstraction. Has no I/O dependencies.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
