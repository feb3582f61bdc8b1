//! Protocol constants for the IAX2 wire format and engine defaults.
//!
//! Wire values are fixed by the protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// HEADER BITS
// =============================================================================

/// Set on the first call-number field of a full frame.
pub const FLAG_FULL: u16 = 0x8000;

/// Set on the destination call-number field of a retransmitted full frame.
pub const FLAG_RETRANS: u16 = 0x8000;

/// Mask for the 15-bit call number.
pub const CALL_NUMBER_MASK: u16 = 0x7FFF;

/// Compressed subclass marker (value is a power-of-two shift).
pub const FLAG_SC_LOG: u8 = 0x80;

/// Maximum shift representable in a compressed subclass.
pub const MAX_SHIFT: u8 = 0x1F;

/// Protocol version advertised in NEW.
pub const PROTOCOL_VERSION: u16 = 2;

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 4569;

/// Highest call number before wrapping back to 1.
pub const MAX_CALL_NUMBER: u16 = 32767;

// =============================================================================
// CONTROL SUBCLASSES
// =============================================================================

/// Control subclass values carried in frames of type CONTROL.
pub mod control {
    /// Remote end hung up.
    pub const HANGUP: u32 = 1;
    /// Local ring.
    pub const RING: u32 = 2;
    /// Remote end is ringing.
    pub const RINGING: u32 = 3;
    /// Remote end answered.
    pub const ANSWER: u32 = 4;
    /// Remote end is busy.
    pub const BUSY: u32 = 5;
    /// Line is off hook.
    pub const TAKEOFFHOOK: u32 = 6;
    /// Line is off hook.
    pub const OFFHOOK: u32 = 7;
    /// Congestion (circuits busy).
    pub const CONGESTION: u32 = 8;
}

// =============================================================================
// HTML SUBCLASSES
// =============================================================================

/// HTML subclass values carried in frames of type HTML.
pub mod html {
    /// Sending a URL.
    pub const URL: u32 = 1;
    /// Data frame.
    pub const DATA: u32 = 2;
    /// Beginning frame.
    pub const BEGIN: u32 = 4;
    /// End frame.
    pub const END: u32 = 8;
    /// Load is complete.
    pub const LDCOMPLETE: u32 = 16;
    /// Peer does not support HTML.
    pub const NOSUPPORT: u32 = 17;
    /// Send URL and track.
    pub const LINKURL: u32 = 18;
    /// No more HTML linkage.
    pub const UNLINK: u32 = 19;
    /// Reject link request.
    pub const LINKREJECT: u32 = 20;
}

// =============================================================================
// AUTHENTICATION METHODS
// =============================================================================

/// Bits of the AUTHMETHODS information element.
pub mod auth {
    /// Plain text password.
    pub const PLAINTEXT: u16 = 1;
    /// MD5 over challenge and secret.
    pub const MD5: u16 = 2;
    /// RSA signature (not supported).
    pub const RSA: u16 = 4;
}

// =============================================================================
// TIMING (engine defaults)
// =============================================================================

/// Reliability and keepalive timing.
pub mod timing {
    use super::Duration;

    /// Floor for a reliable frame's retry interval.
    pub const MIN_RETRY_MS: u64 = 10;

    /// Ceiling for a reliable frame's retry interval.
    pub const MAX_RETRY_MS: u64 = 4000;

    /// Ceiling for a transfer-phase frame's retry interval.
    pub const MAX_TRANSFER_RETRY_MS: u64 = 1000;

    /// Backoff factor applied on every retransmission.
    pub const RETRY_BACKOFF: u64 = 4;

    /// Default retry budget for a reliable frame.
    pub const DEFAULT_MAX_RETRIES: u32 = 10;

    /// Default ping time estimate before any PONG is seen, in ms.
    pub const DEFAULT_PING_TIME_MS: i64 = 30;

    /// Period of the per-session ping timer.
    pub const PING_INTERVAL: Duration = Duration::from_secs(10);

    /// Delay before the first ping of a new session.
    pub const FIRST_PING_DELAY: Duration = Duration::from_secs(2);

    /// Smallest step between two non-voice timestamps.
    pub const MIN_TIMESTAMP_INCREMENT: i64 = 3;

    /// Window inside which a timestamp is snapped to the prediction.
    pub const PREDICTION_WINDOW_MS: i64 = 240;

    /// Window used to detect 16-bit wrap of mini-frame timestamps.
    pub const MINI_WRAP_WINDOW_MS: i64 = 50_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_masks_disjoint() {
        assert_eq!(FLAG_FULL & CALL_NUMBER_MASK, 0);
        assert_eq!(FLAG_RETRANS | CALL_NUMBER_MASK, 0xFFFF);
    }

    #[test]
    fn test_retry_bounds_ordered() {
        assert!(timing::MIN_RETRY_MS < timing::MAX_TRANSFER_RETRY_MS);
        assert!(timing::MAX_TRANSFER_RETRY_MS < timing::MAX_RETRY_MS);
        assert!(timing::FIRST_PING_DELAY < timing::PING_INTERVAL);
    }
}
