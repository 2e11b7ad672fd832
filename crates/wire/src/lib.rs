// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-plane protocol for hub communication.
//!
//! Wire format: JSON text frames, one [`Envelope`] per frame, 1 MiB cap.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod envelope;
mod payload;
mod sign;

pub use envelope::{decode, encode, error_frame, Envelope, MessageType, WireError, MAX_FRAME_BYTES};
pub use payload::{
    AckPayload, HeartbeatPayload, RegisterPayload, UpdateAvailablePayload, ERR_AGENT_ID_MISMATCH,
    ERR_INVALID_MESSAGE,
};
pub use sign::{verify_payload, EnvelopeKey, SignError};
