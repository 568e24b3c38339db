//! Tessera veto window engine.
//!
//! A vote's CAST/FINAL/OVERRIDDEN state is never stored. It is derived at
//! read time from the proposal's veto deadline and the vote's override
//! flag, so there is no denormalized status to drift out of sync. The
//! engine owns the two consumer-facing operations: discovering proposals
//! that still need human review, and applying a signature-gated override.

#![deny(unsafe_code)]

mod engine;
mod signature;
mod state;

pub use engine::{OverrideRequest, VetoError, VetoWindowEngine};
pub use signature::{Ed25519Verifier, SignatureVerifier};
pub use state::VoteState;
