//! Database entity models for the federation queue.
//!
//! Three tables make up the queue:
//!
//! - [`queue_json`] holds each serialized event exactly once, keyed by NID.
//! - [`queue_pdus`] associates PDU payloads with the destinations still
//!   waiting for them.
//! - [`queue_edus`] does the same for EDUs and carries their expiry.
//!
//! A `queue_json` row lives exactly as long as at least one association row
//! in either of the other two tables references it.

/// Payload blobs shared by every destination and both event kinds.
pub mod queue_json;

/// Pending PDU deliveries, one row per destination and payload.
pub mod queue_pdus;

/// Pending EDU deliveries, one row per destination and payload.
pub mod queue_edus;
