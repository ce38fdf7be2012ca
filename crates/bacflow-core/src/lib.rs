//! BACnet protocol encoding, decoding and layer plumbing.
//!
//! `bacflow-core` holds everything that does not touch a socket: the tag
//! codec and datatypes, constructed values, addresses and the generic PDU,
//! the network and application PDU codecs, service bodies, and the
//! [`comm`] layer composition with its [`task`] scheduler. The datalink and
//! stack crates build on it.
//!
//! # Feature flags
//!
//! - **`serde`**: derives `Serialize`/`Deserialize` on addresses and enumerations.

#[macro_use]
mod macros;

/// Station addresses and address matching.
pub mod address;
/// APDU types for confirmed/unconfirmed requests and responses.
pub mod apdu;
/// Layer composition: the request/indication/response/confirmation verbs.
pub mod comm;
/// Sequences, choices, arrays and the type-erased `Any`.
pub mod constructed;
/// The encode/decode contract shared by all datatypes.
pub mod datatype;
/// Tag codec and byte reader/writer.
pub mod encoding;
/// Error types for encoding and decoding operations.
pub mod error;
/// NPDU encoding and network-layer messages.
pub mod npdu;
/// The generic PDU passed between layers.
pub mod pdu;
/// Service request and acknowledgement bodies.
pub mod services;
/// Deterministic timer scheduling.
pub mod task;
/// Primitive datatypes and BACnet enumerations.
pub mod types;

pub use address::{Address, AddressError};
pub use error::{DecodeError, EncodeError};
pub use pdu::Pdu;
