//! BACnet/IP virtual link layer for bacflow.
//!
//! The [`bvll`] codec and the [`bip`] layers are synchronous and plug into a
//! [`bacflow_core::comm::Stack`]; [`UdpPort`] and [`BbmdClient`] are the
//! tokio side that moves their frames over UDP.

#![allow(async_fn_in_trait)]

pub mod bip;
pub mod bvll;
pub mod client;
pub mod error;
pub mod tables;
pub mod traits;
pub mod udp;

pub use bip::{BipBbmd, BipForeign, BipSimple, RegistrationStatus};
pub use bvll::{BvlcFunction, BvlcResultCode, Bvll};
pub use client::BbmdClient;
pub use error::DataLinkError;
pub use tables::{BdtEntry, FdtEntry, ForeignDeviceTable};
pub use traits::DataLink;
pub use udp::UdpPort;
