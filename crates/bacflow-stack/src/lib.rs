//! Network and application layers for bacflow, and the event loop that
//! drives a [`bacflow_core::comm::Stack`] over UDP.
//!
//! A device stack is `Application → Asap → Smap → Nsap → B/IP`; see
//! [`builder::DeviceBuilder`]. Everything above the socket is synchronous
//! and runs on one thread; [`runtime::LoopHandle`] is how other threads
//! reach it.

pub mod app;
pub mod appservice;
pub mod builder;
pub mod config;
pub mod error;
pub mod iocb;
pub mod netservice;
pub mod runtime;

pub use app::{Application, LocalDevice, LocalObject, PropertyValue};
pub use appservice::{Asap, DeviceInfo, DeviceInfoCache, Smap, SsmState};
pub use builder::{DeviceBuilder, DeviceStack, RouterBuilder, RouterPort, RouterStack};
pub use config::{LinkConfig, LocalDeviceConfig, NsapConfig, SmapConfig};
pub use error::{ConfigError, IoError, IocbError, StackError};
pub use iocb::{IoController, IoOutcome, IoRequest, IoResponse, IoState, Iocb};
pub use netservice::Nsap;
pub use runtime::{run_blocking, spawn_thread, EventLoop, LoopHandle};
