//! Client library for the RIOC key-value store.
//!
//! Speaks the store's pipelined binary protocol over TCP, optionally inside
//! a mutually-authenticated TLS 1.3 session. Operations are transmitted as
//! batches of up to 128; a background receiver demultiplexes the ordered
//! response stream into per-operation result slots. The synchronous calls
//! (`get`, `insert`, ...) are batches of one with identical wire form.
//!
//! ```no_run
//! use rioc::{Client, ClientConfig};
//!
//! let client = Client::connect(&ClientConfig::new("localhost", 7400))?;
//! client.insert(b"greeting", b"hello", 1)?;
//! assert_eq!(client.get(b"greeting")?, b"hello");
//! # Ok::<(), rioc::ClientError>(())
//! ```

#![allow(clippy::new_without_default)]

pub mod client;
pub mod config;
pub mod net;

pub use crate::client::Client;
pub use crate::config::{ClientConfig, TlsConfig};
pub use crate::net::batch::Batch;
pub use crate::net::support::{ClientError, ClientResult, Status};
pub use crate::net::tracker::{Payload, RangeEntry, Tracker};
