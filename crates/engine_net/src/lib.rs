//! # engine_net
//!
//! The network-facing edge of the component runtime.
//!
//! This crate provides:
//!
//! - [`opcode`] — packed protocol opcodes and their kinds.
//! - [`messages`] — cross-process sphere-event requests, responses and payloads.
//! - [`error`] — boundary error codes and network-layer errors.
//! - [`codec`] — MessagePack serialisation/deserialisation helpers.
//! - [`subjects`] — NATS subject builders for sphere-event delivery.
//! - [`connection`] — NATS connection management.
//! - [`sink`] — where a scene hands encoded events for remote subscribers.

pub mod codec;
pub mod connection;
pub mod error;
pub mod messages;
pub mod opcode;
pub mod sink;
pub mod subjects;

pub use codec::{decode, decode_event, encode};
pub use connection::NatsConnection;
pub use error::{ErrorCode, NetError};
pub use messages::RouteId;
pub use opcode::{OpCode, OpCodeKind};
pub use sink::{NatsSphereSink, RemoteEventSink};
