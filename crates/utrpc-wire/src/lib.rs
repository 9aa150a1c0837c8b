//! Envelope format, request correlation, and event dispatch for utrpc.
//!
//! This is the core value-add layer of utrpc. Every message travels as an
//! [`Envelope`] — a flat `{id, method, action, error, data, type}` record —
//! and the [`RequestRegistry`] turns a fire-and-forget socket into a two-way
//! request/response channel with timeout. The [`EventBus`] wires inbound
//! envelopes to subscription and receiver listeners by composed event name.

pub mod action;
pub mod bus;
pub mod envelope;
pub mod error;
pub mod name;
pub mod registry;
pub mod transformer;
pub mod validator;

pub use action::{
    action_name, ACTION_EVENT, ACTION_RECEIVER, ACTION_REQUEST, ACTION_RESPONDER,
    ACTION_SUBSCRIPTION_START, ACTION_SUBSCRIPTION_STOP, CODE_BAD_REQUEST, CODE_INTERNAL_ERROR,
    CODE_INTERNAL_SERVER_ERROR, CODE_NOT_FOUND, CODE_PARSE_ERROR, CODE_TIMEOUT, UTRPC,
};
pub use bus::{EventBus, ListenerId};
pub use envelope::{Envelope, SocketError};
pub use error::{Result, WireError};
pub use name::{event_name, SEPARATOR};
pub use registry::{PendingRequest, RequestRegistry, Settlement};
pub use transformer::{JsonTransformer, Transformer};
pub use validator::Validator;
