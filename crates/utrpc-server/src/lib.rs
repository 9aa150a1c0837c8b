//! Server dispatcher for utrpc.
//!
//! A [`Router`] maps method names to [`Method`] descriptors — call shape,
//! optional validators, resolver — and a [`ServerDispatcher`] routes every
//! inbound envelope through the validation gate to the right action
//! handler, tracks live sessions by connection id, and owns the registry
//! for server-initiated pulls. Broadcast and pull handles are obtained per
//! method from the dispatcher.

pub mod dispatcher;
pub mod error;
pub mod handles;
pub mod method;
pub mod router;

pub use dispatcher::{DispatcherConfig, ServerDispatcher};
pub use error::{Result, ServerError};
pub use handles::{Receiver, Sender, Subscriber};
pub use method::{Method, MethodBuilder, MethodKind, Resolve};
pub use router::{Router, RouterBuilder};
