//! Host socket contracts for utrpc.
//!
//! utrpc owns no I/O. The host supplies the actual socket layer — a
//! browser/native WebSocket on the client, a socket server with topic
//! fan-out on the server — behind the traits defined here. The crate also
//! ships [`MemoryHub`], an in-process loopback implementation of both
//! sides, used by the test suites and the demo CLI.

pub mod error;
pub mod mem;
pub mod traits;

pub use error::{Result, TransportError};
pub use mem::{MemoryClientSocket, MemoryConnector, MemoryHub, MemorySession};
pub use traits::{ClientSocket, Connector, Publisher, SessionSocket};
