use std::sync::Arc;

use serde_json::Value;
use utrpc_socket::SessionSocket;
use utrpc_wire::{SocketError, Validator};

/// The three call shapes a method can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Client calls the server and awaits a result.
    Transfer,
    /// Server calls a specific connected client and awaits a result.
    Receiver,
    /// Server pushes updates to clients grouped by topic.
    Subscribe,
}

impl MethodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MethodKind::Transfer => "transfer",
            MethodKind::Receiver => "receiver",
            MethodKind::Subscribe => "subscribe",
        }
    }
}

/// What a resolver sees: the calling connection and the (validated) input.
pub struct Resolve<'a> {
    pub session: &'a Arc<dyn SessionSocket>,
    pub input: Value,
}

type Resolver = Arc<dyn Fn(Resolve<'_>) -> Result<Value, SocketError> + Send + Sync>;

/// One declared server method: call shape, optional input/output
/// validators, and the resolver. Registered once into an immutable
/// [`Router`](crate::Router) at server start.
#[derive(Clone)]
pub struct Method {
    kind: MethodKind,
    input: Option<Arc<dyn Validator>>,
    output: Option<Arc<dyn Validator>>,
    resolver: Resolver,
}

impl Method {
    pub fn builder() -> MethodBuilder {
        MethodBuilder {
            input: None,
            output: None,
        }
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn input(&self) -> Option<&Arc<dyn Validator>> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&Arc<dyn Validator>> {
        self.output.as_ref()
    }

    pub fn resolve(&self, resolve: Resolve<'_>) -> Result<Value, SocketError> {
        (self.resolver)(resolve)
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("kind", &self.kind)
            .field("validates_input", &self.input.is_some())
            .field("validates_output", &self.output.is_some())
            .finish()
    }
}

/// Declares a method: validators first, call shape last.
pub struct MethodBuilder {
    input: Option<Arc<dyn Validator>>,
    output: Option<Arc<dyn Validator>>,
}

impl MethodBuilder {
    /// Validate inputs against `validator` before the resolver runs.
    pub fn input(mut self, validator: Arc<dyn Validator>) -> Self {
        self.input = Some(validator);
        self
    }

    /// Validate outputs against `validator` before they go on the wire.
    pub fn output(mut self, validator: Arc<dyn Validator>) -> Self {
        self.output = Some(validator);
        self
    }

    /// Finish as a transfer method.
    pub fn transfer(
        self,
        resolver: impl Fn(Resolve<'_>) -> Result<Value, SocketError> + Send + Sync + 'static,
    ) -> Method {
        self.finish(MethodKind::Transfer, Arc::new(resolver))
    }

    /// Finish as a receiver method. The server pulls; clients answer.
    pub fn receiver(self) -> Method {
        self.finish(MethodKind::Receiver, identity_resolver())
    }

    /// Finish as a subscription method without an event resolver.
    pub fn subscribe(self) -> Method {
        self.finish(MethodKind::Subscribe, identity_resolver())
    }

    /// Finish as a subscription method whose resolver also handles
    /// client-fired events on the same name.
    pub fn subscribe_with(
        self,
        resolver: impl Fn(Resolve<'_>) -> Result<Value, SocketError> + Send + Sync + 'static,
    ) -> Method {
        self.finish(MethodKind::Subscribe, Arc::new(resolver))
    }

    fn finish(self, kind: MethodKind, resolver: Resolver) -> Method {
        Method {
            kind,
            input: self.input,
            output: self.output,
            resolver,
        }
    }
}

fn identity_resolver() -> Resolver {
    Arc::new(|resolve| Ok(resolve.input))
}
