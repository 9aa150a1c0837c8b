use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use utrpc_socket::{Publisher, SessionSocket};
use utrpc_wire::{
    event_name, Envelope, JsonTransformer, RequestRegistry, SocketError, Transformer, Validator,
    ACTION_EVENT, ACTION_SUBSCRIPTION_START, ACTION_SUBSCRIPTION_STOP,
};

use crate::handles::{Receiver, Sender, Subscriber};
use crate::method::{Method, MethodKind, Resolve};
use crate::router::Router;

type SessionIdFn = Arc<dyn Fn(&Arc<dyn SessionSocket>) -> String + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&SocketError) + Send + Sync>;

/// Configuration for a [`ServerDispatcher`].
#[derive(Clone)]
pub struct DispatcherConfig {
    /// Global validation gate. When false every validator passes,
    /// for trusted or performance-sensitive deployments.
    pub validate: bool,
    /// Default timeout for server-initiated pulls.
    pub pull_timeout: Duration,
    /// Wire codec shared with the connected clients.
    pub transformer: Arc<dyn Transformer>,
    /// Maps a live socket to its connection id.
    pub session_id: SessionIdFn,
    /// Observer invoked for every error reply before it is sent.
    pub on_error: Option<ErrorObserver>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            validate: true,
            pull_timeout: Duration::from_secs(5),
            transformer: Arc::new(JsonTransformer),
            session_id: Arc::new(|session| session.id().to_string()),
            on_error: None,
        }
    }
}

impl DispatcherConfig {
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_session_id(
        mut self,
        session_id: impl Fn(&Arc<dyn SessionSocket>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.session_id = Arc::new(session_id);
        self
    }

    pub fn with_error_observer(
        mut self,
        on_error: impl Fn(&SocketError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }
}

impl std::fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("validate", &self.validate)
            .field("pull_timeout", &self.pull_timeout)
            .finish_non_exhaustive()
    }
}

pub(crate) struct DispatcherInner {
    pub(crate) router: Router,
    pub(crate) config: DispatcherConfig,
    pub(crate) sessions: Mutex<HashMap<String, Arc<dyn SessionSocket>>>,
    pub(crate) pulls: RequestRegistry,
    pub(crate) publisher: Mutex<Option<Arc<dyn Publisher>>>,
}

/// Per-connection inbound routing: validate, resolve the method, execute
/// the action, reply.
///
/// The host socket server drives the dispatcher through [`open`],
/// [`message`], and [`close`]; the dispatcher drives clients back through
/// the session sockets and the attached [`Publisher`].
///
/// [`open`]: ServerDispatcher::open
/// [`message`]: ServerDispatcher::message
/// [`close`]: ServerDispatcher::close
#[derive(Clone)]
pub struct ServerDispatcher {
    inner: Arc<DispatcherInner>,
}

impl ServerDispatcher {
    pub fn new(router: Router) -> Self {
        Self::with_config(router, DispatcherConfig::default())
    }

    pub fn with_config(router: Router, config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                router,
                config,
                sessions: Mutex::new(HashMap::new()),
                pulls: RequestRegistry::new(),
                publisher: Mutex::new(None),
            }),
        }
    }

    /// Attach the host's topic fan-out. Broadcasts before this are skipped.
    pub fn start(&self, publisher: Arc<dyn Publisher>) {
        *lock(&self.inner.publisher) = Some(publisher);
    }

    /// Index a newly opened connection. Returns its assigned id; an id
    /// already indexed keeps its existing socket.
    pub fn open(&self, session: Arc<dyn SessionSocket>) -> String {
        let id = (self.inner.config.session_id)(&session);
        let mut sessions = lock(&self.inner.sessions);
        if !sessions.contains_key(&id) {
            sessions.insert(id.clone(), session);
            tracing::debug!(%id, "session open");
        }
        id
    }

    /// Remove a closed connection from the index.
    ///
    /// Disconnect is otherwise a no-op: pulls already in flight toward this
    /// id are left to time out, and a reconnecting client arrives under a
    /// new id.
    pub fn close(&self, session: &Arc<dyn SessionSocket>) {
        let id = (self.inner.config.session_id)(session);
        lock(&self.inner.sessions).remove(&id);
        tracing::debug!(%id, "session closed");
    }

    /// Route one raw inbound frame from `session`.
    pub fn message(&self, session: &Arc<dyn SessionSocket>, raw: &[u8]) {
        let envelopes = match self.inner.config.transformer.deserialize(raw) {
            Ok(envelopes) => envelopes,
            Err(err) => {
                // The socket may carry foreign traffic.
                tracing::trace!(%err, "discarding undecodable frame");
                return;
            }
        };

        for envelope in envelopes {
            self.inner.handle(session, envelope);
        }
    }

    /// Look up a live session by connection id.
    pub fn session(&self, id: &str) -> Option<Arc<dyn SessionSocket>> {
        lock(&self.inner.sessions).get(id).cloned()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Broadcast handle for a transfer method's push channel.
    pub fn sender(&self, method: &str) -> Option<Sender> {
        let descriptor = self.inner.router.get(method)?;
        (descriptor.kind() == MethodKind::Transfer)
            .then(|| Sender::new(Arc::clone(&self.inner), method))
    }

    /// Pull handle for a receiver method.
    pub fn receiver(&self, method: &str) -> Option<Receiver> {
        let descriptor = self.inner.router.get(method)?;
        (descriptor.kind() == MethodKind::Receiver)
            .then(|| Receiver::new(Arc::clone(&self.inner), method))
    }

    /// Broadcast handle for a subscription method.
    pub fn subscriber(&self, method: &str) -> Option<Subscriber> {
        let descriptor = self.inner.router.get(method)?;
        (descriptor.kind() == MethodKind::Subscribe)
            .then(|| Subscriber::new(Arc::clone(&self.inner), method))
    }
}

impl std::fmt::Debug for ServerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDispatcher")
            .field("methods", &self.inner.router.len())
            .field("sessions", &self.session_count())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DispatcherInner {
    /// Apply the routing rules to one envelope. First matching rule wins.
    fn handle(&self, session: &Arc<dyn SessionSocket>, envelope: Envelope) {
        if !envelope.is_protocol() {
            return;
        }

        let id = envelope.id.clone();
        if id.is_empty() {
            self.send_reply(
                session,
                Envelope::reply_error("", SocketError::bad_request("\"id\" is required")),
            );
            return;
        }

        let Some(method) = self.router.get(&envelope.method) else {
            self.send_reply(
                session,
                Envelope::reply_error(&id, SocketError::not_found(&envelope.method)),
            );
            return;
        };

        let action = envelope.action.as_deref().unwrap_or("");
        let data = envelope.data.clone().unwrap_or(Value::Null);

        if action == ACTION_EVENT {
            // Fire-and-forget: resolver errors have no feedback channel.
            if let Err(err) = method.resolve(Resolve {
                session,
                input: data,
            }) {
                tracing::debug!(method = %envelope.method, %err, "event resolver failed");
            }
            return;
        }

        if action == ACTION_SUBSCRIPTION_STOP {
            if !self.check(method.input(), &data) {
                self.send_reply(
                    session,
                    Envelope::reply_error(
                        &id,
                        SocketError::parse_error("input did not match expected shape"),
                    ),
                );
                return;
            }
            let topic = event_name(&envelope.method, data.as_str().unwrap_or(""));
            if session.is_subscribed(&topic) {
                session.unsubscribe(&topic);
            }
            return;
        }

        if action == ACTION_SUBSCRIPTION_START {
            if !self.check(method.input(), &data) {
                self.send_reply(
                    session,
                    Envelope::reply_error(
                        &id,
                        SocketError::parse_error("input did not match expected shape"),
                    ),
                );
                return;
            }
            let topic = event_name(&envelope.method, data.as_str().unwrap_or(""));
            if !session.is_subscribed(&topic) {
                session.subscribe(&topic);
            }
            return;
        }

        match method.kind() {
            MethodKind::Transfer => self.handle_transfer(session, method, &envelope, data),
            MethodKind::Receiver => self.handle_receiver_reply(session, method, &envelope, data),
            MethodKind::Subscribe => {
                self.send_reply(
                    session,
                    Envelope::reply_error(&id, SocketError::internal_server("unknown")),
                );
            }
        }
    }

    fn handle_transfer(
        &self,
        session: &Arc<dyn SessionSocket>,
        method: &Method,
        envelope: &Envelope,
        data: Value,
    ) {
        let id = &envelope.id;
        if !self.check(method.input(), &data) {
            self.send_reply(
                session,
                Envelope::reply_error(
                    id,
                    SocketError::parse_error("input did not match expected shape"),
                ),
            );
            return;
        }

        let result = match method.resolve(Resolve {
            session,
            input: data,
        }) {
            Ok(result) => result,
            Err(err) => {
                self.send_reply(
                    session,
                    Envelope::reply_error(id, SocketError::internal(err.message)),
                );
                return;
            }
        };

        if !self.check(method.output(), &result) {
            self.send_reply(
                session,
                Envelope::reply_error(
                    id,
                    SocketError::parse_error("output did not match expected shape"),
                ),
            );
            return;
        }

        self.send_reply(session, Envelope::reply(id, result));
    }

    /// An inbound receiver-action envelope is itself the reply to a
    /// server-initiated pull.
    fn handle_receiver_reply(
        &self,
        session: &Arc<dyn SessionSocket>,
        method: &Method,
        envelope: &Envelope,
        data: Value,
    ) {
        let id = &envelope.id;

        if let Some(error) = envelope.error.clone() {
            // The client handler failed; its error settles the pull.
            self.pulls.reject(id, error);
            return;
        }

        if !self.check(method.output(), &data) {
            let error = SocketError::parse_error("output did not match expected shape");
            self.pulls.reject(id, error.clone());
            // Forward the failure to the answering client as well.
            let mut reply = Envelope::reply_error(id, error);
            reply.method = envelope.method.clone();
            self.send_reply(session, reply);
            return;
        }

        // Nothing to send back: the exchange was server-initiated.
        self.pulls.resolve(id, data);
    }

    fn check(&self, validator: Option<&Arc<dyn Validator>>, value: &Value) -> bool {
        if !self.config.validate {
            return true;
        }
        match validator {
            Some(validator) => validator.validate(value).is_ok(),
            None => true,
        }
    }

    pub(crate) fn send_reply(&self, session: &Arc<dyn SessionSocket>, envelope: Envelope) {
        if let (Some(on_error), Some(error)) = (&self.config.on_error, &envelope.error) {
            on_error(error);
        }

        match self.config.transformer.serialize(std::slice::from_ref(&envelope)) {
            Ok(raw) => {
                if let Err(err) = session.send(raw) {
                    tracing::warn!(%err, "reply dropped");
                }
            }
            Err(err) => tracing::warn!(%err, "reply not serializable"),
        }
    }

    /// Publish a broadcast envelope to `(method, topic)`.
    pub(crate) fn publish(&self, method: &str, topic: &str, data: Value) {
        let publisher = lock(&self.publisher).clone();
        let Some(publisher) = publisher else {
            tracing::debug!(method, "broadcast skipped, no publisher attached");
            return;
        };

        let envelope = if topic.is_empty() {
            Envelope::publish(method, data)
        } else {
            Envelope::publish_to(method, topic, data)
        };

        match self.config.transformer.serialize(std::slice::from_ref(&envelope)) {
            Ok(raw) => publisher.publish(&event_name(method, topic), raw),
            Err(err) => tracing::warn!(method, %err, "broadcast not serializable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use serde_json::json;
    use utrpc_schema::JsonSchema;
    use utrpc_socket::{ClientSocket, Connector, MemoryHub};
    use utrpc_wire::{ACTION_RESPONDER, CODE_TIMEOUT};

    use crate::ServerError;

    use super::*;
    use crate::method::Method;

    fn demo_router(event_hits: Arc<AtomicUsize>) -> Router {
        let out_schema = JsonSchema::parse(
            r#"{"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]}"#,
        )
        .unwrap();
        let topic_schema = JsonSchema::parse(r#"{"type": "string"}"#).unwrap();

        Router::builder()
            .method("echo", Method::builder().transfer(|r| Ok(r.input)))
            .method(
                "boom",
                Method::builder().transfer(|_| Err(SocketError::new("ANY", "resolver blew up"))),
            )
            .method(
                "strictOut",
                Method::builder()
                    .output(Arc::new(JsonSchema::parse(r#"{"type": "integer"}"#).unwrap()))
                    .transfer(|_| Ok(json!("not an integer"))),
            )
            .method(
                "strictIn",
                Method::builder()
                    .input(Arc::new(JsonSchema::parse(r#"{"type": "integer"}"#).unwrap()))
                    .transfer(|r| Ok(r.input)),
            )
            .method(
                "getClientName",
                Method::builder().output(Arc::new(out_schema)).receiver(),
            )
            .method(
                "lobby",
                Method::builder()
                    .input(Arc::new(topic_schema))
                    .subscribe_with(move |r| {
                        event_hits.fetch_add(1, Ordering::SeqCst);
                        Ok(r.input)
                    }),
            )
            .build()
    }

    struct Fixture {
        hub: MemoryHub,
        dispatcher: ServerDispatcher,
        event_hits: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(DispatcherConfig::default())
        }

        fn with_config(config: DispatcherConfig) -> Self {
            let event_hits = Arc::new(AtomicUsize::new(0));
            let hub = MemoryHub::new();
            let dispatcher =
                ServerDispatcher::with_config(demo_router(Arc::clone(&event_hits)), config);
            dispatcher.start(Arc::new(hub.clone()));
            Self {
                hub,
                dispatcher,
                event_hits,
            }
        }

        fn connect(&self) -> (Arc<dyn ClientSocket>, Arc<dyn SessionSocket>, String) {
            let client = self.hub.connector().connect().unwrap();
            let session: Arc<dyn SessionSocket> = self
                .hub
                .accept_timeout(Duration::from_secs(1))
                .unwrap();
            let id = self.dispatcher.open(Arc::clone(&session));
            (client, session, id)
        }
    }

    fn encode(envelope: &Envelope) -> Vec<u8> {
        JsonTransformer
            .serialize(std::slice::from_ref(envelope))
            .unwrap()
            .to_vec()
    }

    fn recv_one(client: &Arc<dyn ClientSocket>) -> Envelope {
        let raw = client.recv().unwrap();
        let mut batch = JsonTransformer.deserialize(&raw).unwrap();
        assert_eq!(batch.len(), 1);
        batch.remove(0)
    }

    #[test]
    fn discriminator_mismatch_is_ignored_before_all_other_rules() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        let mut foreign = Envelope::reply_error("", SocketError::internal("x"));
        foreign.msg_type = "OTHER".to_string();
        fx.dispatcher.message(&session, &encode(&foreign));

        // Next envelope is genuine and produces the first reply.
        let mut probe = Envelope::publish("ignored", json!(null));
        probe.id = String::new();
        fx.dispatcher.message(&session, &encode(&probe));

        let reply = recv_one(&client);
        assert_eq!(reply.error.unwrap().code, "BAD_REQUEST");
    }

    #[test]
    fn empty_id_gets_bad_request() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        let mut envelope = Envelope::request("echo", json!(1));
        envelope.id = String::new();
        fx.dispatcher.message(&session, &encode(&envelope));

        let reply = recv_one(&client);
        let error = reply.error.unwrap();
        assert_eq!(error.code, "BAD_REQUEST");
        assert_eq!(error.message, "\"id\" is required");
        assert!(reply.id.is_empty());
    }

    #[test]
    fn unknown_method_gets_not_found_under_original_id() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        let envelope = Envelope::request("ghost", json!(null));
        let id = envelope.id.clone();
        fx.dispatcher.message(&session, &encode(&envelope));

        let reply = recv_one(&client);
        assert_eq!(reply.id, id);
        assert_eq!(reply.error.unwrap().code, "NOT_FOUND");
    }

    #[test]
    fn event_invokes_resolver_without_reply() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        fx.dispatcher
            .message(&session, &encode(&Envelope::event("lobby", json!("hello"))));
        assert_eq!(fx.event_hits.load(Ordering::SeqCst), 1);

        // No reply was queued: the next reply belongs to the echo below.
        let echo = Envelope::request("echo", json!(7));
        let echo_id = echo.id.clone();
        fx.dispatcher.message(&session, &encode(&echo));
        let reply = recv_one(&client);
        assert_eq!(reply.id, echo_id);
        assert_eq!(reply.data, Some(json!(7)));
    }

    #[test]
    fn event_resolver_errors_are_not_surfaced() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        // boom's resolver fails; fired as an event nothing comes back.
        fx.dispatcher
            .message(&session, &encode(&Envelope::event("boom", json!(null))));

        let echo = Envelope::request("echo", json!("after"));
        let echo_id = echo.id.clone();
        fx.dispatcher.message(&session, &encode(&echo));
        assert_eq!(recv_one(&client).id, echo_id);
    }

    #[test]
    fn sub_start_subscribes_idempotently() {
        let fx = Fixture::new();
        let (_client, session, _) = fx.connect();

        fx.dispatcher
            .message(&session, &encode(&Envelope::sub_start("lobby", "123")));
        fx.dispatcher
            .message(&session, &encode(&Envelope::sub_start("lobby", "123")));

        assert!(session.is_subscribed("lobby:123"));
        assert!(!session.is_subscribed("lobby"));
    }

    #[test]
    fn sub_stop_unsubscribes_and_is_idempotent() {
        let fx = Fixture::new();
        let (_client, session, _) = fx.connect();

        // Stopping a never-started subscription is a no-op, not an error.
        fx.dispatcher
            .message(&session, &encode(&Envelope::sub_stop("lobby", "123")));

        fx.dispatcher
            .message(&session, &encode(&Envelope::sub_start("lobby", "123")));
        fx.dispatcher
            .message(&session, &encode(&Envelope::sub_stop("lobby", "123")));
        assert!(!session.is_subscribed("lobby:123"));
    }

    #[test]
    fn sub_start_validation_failure_replies_parse_error() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        // lobby's input validator wants a string topic.
        let mut envelope = Envelope::sub_start("lobby", "");
        envelope.data = Some(json!(42));
        let id = envelope.id.clone();
        fx.dispatcher.message(&session, &encode(&envelope));

        let reply = recv_one(&client);
        assert_eq!(reply.id, id);
        assert_eq!(reply.error.unwrap().code, "PARSE_ERROR");
        assert!(!session.is_subscribed("lobby"));
    }

    #[test]
    fn transfer_echoes_validated_data() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        let envelope = Envelope::request("echo", json!({"x": 1}));
        let id = envelope.id.clone();
        fx.dispatcher.message(&session, &encode(&envelope));

        let reply = recv_one(&client);
        assert_eq!(reply.id, id);
        assert_eq!(reply.data, Some(json!({"x": 1})));
        assert!(reply.error.is_none());
    }

    #[test]
    fn transfer_input_validation_failure() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        let envelope = Envelope::request("strictIn", json!("not an integer"));
        fx.dispatcher.message(&session, &encode(&envelope));

        let error = recv_one(&client).error.unwrap();
        assert_eq!(error.code, "PARSE_ERROR");
        assert_eq!(error.message, "input did not match expected shape");
    }

    #[test]
    fn transfer_output_validation_failure() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        let envelope = Envelope::request("strictOut", json!(null));
        fx.dispatcher.message(&session, &encode(&envelope));

        let error = recv_one(&client).error.unwrap();
        assert_eq!(error.code, "PARSE_ERROR");
        assert_eq!(error.message, "output did not match expected shape");
    }

    #[test]
    fn transfer_resolver_error_becomes_internal_error_reply() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        let envelope = Envelope::request("boom", json!(null));
        let id = envelope.id.clone();
        fx.dispatcher.message(&session, &encode(&envelope));

        let reply = recv_one(&client);
        assert_eq!(reply.id, id);
        let error = reply.error.unwrap();
        assert_eq!(error.code, "INTERNAL_ERROR");
        assert_eq!(error.message, "resolver blew up");
    }

    #[test]
    fn unroutable_action_gets_internal_server_error() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        // A request-shaped call against a subscription method matches no rule.
        let envelope = Envelope::request("lobby", json!("123"));
        fx.dispatcher.message(&session, &encode(&envelope));

        let error = recv_one(&client).error.unwrap();
        assert_eq!(error.code, "INTERNAL_SERVER_ERROR");
    }

    #[test]
    fn disabled_validation_passes_everything() {
        let fx = Fixture::with_config(DispatcherConfig::default().with_validation(false));
        let (client, session, _) = fx.connect();

        let envelope = Envelope::request("strictIn", json!("not an integer"));
        fx.dispatcher.message(&session, &encode(&envelope));

        let reply = recv_one(&client);
        assert!(reply.error.is_none());
        assert_eq!(reply.data, Some(json!("not an integer")));
    }

    #[test]
    fn error_observer_sees_error_replies() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let fx = Fixture::with_config(DispatcherConfig::default().with_error_observer(
            move |error: &SocketError| {
                sink.lock().unwrap().push(error.code.clone());
            },
        ));
        let (client, session, _) = fx.connect();

        fx.dispatcher
            .message(&session, &encode(&Envelope::request("ghost", json!(null))));
        recv_one(&client);

        assert_eq!(*observed.lock().unwrap(), vec!["NOT_FOUND".to_string()]);
    }

    #[test]
    fn pull_to_absent_connection_returns_none() {
        let fx = Fixture::new();
        let receiver = fx.dispatcher.receiver("getClientName").unwrap();

        let result = receiver.pull("no-such-conn", json!({"id": 1})).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn pull_resolves_with_client_answer() {
        let fx = Fixture::new();
        let (client, session, id) = fx.connect();

        // Client side: answer the pull with a valid payload.
        let dispatcher = fx.dispatcher.clone();
        let answering_session = Arc::clone(&session);
        let answerer = thread::spawn(move || {
            let pull = recv_one(&client);
            assert_eq!(pull.method, "getClientName");
            assert_eq!(pull.data, Some(json!({"id": 123})));

            let reply = Envelope::responder(&pull.id, "getClientName", json!({"name": "joe"}));
            assert_eq!(reply.action.as_deref(), Some(ACTION_RESPONDER));
            dispatcher.message(&answering_session, &encode(&reply));
        });

        let receiver = fx.dispatcher.receiver("getClientName").unwrap();
        let result = receiver.pull(&id, json!({"id": 123})).unwrap();
        assert_eq!(result, Some(json!({"name": "joe"})));
        answerer.join().unwrap();
    }

    #[test]
    fn pull_times_out_when_nobody_answers() {
        let fx = Fixture::new();
        let (_client, _session, id) = fx.connect();

        let receiver = fx.dispatcher.receiver("getClientName").unwrap();
        let timeout = Duration::from_millis(60);
        let start = std::time::Instant::now();
        let err = receiver
            .pull_with_timeout(&id, json!({"id": 1}), timeout)
            .unwrap_err();

        match err {
            ServerError::Call(error) => assert_eq!(error.code, CODE_TIMEOUT),
            other => panic!("expected call error, got {other:?}"),
        }
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn pull_rejected_by_responder_error() {
        let fx = Fixture::new();
        let (client, session, id) = fx.connect();

        let dispatcher = fx.dispatcher.clone();
        let answering_session = Arc::clone(&session);
        let answerer = thread::spawn(move || {
            let pull = recv_one(&client);
            let reply = Envelope::responder_error(
                &pull.id,
                "getClientName",
                SocketError::internal("handler raised"),
            );
            dispatcher.message(&answering_session, &encode(&reply));
        });

        let receiver = fx.dispatcher.receiver("getClientName").unwrap();
        let err = receiver.pull(&id, json!({"id": 1})).unwrap_err();
        match err {
            ServerError::Call(error) => {
                assert_eq!(error.code, "INTERNAL_ERROR");
                assert_eq!(error.message, "handler raised");
            }
            other => panic!("expected call error, got {other:?}"),
        }
        answerer.join().unwrap();
    }

    #[test]
    fn pull_output_validation_failure_rejects_and_forwards() {
        let fx = Fixture::new();
        let (client, session, id) = fx.connect();

        let dispatcher = fx.dispatcher.clone();
        let answering_session = Arc::clone(&session);
        let answerer = thread::spawn(move || {
            let pull = recv_one(&client);
            // {"name": 42} violates the output schema.
            let reply = Envelope::responder(&pull.id, "getClientName", json!({"name": 42}));
            dispatcher.message(&answering_session, &encode(&reply));

            // The client is told about the failure too.
            let forwarded = recv_one(&client);
            assert_eq!(forwarded.id, pull.id);
            assert_eq!(forwarded.error.unwrap().code, "PARSE_ERROR");
        });

        let receiver = fx.dispatcher.receiver("getClientName").unwrap();
        let err = receiver.pull(&id, json!({"id": 1})).unwrap_err();
        match err {
            ServerError::Call(error) => assert_eq!(error.code, "PARSE_ERROR"),
            other => panic!("expected call error, got {other:?}"),
        }
        answerer.join().unwrap();
    }

    #[test]
    fn closed_session_pulls_return_none() {
        let fx = Fixture::new();
        let (_client, session, id) = fx.connect();

        fx.dispatcher.close(&session);

        let receiver = fx.dispatcher.receiver("getClientName").unwrap();
        assert!(receiver.pull(&id, json!(null)).unwrap().is_none());
        assert_eq!(fx.dispatcher.session_count(), 0);
    }

    #[test]
    fn broadcast_reaches_default_and_qualified_topics_separately() {
        let fx = Fixture::new();
        let (client_a, session_a, _) = fx.connect();
        let (client_b, session_b, _) = fx.connect();

        // A subscribes to lobby:123, B to the default lobby channel.
        fx.dispatcher
            .message(&session_a, &encode(&Envelope::sub_start("lobby", "123")));
        fx.dispatcher
            .message(&session_b, &encode(&Envelope::sub_start("lobby", "")));

        let subscriber = fx.dispatcher.subscriber("lobby").unwrap();
        subscriber.send_to("123", json!({"m": "hi"}));

        let to_a = recv_one(&client_a);
        assert_eq!(to_a.method, "lobby");
        assert_eq!(to_a.action.as_deref(), Some("123"));
        assert_eq!(to_a.data, Some(json!({"m": "hi"})));

        // B gets nothing from the qualified publish; the default-channel
        // broadcast below is its first delivery.
        subscriber.send(json!({"m": "all"}));
        let to_b = recv_one(&client_b);
        assert_eq!(to_b.action, None);
        assert_eq!(to_b.data, Some(json!({"m": "all"})));
    }

    #[test]
    fn handles_are_kind_gated() {
        let fx = Fixture::new();

        assert!(fx.dispatcher.sender("echo").is_some());
        assert!(fx.dispatcher.sender("lobby").is_none());
        assert!(fx.dispatcher.subscriber("lobby").is_some());
        assert!(fx.dispatcher.subscriber("echo").is_none());
        assert!(fx.dispatcher.receiver("getClientName").is_some());
        assert!(fx.dispatcher.receiver("echo").is_none());
        assert!(fx.dispatcher.sender("ghost").is_none());
    }

    #[test]
    fn reopening_same_id_keeps_existing_socket() {
        let fx = Fixture::new();
        let (_client, session, id) = fx.connect();

        let reopened = fx.dispatcher.open(Arc::clone(&session));
        assert_eq!(reopened, id);
        assert_eq!(fx.dispatcher.session_count(), 1);
    }

    #[test]
    fn batched_inbound_envelopes_are_handled_in_order() {
        let fx = Fixture::new();
        let (client, session, _) = fx.connect();

        let first = Envelope::request("echo", json!(1));
        let second = Envelope::request("echo", json!(2));
        let ids = (first.id.clone(), second.id.clone());
        let raw = JsonTransformer.serialize(&[first, second]).unwrap();
        fx.dispatcher.message(&session, &raw);

        assert_eq!(recv_one(&client).id, ids.0);
        assert_eq!(recv_one(&client).id, ids.1);
    }
}
