use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use utrpc_client::{Client, ClientOptions};
use utrpc_schema::JsonSchema;
use utrpc_socket::{MemoryHub, SessionSocket};
use utrpc_server::{DispatcherConfig, Method, Router, ServerDispatcher};

use crate::cmd::DemoArgs;
use crate::exit::{client_error, server_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_envelope, OutputFormat};

pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let hub = MemoryHub::new();
    let dispatcher = ServerDispatcher::with_config(
        demo_router()?,
        DispatcherConfig::default()
            .with_validation(!args.skip_validation)
            .with_pull_timeout(Duration::from_secs(2)),
    );
    dispatcher.start(Arc::new(hub.clone()));
    let connections = serve(&hub, &dispatcher);

    let client = Client::connect(
        ClientOptions::new(Arc::new(hub.connector())).with_request_timeout(Duration::from_secs(2)),
    );
    // Print every inbound envelope as it arrives.
    client.connection().lifecycle().on("message", move |event| {
        if let utrpc_client::Lifecycle::Message(envelope) = event {
            print_envelope("recv", envelope, format);
        }
    });
    let responder = client.on_request("getClientName", |_| Ok(json!({"name": "demo-client"})));

    let (lobby_tx, lobby_rx) = mpsc::channel();
    let subscription = client.subscribe(
        "lobby",
        "123",
        move |data| {
            let _ = lobby_tx.send(data);
        },
        |error| tracing::warn!(%error, "lobby subscription error"),
    );

    let connection_id = connections
        .recv_timeout(Duration::from_secs(2))
        .map_err(|_| CliError::new(INTERNAL, "demo server saw no connection"))?;

    for seq in 0..args.calls {
        let result = client
            .request("echo", json!({"seq": seq}))
            .map_err(|err| client_error("echo call failed", err))?;
        println!("echo({seq}) -> {result}");
    }

    let receiver = dispatcher
        .receiver("getClientName")
        .ok_or_else(|| CliError::new(INTERNAL, "getClientName is not a receiver method"))?;
    let pulled = receiver
        .pull(&connection_id, json!({"id": 1}))
        .map_err(|err| server_error("pull failed", err))?;
    println!("server pulled client name: {pulled:?}");

    let subscriber = dispatcher
        .subscriber("lobby")
        .ok_or_else(|| CliError::new(INTERNAL, "lobby is not a subscription method"))?;
    subscriber.send_to("123", json!({"m": "welcome to lobby 123"}));

    let update = lobby_rx
        .recv_timeout(Duration::from_secs(2))
        .map_err(|_| CliError::new(INTERNAL, "lobby update never arrived"))?;
    println!("lobby update: {update}");

    subscription.unsubscribe();
    responder.unsubscribe();
    client.close();

    Ok(SUCCESS)
}

fn demo_router() -> CliResult<Router> {
    let echo_in = JsonSchema::parse(
        r#"{"type": "object", "properties": {"seq": {"type": "integer"}}, "required": ["seq"]}"#,
    )
    .map_err(|err| CliError::new(INTERNAL, format!("schema compile failed: {err}")))?;
    let name_out = JsonSchema::parse(
        r#"{"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]}"#,
    )
    .map_err(|err| CliError::new(INTERNAL, format!("schema compile failed: {err}")))?;

    Ok(Router::builder()
        .method(
            "echo",
            Method::builder().input(Arc::new(echo_in)).transfer(|r| Ok(r.input)),
        )
        .method(
            "getClientName",
            Method::builder().output(Arc::new(name_out)).receiver(),
        )
        .method(
            "lobby",
            Method::builder().subscribe_with(|r| {
                tracing::info!(input = %r.input, "lobby event");
                Ok(r.input)
            }),
        )
        .build())
}

/// Host glue: accept loopback connections and drive the dispatcher.
/// Returns the ids of connections as they open.
fn serve(hub: &MemoryHub, dispatcher: &ServerDispatcher) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    let hub = hub.clone();
    let dispatcher = dispatcher.clone();

    std::thread::spawn(move || {
        while let Ok(session) = hub.accept() {
            let dispatcher = dispatcher.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                let socket: Arc<dyn SessionSocket> = Arc::clone(&session);
                let id = dispatcher.open(Arc::clone(&socket));
                let _ = tx.send(id);
                loop {
                    match session.recv() {
                        Ok(raw) => dispatcher.message(&socket, &raw),
                        Err(_) => break,
                    }
                }
                dispatcher.close(&socket);
            });
        }
    });

    rx
}
