use acomms_c2_router::{AcousticConsole, InboundMessage, OperationHandle, RouterResult};
use acomms_core::{logging, ConsoleConfig};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;

mod commands;
mod udp;

use commands::OperatorCommand;
use udp::UdpTransport;

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;
const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = match parse_config_path(&args)? {
        Some(path) => ConsoleConfig::from_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConsoleConfig::default_config(),
    };
    logging::init_from_config(&config.logging);

    let socket = Arc::new(
        UdpSocket::bind(&config.network.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.network.listen_addr))?,
    );
    let transport = UdpTransport::new(socket.clone(), &config.network.relay_endpoints)?;
    let relays: Vec<String> = transport.relays().map(str::to_string).collect();

    let console = Arc::new(AcousticConsole::new(&config, Arc::new(transport)));
    let relay_service = vec![config.gateway.relay_service.clone()];
    for relay in &relays {
        // Relays become active once they are heard from.
        console.registry().observe(relay, Some(&relay_service), None);
    }
    console.on_operation_terminal(|report| {
        println!("[{}] {} {}: {}", report.operation_id, report.kind, report.state, report.reason);
    });
    console.on_known_systems_changed(|names| {
        println!("discovered: {}", names.join(", "));
    });
    console.start();

    tracing::info!(
        console = %config.network.console_name,
        listen = %config.network.listen_addr,
        relays = relays.len(),
        "acomms node started"
    );

    let receiver = tokio::spawn(receive_loop(socket, console.clone()));
    let operator = tokio::spawn(operator_loop(console.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");

    receiver.abort();
    operator.abort();
    console.shutdown().await;
    Ok(())
}

async fn receive_loop(socket: Arc<UdpSocket>, console: Arc<AcousticConsole>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(error = %e, "datagram receive failed");
                continue;
            }
        };
        match InboundMessage::decode(&buf[..len]) {
            Ok(message) => console.handle_inbound(message),
            Err(e) => tracing::warn!(%from, error = %e, "discarding malformed datagram"),
        }
    }
}

async fn operator_loop(console: Arc<AcousticConsole>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read operator input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match commands::parse(&line) {
            Ok(command) => run_command(&console, command).await,
            Err(e) => println!("error: {e}"),
        }
    }
}

async fn run_command(console: &AcousticConsole, command: OperatorCommand) {
    match command {
        OperatorCommand::Submit {
            target,
            via,
            command,
        } => {
            let mut session = console.session(target);
            if let Some(selector) = via {
                session = session.via(selector);
            }
            report_submit(console.submit_command(&session, &command));
        }
        OperatorCommand::Cancel(id) => {
            if console.cancel(id).is_none() {
                println!("{id} is not live");
            }
        }
        OperatorCommand::Refresh => {
            let relays = console.refresh_systems().await;
            println!("systems query sent to {relays} relay(s)");
        }
        OperatorCommand::Systems => {
            for system in console.known_systems() {
                let services: Vec<&str> =
                    system.declared_services.iter().map(String::as_str).collect();
                println!(
                    "{:<24} {:<8} {}",
                    system.name,
                    if system.is_active { "active" } else { "inactive" },
                    services.join(",")
                );
            }
        }
        OperatorCommand::Ranges => {
            for sample in console.ranges().samples() {
                println!(
                    "{} -> {}: {:.1} m",
                    sample.source_relay, sample.target, sample.distance_m
                );
            }
        }
        OperatorCommand::ClearRanges => console.ranges().clear(),
        OperatorCommand::Operations => {
            for op in console.live_operations() {
                println!("{} {} {} {}", op.id, op.kind, op.target, op.state);
            }
        }
    }
}

fn report_submit(result: RouterResult<OperationHandle>) {
    match result {
        Ok(handle) => println!("{} {} submitted", handle.id(), handle.kind()),
        Err(e) => println!("error: {e}"),
    }
}

fn parse_config_path(args: &[String]) -> Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            if let Some(path) = args_iter.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            bail!("--config was provided without a path");
        }
    }
    Ok(None)
}
