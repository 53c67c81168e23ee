//! rst-node: one process of the spanning tree protocol.
//!
//! Listens for neighbours on `host:port`, reads commands from stdin and runs
//! flooding and waves over TCP.

use anyhow::Result;
use clap::Parser;
use rst_core::{Inbound, NodeEvent};
use rst_node::cli::{self, Command};
use rst_node::{Listener, Node, NodeArgs, NodeConfig, TcpTransport};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Payload carried by Go messages started from the console.
const WAVE_DATA: &str = "wave";

#[tokio::main]
async fn main() -> Result<()> {
    let args = NodeArgs::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,rst_node=debug,rst_core=debug"
    } else {
        "info,rst_node=info,rst_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = NodeConfig::try_from(args)?;
    info!("Starting rst-node {}", config.id);
    info!("Neighbours: {:?}", config.neighbours);

    let listener = Listener::bind(&config.listen_addr()).await?;
    let transport = Arc::new(TcpTransport::new(config.host, config.connect_timeout));
    let node = Arc::new(Node::new(
        config.id.clone(),
        config.neighbours.clone(),
        config.value,
        transport,
    )?);

    let _completion = node.events().subscribe(|event| {
        if let NodeEvent::AggregationComplete { values } = event {
            println!(">> wave complete, {} value(s) collected", values.len());
        }
    });

    let watchdog = config.watchdog.clone().map(|wd| node.spawn_watchdog(wd));
    let (mut inbound_rx, accept_task) = listener.spawn();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    info!("Node running. Type 'help' for commands, Ctrl+C to stop.");

    loop {
        tokio::select! {
            Some(inbound) = inbound_rx.recv() => {
                node.handle(inbound).await;
            }

            line = stdin.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if !run_command(&node, &line).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        // Detached from a terminal: keep serving neighbours
                        debug!("stdin closed, running without console");
                        stdin_closed(&node, &mut inbound_rx).await;
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read command: {}", e);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    accept_task.abort();
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    info!("Shutting down node {}", config.id);
    Ok(())
}

/// Run one console command. Returns false when the node should stop.
async fn run_command(node: &Arc<Node<TcpTransport>>, line: &str) -> bool {
    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            println!(">> {e}");
            return true;
        }
    };

    match command {
        Command::Flood => {
            let report = node.flood().await;
            println!(">> flooding started ({} sent, {} failed)", report.sent, report.failed);
        }
        Command::Start => {
            let report = node.start_wave(WAVE_DATA).await;
            println!(">> wave started ({} sent, {} failed)", report.sent, report.failed);
        }
        Command::Ping(peer) => {
            let report = node.ping(&peer).await;
            if report.failed > 0 {
                println!(">> ping to {peer} failed");
            } else {
                println!(">> pinged {peer}");
            }
        }
        Command::Show(field) => {
            let state = node.state().await;
            println!(">> {}", cli::render(field, &state));
        }
        Command::Help => println!("{}", cli::HELP),
        Command::Exit => {
            println!(">> shutting down node {}", node.id());
            return false;
        }
    }
    true
}

/// Serve neighbours until interrupted once the console is gone.
async fn stdin_closed(
    node: &Arc<Node<TcpTransport>>,
    inbound_rx: &mut tokio::sync::mpsc::UnboundedReceiver<Inbound>,
) {
    loop {
        tokio::select! {
            Some(inbound) = inbound_rx.recv() => {
                node.handle(inbound).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return;
            }
        }
    }
}
