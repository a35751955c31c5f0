#![deny(unsafe_code)]

use std::{process, time::Duration};

use structopt::StructOpt;

use directmq::conf::{Options, PeerAddr, Settings};
use directmq::logger::{config_logger, logger_init};
use directmq::net::{connect_tcp, connect_ws, Listener, WsMode};
use directmq::{LogDiagnostics, NetworkNode, NetworkNodeConfig, ProtocolCodec, Result};

mod agent;

#[tokio::main]
async fn main() {
    //init config
    let settings = Settings::init(Options::from_args()).expect("settings init failed");

    //init log
    let mut target = settings.log.effective_target();
    if settings.opts.agent {
        target = target.without_console();
    }
    let logger = config_logger(settings.log.file.clone(), target, settings.log.level);
    logger_init(logger, settings.log.level).expect("logger init failed");

    let _ = Settings::logs();

    let res = if settings.opts.agent { agent::run().await } else { run(settings).await };
    if let Err(e) = res {
        log::error!("directmqd failed: {e:?}");
        tokio::time::sleep(Duration::from_millis(100)).await;
        process::exit(1);
    }
}

async fn run(settings: &'static Settings) -> Result<()> {
    let node = NetworkNode::new(NetworkNodeConfig::from(settings), ProtocolCodec::new(settings.node.format))?;
    node.set_diagnostics(LogDiagnostics);
    let max_frame_length = settings.node.max_frame_length();

    //tcp
    if let Some(listen_cfg) = &settings.listeners.tcp {
        let listener = listen_cfg.builder("tcp", max_frame_length).bind()?;
        tokio::spawn(listen(node.clone(), listener, None));
    }

    //websocket
    if let Some(listen_cfg) = &settings.listeners.ws {
        let mode = if listen_cfg.text { WsMode::Text } else { WsMode::Binary };
        let listener = listen_cfg.builder("websocket", max_frame_length).bind()?;
        tokio::spawn(listen(node.clone(), listener, Some(mode)));
    }

    //peers
    for peer in settings.peers.iter() {
        tokio::spawn(dial(node.clone(), peer.clone(), max_frame_length, settings.peer_reconnect_interval));
    }

    tokio::signal::ctrl_c().await?;
    node.close_node("Node shutdown");
    tokio::time::sleep(Duration::from_secs(1)).await;
    Ok(())
}

/// Accepts neighbors until the process ends, `ws` selects a WebSocket upgrade.
pub(crate) async fn listen(node: NetworkNode, listener: Listener, ws: Option<WsMode>) {
    loop {
        let acceptor = match listener.accept().await {
            Ok(a) => a,
            Err(e) => {
                log::warn!("{} accept error, {e}", listener.cfg.name);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        let remote_addr = acceptor.remote_addr;
        log::debug!("{} accepted {remote_addr}", listener.cfg.name);
        match ws {
            None => {
                node.add_listening_edge(acceptor.tcp());
            }
            Some(mode) => {
                let node = node.clone();
                tokio::spawn(async move {
                    match acceptor.ws(mode).await {
                        Ok(portal) => {
                            node.add_listening_edge(portal);
                        }
                        Err(e) => log::warn!("websocket handshake with {remote_addr} failed, {e}"),
                    }
                });
            }
        }
    }
}

/// Keeps a connection to `peer`, redialing after `reconnect_interval` unless it is zero.
async fn dial(node: NetworkNode, peer: PeerAddr, max_frame_length: usize, reconnect_interval: Duration) {
    loop {
        let edge = match &peer {
            PeerAddr::Tcp(addr) => connect_tcp(addr.as_str(), max_frame_length).await.map(|p| node.add_connecting_edge(p)),
            PeerAddr::Ws(url) => connect_ws(url, WsMode::Binary).await.map(|p| node.add_connecting_edge(p)),
        };
        match edge {
            Ok(id) => {
                log::info!("connected to peer {peer}, edge {id}");
                while node.edge_status(id).is_some() {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                log::info!("connection to peer {peer} ended");
            }
            Err(e) => log::warn!("connect to peer {peer} failed, {e}"),
        }
        if reconnect_interval.is_zero() {
            break;
        }
        tokio::time::sleep(reconnect_interval).await;
    }
}
