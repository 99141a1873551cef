use clap::Parser;
use log::{error, info};
use packet_logger::configuration::config::Config;
use packet_logger::network::tcp_host::{TcpHost, LISTENER};
use packet_logger::network::{CaptureTransport, HostSession, Transport};
use std::path::PathBuf;

/// Echo server with the capture layer attached, for trying the capture files out.
#[derive(Parser)]
#[command(name = "packet-logger")]
#[command(version = "0.0.2")]
#[command(about = "Per-connection packet capture shim, demonstrated on a TCP echo host")]
struct Args {
    /// TOML capture configuration; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address of the echo host
    #[arg(long, default_value = "127.0.0.1:6900")]
    bind: String,

    /// Stop and tear the capture layer down after this many connections
    #[arg(long)]
    connections: Option<usize>,
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            error!("Unable to import configuration from {}: {}", path.display(), e);
            std::process::exit(1);
        }),
        None => Config::default(),
    };
    info!(
        "Capturing as {} server into {}",
        config.role.tag(),
        config.log_dir.display()
    );

    let host = TcpHost::bind(args.bind.as_str()).unwrap_or_else(|e| {
        error!("Unable to bind {}: {}", args.bind, e);
        std::process::exit(1);
    });
    let mut transport = CaptureTransport::new(host, config);

    let mut served = 0usize;
    while args.connections.map_or(true, |limit| served < limit) {
        let Some(id) = transport.connect_client(LISTENER) else {
            continue;
        };
        serve_echo(&mut transport, id);
        transport.close(id);
        served += 1;
    }

    let stats = transport.layer().stats();
    info!(
        "Served {} connection(s): {} file(s), {} record(s), {} opted out",
        served, stats.files_opened, stats.records_written, stats.opted_out
    );
    let _host = transport.into_inner();
}

fn serve_echo(transport: &mut CaptureTransport<TcpHost>, id: usize) {
    loop {
        if transport.receive(id) <= 0 {
            return;
        }
        let Some(session) = transport.session_mut(id) else {
            return;
        };
        let pending = session.received().to_vec();
        session.consume(pending.len());
        session.stage(&pending);
        transport.validate_write(id, pending.len());
    }
}
