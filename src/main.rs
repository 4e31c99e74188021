//! `stcp`: move a byte stream between stdin/stdout and a peer over UDP.
//!
//! Set RUST_LOG to see what the connection is doing; logs go to stderr.

use std::io;
use std::net::SocketAddr;
use std::process;
use clap::{Args, Parser, Subcommand};
use stcp::config::{AckValidation, InitialSeqNo, StcpConfig, TeardownMode, DEFAULT_MSS, DEFAULT_WINDOW};
use stcp::udp::UdpHost;
use stcp::{Role, StcpError, Transport};

#[derive(Parser)]
#[command(author, version, about = "Simple reliable transport over UDP")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for a peer to connect
    Listen {
        /// Local address to bind
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
    },
    /// Connect to a listening peer
    Connect {
        /// Address of the listening peer
        #[arg(short, long)]
        server: SocketAddr,

        /// Local address to bind
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
    },
}

#[derive(Args)]
struct Options {
    /// Maximum payload bytes per segment
    #[arg(long, global = true, default_value_t = DEFAULT_MSS)]
    mss: usize,

    /// Receive window advertised to the peer
    #[arg(long, global = true, default_value_t = DEFAULT_WINDOW)]
    window: u16,

    /// Wait for the peer's FIN after ours has been acknowledged
    #[arg(long, global = true)]
    four_way_close: bool,

    /// Only accept ACKs whose ack number covers the SYN or FIN
    #[arg(long, global = true)]
    strict_acks: bool,

    /// Pick a random initial sequence number instead of 1
    #[arg(long, global = true)]
    random_isn: bool,

    /// Close our side as soon as the peer closes its side
    #[arg(long, global = true)]
    close_on_peer_fin: bool,
}

impl Options {
    fn config(&self) -> StcpConfig {
        StcpConfig {
            mss: self.mss,
            window_size: self.window,
            initial_seq_no: if self.random_isn { InitialSeqNo::Random } else { InitialSeqNo::Fixed(1) },
            ack_validation: if self.strict_acks { AckValidation::Strict } else { AckValidation::Permissive },
            teardown: if self.four_way_close { TeardownMode::FourWay } else { TeardownMode::AwaitAck },
        }
    }
}

fn run(cli: Cli) -> Result<(), StcpError> {
    let config = cli.options.config();
    config.validate()?;

    let (host, role) = match cli.mode {
        Mode::Listen { bind } => {
            log::info!("Listening on {}", bind);
            (UdpHost::listen(bind, io::stdin(), io::stdout(), config.mss)?, Role::Passive)
        }
        Mode::Connect { server, bind } => {
            log::info!("Connecting to {} from {}", server, bind);
            (UdpHost::connect(bind, server, io::stdin(), io::stdout(), config.mss)?, Role::Active)
        }
    };

    let host = host.close_on_peer_fin(cli.options.close_on_peer_fin);
    Transport::new(host, config).run(role)
}

fn main() {
    env_logger::init();

    if let Err(err) = run(Cli::parse()) {
        log::error!("{}", err);
        eprintln!("stcp: {}", err);
        process::exit(1);
    }
}
