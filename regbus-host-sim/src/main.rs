//! # Simulated Register-Bus Host
//!
//! Serves an in-memory register file over TCP (SLIP-framed) or UDP, so
//! client software can be developed and tested without target hardware.
//! Every register reads back the last value written, like a power-on
//! register bank with all-zero reset values.

use std::error::Error;
use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use env_logger::Env;
use regbus_protocol::TagPair;
use regbus_protocol::fcs::FcsPolicy;
use regbus_server::MemRegisterFile;
use regbus_server::server::Builder;

const DEFAULT_PORT: u16 = 23553;

#[derive(Parser, Eq, PartialEq, Clone)]
enum Transport {
    /// SLIP-framed byte stream with a CRC-32 frame check.
    Tcp {
        #[arg(
            long,
            help = "Deliver frames that fail the frame check instead of dropping them"
        )]
        keep_bad_frames: bool,
        #[arg(long, help = "Zero-pad outbound frames to the Ethernet minimum")]
        zeropad: bool,
    },
    /// Bare datagrams, one command or reply per packet.
    Udp,
}

#[derive(Parser)]
#[command(about = "Simulated register-bus host with an in-memory register file", long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "127.0.0.1")]
    ip: IpAddr,

    #[arg(
        short,
        long,
        default_value = "0x5C01",
        value_parser = parse_tag,
        help = "Command message tag; replies use tag + 1"
    )]
    tag: TagPair,

    #[clap(subcommand)]
    transport: Option<Transport>,
}

fn parse_tag(raw: &str) -> Result<TagPair, String> {
    let value = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        raw.parse::<u16>()
    }
    .map_err(|e| e.to_string())?;
    TagPair::new(value).ok_or_else(|| format!("tag 0x{:04X} out of range", value))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting register-bus host simulator");

    let args = Args::parse();
    let addr = SocketAddr::new(args.ip, args.port);
    let transport = args.transport.unwrap_or(Transport::Tcp {
        keep_bad_frames: false,
        zeropad: false,
    });

    match transport {
        Transport::Tcp {
            keep_bad_frames,
            zeropad,
        } => {
            let server = Builder::new()
                .tags(args.tag)
                .fcs(if keep_bad_frames {
                    FcsPolicy::Warn
                } else {
                    FcsPolicy::Drop
                })
                .zeropad(zeropad)
                .build(MemRegisterFile::new());
            log::info!("Serving TCP on {}", addr);
            server.listen(addr)?;
        }
        Transport::Udp => {
            let server = Builder::new().tags(args.tag).build(MemRegisterFile::new());
            log::info!("Serving UDP on {}", addr);
            server.listen_udp(addr)?;
        }
    }
    Ok(())
}
