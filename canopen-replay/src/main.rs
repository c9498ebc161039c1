//! CANopen replay
//!
//! Decodes a recorded CAN trace or a live bus against EDS/DCF files and
//! prints or exports the decoded object values.

mod config;
mod export;

use std::path::PathBuf;

use canopen_decode::codec::parse_integer;
use canopen_decode::{BusManager, ReplayStats};
use clap::{Parser, Subcommand};
use log::{info, warn};

use config::{AppConfig, NodeBinding};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to the per-user config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dictionary binding CHANNEL:NODE:FILE, repeatable
    #[arg(short, long = "node", value_parser = parse_node_binding)]
    nodes: Vec<NodeBinding>,

    /// Export every decoded value as CSV into this directory
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Print the history of CHANNEL:NODE:INDEX:SUB (hex index/sub), repeatable
    #[arg(short, long, value_parser = parse_watch)]
    watch: Vec<Watch>,

    /// Write the configuration, including --node bindings, back to the config file
    #[arg(long)]
    save_config: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Replay a trace file (.asc for Vector ASCII, anything else generic)
    Replay {
        trace: PathBuf,
        /// Put every frame on this channel instead of the one in the trace
        #[arg(long)]
        channel: Option<u32>,
    },
    /// Capture from a live adapter
    Live {
        #[arg(long)]
        adapter: Option<String>,
        #[arg(long)]
        bus: Option<String>,
        #[arg(long)]
        bitrate: Option<u32>,
        /// Stop after this many frames, 0 for no limit
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        channel: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watch {
    channel: u32,
    node: u8,
    index: u16,
    sub: u8,
}

fn parse_node_binding(text: &str) -> Result<NodeBinding, String> {
    let mut parts = text.splitn(3, ':');
    let (Some(channel), Some(node), Some(eds_file)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected CHANNEL:NODE:FILE, got {:?}", text));
    };
    Ok(NodeBinding {
        channel: channel.parse().map_err(|_| format!("bad channel {:?}", channel))?,
        node: node.parse().map_err(|_| format!("bad node {:?}", node))?,
        eds_file: PathBuf::from(eds_file),
    })
}

fn parse_hex<T: TryFrom<u32>>(text: &str) -> Option<T> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).ok().and_then(|n| T::try_from(n).ok())
}

fn parse_watch(text: &str) -> Result<Watch, String> {
    let parts: Vec<&str> = text.split(':').collect();
    let [channel, node, index, sub] = parts[..] else {
        return Err(format!("expected CHANNEL:NODE:INDEX:SUB, got {:?}", text));
    };
    Ok(Watch {
        channel: channel.parse().map_err(|_| format!("bad channel {:?}", channel))?,
        node: parse_integer(node)
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| format!("bad node {:?}", node))?,
        index: parse_hex(index).ok_or_else(|| format!("bad index {:?}", index))?,
        sub: parse_hex(sub).ok_or_else(|| format!("bad subindex {:?}", sub))?,
    })
}

/// Configuration with the command line bindings appended.
fn with_cli_nodes(config: &AppConfig, nodes: &[NodeBinding]) -> AppConfig {
    let mut merged = config.clone();
    for binding in nodes {
        if !merged.nodes.contains(binding) {
            merged.nodes.push(binding.clone());
        }
    }
    merged
}

fn print_watch(bus: &BusManager, watch: &Watch) {
    let Some(slot) = bus.lookup(watch.channel, watch.node, watch.index, watch.sub) else {
        warn!(
            "No value for channel {} node {} {:04X}:{:02X}",
            watch.channel, watch.node, watch.index, watch.sub
        );
        return;
    };
    println!(
        "Channel {} node {} {:04X}:{:02X}",
        watch.channel, watch.node, watch.index, watch.sub
    );
    for (timestamp, value) in slot.history() {
        println!("  {:>12.6}  {}", timestamp, value);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    let config = with_cli_nodes(&config, &args.nodes);
    if args.save_config {
        config.save(args.config.as_deref())?;
    }

    let mut bus = BusManager::new();
    for binding in &config.nodes {
        if let Err(e) = bus.configure_node(binding.channel, binding.node, &binding.eds_file) {
            warn!(
                "Node {}:{} stays undecoded, {} unusable: {}",
                binding.channel,
                binding.node,
                binding.eds_file.display(),
                e
            );
        }
    }

    let stats: ReplayStats = match args.mode {
        Mode::Replay { trace, channel } => bus.replay_trace_file(&trace, channel)?,
        Mode::Live {
            adapter,
            bus: interface,
            bitrate,
            limit,
            channel,
        } => {
            let adapter_config = &config.adapter;
            bus.stream_live_bus(
                channel,
                adapter.as_deref().unwrap_or(&adapter_config.name),
                interface.as_deref().unwrap_or(&adapter_config.bus),
                bitrate.unwrap_or(adapter_config.bitrate),
                limit.unwrap_or(adapter_config.frame_limit),
            )
        }
    };
    info!("{} frames, {} stored", stats.frames, stats.stored);

    for watch in &args.watch {
        print_watch(&bus, watch);
    }

    let export_directory = args
        .export
        .or_else(|| config.export_csv.then(|| config.export_directory()).flatten());
    if let Some(directory) = export_directory {
        let path = export::export_csv(&bus, &directory)?;
        println!("Exported to {}", path.display());
    }
    Ok(())
}
