mod devices;

use std::process::ExitCode;

use clap::Parser;
use hartebeest::config::{Env, PreConf};
use hartebeest::device::Device;
use hartebeest::exchange;
use tabled::Table;
use tabled::Tabled;
use tracing::info;

/// Command-line entry point for device listing and the network-view
/// bootstrap demo.
#[derive(Debug, clap::Parser)]
#[clap(name = "hartebeest-cli")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// List the RDMA devices visible on this host.
    Devices,
    /// Run the socket-based bootstrap exchange and print the agreed
    /// network view.
    Bootstrap {
        /// Path to the pre-conf topology document.
        #[clap(long, default_value = "pre-conf.json")]
        pre_conf: String,
        /// Path to write the agreed post-conf document to.
        #[clap(long, default_value = "post-conf.json")]
        post_conf: String,
    },
}

fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "hartebeest_cli=info,hartebeest=info");
    }
    tracing_subscriber::fmt::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Devices => devices::run(),
        Command::Bootstrap { pre_conf, post_conf } => run_bootstrap(&pre_conf, &post_conf),
    }
}

fn run_bootstrap(pre_conf_path: &str, post_conf_path: &str) -> anyhow::Result<()> {
    let env = Env::from_environment()?;
    let pre = PreConf::load(pre_conf_path)?;
    let device = Device::open(0)?;
    info!(nid = env.nid, port_num = device.port_num(), lid = device.lid(), "device bound");

    let my_view = hartebeest::view::NodeView { n: env.nid, p: Vec::new() };
    let network_view = exchange::run_socket_exchange(&pre, my_view, post_conf_path)?;

    let rows = network_view.iter().map(|node| NodeRow {
        nid: node.n,
        pd_count: node.p.len(),
    });
    print!("{}", Table::new(rows));

    Ok(())
}

#[derive(Tabled)]
struct NodeRow {
    nid: u32,
    pd_count: usize,
}

/// Maps a library error to a process exit status: the `Retcode`
/// discriminant, truncated to a byte as `std::process::exit` requires.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<hartebeest::error::Error>() {
        Some(e) => (e.code as u32 & 0xff) as u8,
        None => 1,
    }
}
