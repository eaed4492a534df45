pub mod daemon_path;
pub mod output;
pub mod process;
pub mod show;

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use process::start_server;
use show::{process_list_command, process_show_command, ShowCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::start_daemon,
    rpc::{
        client::RpcClient,
        protocol::{Command, DEFAULT_PORT},
    },
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "daytrack", version, long_about = None)]
#[command(about = "Records which application you use each minute of the day")]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, global = true, help = "Log level. Logs are also printed to stderr when set")]
    log: Option<LevelFilter>,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = DEFAULT_PORT, help = "Port of the local server")]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the server directly in the current console")]
    Serve,
    #[command(about = "Start the server as a detached daemon")]
    Start,
    #[command(about = "Send a single request to the running server and print its reply")]
    Server {
        #[arg(value_enum)]
        request: ServerRequest,
    },
    #[command(about = "List every recorded day")]
    List,
    #[command(about = "Show the activity of recorded days")]
    Show {
        #[command(flatten)]
        command: ShowCommand,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ServerRequest {
    Version,
    Apps,
    Current,
    Rules,
    Note,
    Save,
    Quit,
}

impl From<ServerRequest> for Command {
    fn from(value: ServerRequest) -> Self {
        match value {
            ServerRequest::Version => Command::Version,
            ServerRequest::Apps => Command::Apps,
            ServerRequest::Current => Command::Current,
            ServerRequest::Rules => Command::Rules,
            ServerRequest::Note => Command::Note,
            ServerRequest::Save => Command::Save,
            ServerRequest::Quit => Command::Quit,
        }
    }
}

async fn process_server_request(request: ServerRequest, port: u16) -> Result<()> {
    let mut client = RpcClient::connect(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await?;
    match Command::from(request) {
        Command::Quit => {
            client.quit_server().await?;
            println!("Server stopped");
        }
        command => {
            let data = client.request(command).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
    }
    Ok(())
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let app_dir = resolve_application_path(args.dir)?;
    enable_logging(CLI_PREFIX, &app_dir, args.log, args.log.is_some())?;

    match args.commands {
        Commands::Serve => start_daemon(app_dir, args.port).await,
        Commands::Start => start_server(&app_dir, args.port).await,
        Commands::Server { request } => process_server_request(request, args.port).await,
        Commands::List => process_list_command(&app_dir).await,
        Commands::Show { command } => process_show_command(command, &app_dir, args.port).await,
    }
}
