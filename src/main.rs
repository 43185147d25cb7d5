use anyhow::Result;
use clap::{Parser, Subcommand};
use hanzo_mcp::{McpServer, ServerConfig, ServerContext};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MCP developer-tool server: file I/O, code search, shell execution and
/// background process supervision over stdio JSON-RPC
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Directory the server may operate in (repeatable). Falls back to
    /// HANZO_ALLOWED_PATHS (comma-separated) when omitted.
    #[clap(short, long = "allow")]
    allow: Vec<PathBuf>,

    /// Server display name reported to the host
    #[clap(long)]
    name: Option<String>,

    /// Disable write/edit tools
    #[clap(long)]
    disable_write: bool,

    /// Disable search tools
    #[clap(long)]
    disable_search: bool,

    /// Register the agent delegator tool
    #[clap(long)]
    enable_agent: bool,

    /// Enable verbose (debug) logging
    #[clap(short, long)]
    verbose: bool,

    /// Subcommand to execute (defaults to serve)
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the stdio transport (default)
    Serve,
    /// Enumerate enabled tools and exit
    ListTools,
    /// Register this server in the desktop host's configuration
    InstallDesktop,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    // Protocol frames own stdout; everything else goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = ServerConfig::resolve(args.allow, args.name)?;
    config.disable_write = args.disable_write;
    config.disable_search = args.disable_search;
    config.enable_agent = args.enable_agent;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let ctx = ServerContext::new(config)?;
            McpServer::new(ctx).serve_stdio().await?;
        }
        Commands::ListTools => {
            let ctx = ServerContext::new(config)?;
            let registry = ctx.registry.read().await;
            for tool in registry.enabled() {
                println!("{:<22} [{}] {}", tool.name, tool.category, tool.description);
            }
        }
        Commands::InstallDesktop => {
            let path = hanzo_mcp::install::install_desktop(&config.name, &config.allowed_paths)?;
            println!("Registered '{}' in {}", config.name, path.display());
        }
    }

    Ok(())
}
