use clap::Parser;
use tplagent_agent::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Start { config } => cli::start(&config).await,
        Commands::Genconf { blocks, indent } => {
            let mut stdout = std::io::stdout().lock();
            cli::genconf(&mut stdout, blocks, indent)
        }
        Commands::Reload => cli::reload(),
        Commands::Version => {
            let mut stdout = std::io::stdout().lock();
            cli::version(&mut stdout)
        }
    }
}
