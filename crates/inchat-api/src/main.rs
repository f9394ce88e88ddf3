//! InChat command-line client.
//!
//! Binary name: `inchat`
//!
//! Parses CLI arguments, opens the database and wires the chat service, then
//! dispatches to the matching command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    inchat_observe::tracing_setup::init_tracing(cli.log_filter(), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing: {e}"))?;

    let state = AppState::init().await?;

    let result = match cli.command {
        Commands::Register { username, password } => {
            cli::account::register(&state, &username, password, cli.json).await
        }
        Commands::Login { username, password } => {
            cli::account::login(&state, &username, password, cli.json).await
        }
        Commands::Logout => cli::account::logout(&state, cli.json).await,
        Commands::Whoami => cli::account::whoami(&state, cli.json).await,
        Commands::Channel { action } => {
            cli::channel::handle_channel_command(action, &state, cli.json).await
        }
    };

    state.db_pool.close().await;
    inchat_observe::tracing_setup::shutdown_tracing();
    result
}
