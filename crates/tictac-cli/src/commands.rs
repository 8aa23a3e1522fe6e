//! Command handlers for the tictac CLI

use tracing::{info, warn};

use tictac_core::{SessionStore, UserDirectory, UserId};
use tictac_runtime::{DurableSessionStore, DurableUserDirectory, RuntimeBuilder};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::gateway::Gateway;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Serve { bind } => Self::handle_serve(config, bind).await,
            Commands::Sessions { user } => Self::handle_sessions(&config, UserId::new(user)).await,
            Commands::Stats { user } => Self::handle_stats(&config, user.map(UserId::new)).await,
            Commands::CheckConfig => Self::handle_check_config(&config),
            Commands::ExampleConfig => {
                println!("{}", AppConfig::example_config()?);
                Ok(())
            }
        }
    }

    /// Run the gateway until interrupted
    async fn handle_serve(config: AppConfig, bind: Option<String>) -> Result<()> {
        let addr = match bind {
            Some(bind) => bind.parse()?,
            None => config.bind_addr()?,
        };
        if config.users.is_empty() {
            warn!("No users configured, every authentication attempt will fail");
        }

        let mut runtime = RuntimeBuilder::new()
            .with_config(config.to_runtime())
            .with_users(config.seeds())
            .build()
            .await?;
        runtime.start_sweeper();

        let gateway = Gateway::bind(addr, runtime.coordinator()).await?;
        info!("Serving tic-tac-toe on ws://{}", gateway.local_addr()?);

        let result = tokio::select! {
            result = gateway.run() => result,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupt received, shutting down");
                Ok(())
            }
        };
        runtime.shutdown();
        result
    }

    async fn handle_sessions(config: &AppConfig, user_id: UserId) -> Result<()> {
        let path = config
            .storage
            .sessions_path()
            .ok_or_else(|| CliError::Config("No data directory configured".to_string()))?;
        let store = DurableSessionStore::open(path).await?;
        let sessions = store.list_sessions_for_user(user_id).await?;

        if sessions.is_empty() {
            println!("No sessions for user {}", user_id);
            return Ok(());
        }
        for session in sessions {
            let winner = session
                .winner_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "#{}  X={} O={}  {}  turn={}  winner={}",
                session.id,
                session.player_x_id,
                session.player_o_id,
                session.status,
                session.current_turn,
                winner
            );
            println!("{}\n", session.board);
        }
        Ok(())
    }

    async fn handle_stats(config: &AppConfig, user_id: Option<UserId>) -> Result<()> {
        let path = config
            .storage
            .stats_path()
            .ok_or_else(|| CliError::Config("No data directory configured".to_string()))?;
        let directory = DurableUserDirectory::open(path).await?;

        if let Some(user_id) = user_id {
            let name = directory.username_of(user_id).await?;
            let stats = directory.get_stats(user_id).await?;
            println!(
                "{} ({}): {} wins, {} losses, {} draws",
                name, user_id, stats.wins, stats.losses, stats.draws
            );
            return Ok(());
        }

        let records = directory.records().await;
        if records.is_empty() {
            println!("No users recorded");
        }
        for record in records {
            println!(
                "{:>6}  {:<20} {:>4}W {:>4}L {:>4}D",
                record.user_id, record.username, record.stats.wins, record.stats.losses, record.stats.draws
            );
        }
        Ok(())
    }

    fn handle_check_config(config: &AppConfig) -> Result<()> {
        config.validate()?;
        println!("Configuration OK");
        println!("  bind:          {}", config.server.bind);
        println!("  win policy:    {:?}", config.game.win_policy);
        match config.game.challenge_ttl_secs {
            Some(ttl) => println!(
                "  challenge TTL: {}s (swept every {}s)",
                ttl, config.game.sweep_interval_secs
            ),
            None => println!("  challenge TTL: none"),
        }
        match &config.storage.data_dir {
            Some(dir) => println!("  storage:       {}", dir.display()),
            None => println!("  storage:       in memory"),
        }
        println!("  users:         {}", config.users.len());
        Ok(())
    }
}
