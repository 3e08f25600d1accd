mod auth;
mod config;
mod delay_check;
mod graphql;
mod http;
mod pages;
mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use platform_authz::Gate;
use platform_db::{DatabaseSettings, DbPool, SeaRoleStore, connect};
use platform_obs::{ObsConfig, init_tracing};
use tracing::info;

use crate::{
    config::AppConfig,
    graphql::GraphqlData,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "shiptrack-server", version, about = "Shipment tracking dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Create the default org, stock roles and an administrator.
    Seed(SeedCommand),
    /// Print the GraphQL schema.
    #[command(name = "schema:print")]
    SchemaPrint {
        #[arg(long, value_name = "FILE", help = "Destination file path")]
        output: Option<PathBuf>,
    },
    /// Run one delay check pass and print the report.
    #[command(name = "jobs:delay-check")]
    DelayCheck,
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[derive(Args, Debug)]
struct SeedCommand {
    #[arg(long, env = "DEFAULT_ORG_SLUG", default_value = "default")]
    org_slug: String,
    #[arg(long, env = "DEFAULT_ORG_NAME", default_value = "Default")]
    org_name: String,
    #[arg(long, env = "SEED_ADMIN_EMAIL", default_value = "admin@shiptrack.local")]
    admin_email: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(ObsConfig::from_env("shiptrack-server")?)?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Migrate(action) => match action {
            MigrateCommand::Up => migrate_up().await,
            MigrateCommand::Down => migrate_down().await,
        },
        Command::Seed(cmd) => run_seed(cmd).await,
        Command::SchemaPrint { output } => schema_print(output),
        Command::DelayCheck => run_delay_check().await,
    }
}

async fn run_seed(cmd: SeedCommand) -> Result<()> {
    let pool = setup_pool().await?;
    let report = seed::run(&pool, &cmd.org_slug, &cmd.org_name, &cmd.admin_email).await?;
    info!(org_id = %report.org_id, "seed complete");
    match report.generated_password {
        Some(password) => {
            println!("admin user: {}", report.admin_email);
            println!("password (shown once): {password}");
        }
        None => println!("admin user {} already exists", report.admin_email),
    }
    Ok(())
}

fn schema_print(path: Option<PathBuf>) -> Result<()> {
    let sdl = graphql::schema_builder().finish().sdl();
    match path {
        Some(target) => {
            std::fs::write(&target, sdl)?;
            info!(path = %target.display(), "schema written");
        }
        None => print!("{sdl}"),
    }
    Ok(())
}

async fn run_delay_check() -> Result<()> {
    let pool = setup_pool().await?;
    let report = delay_check::run(&pool, Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn setup_pool() -> Result<DbPool> {
    let settings = DatabaseSettings::from_env();
    connect(&settings).await.map_err(Into::into)
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    let config = Arc::new(AppConfig::load()?);
    let pool = setup_pool().await?;
    ensure_migrations(&pool, cmd.allow_dirty).await?;
    let org_id =
        platform_db::ensure_default_org(&pool, &config.default_org_slug, &config.default_org_name)
            .await?;
    info!(%org_id, "default org ready");

    let pool = Arc::new(pool);
    let gate = Gate::new(Arc::new(SeaRoleStore::new(pool.clone())))
        .with_lookup_timeout(config.authz_timeout);
    let schema = graphql::build_schema(GraphqlData {
        pool: pool.clone(),
        gate: gate.clone(),
    });
    let state = AppState {
        pool,
        schema,
        cookie_key: config.cookie_key.clone(),
        config,
        gate,
    };
    http::serve(ServeConfig::from(&cmd), state).await
}

async fn ensure_migrations(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `shiptrack-server migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn migrate_up() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::up(&pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::down(&pool, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}
