use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use lead_broker::{HttpBuyerClient, Service};
use lead_store::PostgresGateway;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::cmd::config::load_settings;

#[derive(Debug, Args)]
#[clap(about = "run the auction broker: HTTP API plus the job queue worker pool")]
pub struct Command {
    #[clap(env, default_value = "config.toml")]
    config_file: String,
}

impl Command {
    pub async fn execute(self) -> Result<()> {
        let settings = load_settings(&self.config_file)?;

        info!(host = %settings.http_host, port = settings.http_port, workers = settings.worker_count, "starting lead-broker");

        let pool = PgPoolOptions::new()
            .max_connections(settings.worker_count as u32 + 4)
            .connect(&settings.database_url)
            .await
            .context("could not connect to database")?;

        let gateway = Arc::new(PostgresGateway::new(pool));
        let buyer_client = Arc::new(HttpBuyerClient::new());
        let service = Service::new(settings, gateway, buyer_client);

        service.run().await;
        Ok(())
    }
}
