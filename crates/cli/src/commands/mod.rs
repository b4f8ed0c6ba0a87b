use cartbrawl_core::{
    client::{ShopifyRevenue, WhopLedger},
    App, Config,
};

mod competition;
mod jobs;

pub(crate) type LiveApp = App<WhopLedger, ShopifyRevenue>;

/// Commands.
#[derive(Debug, clap::Subcommand)]
pub(crate) enum Commands {
    /// Competition management commands.
    #[command(subcommand)]
    Competition(competition::Command),
    /// Background-job commands.
    #[command(subcommand)]
    Jobs(jobs::Command),
}

impl Commands {
    pub(crate) async fn execute(self, config: Config) -> eyre::Result<()> {
        let app = App::open(config)?;
        match self {
            Self::Competition(command) => command.execute(&app).await?,
            Self::Jobs(command) => command.execute(&app).await?,
        }
        app.store().flush()?;
        Ok(())
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
