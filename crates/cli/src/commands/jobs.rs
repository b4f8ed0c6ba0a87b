use chrono::Utc;
use uuid::Uuid;

use super::{print_json, LiveApp};

/// Background-job commands.
#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Run every background task once and report what happened.
    Run,
    /// Advance competition statuses only.
    Advance,
    /// Send start reminders only.
    NotifyUpcoming,
    /// Send end reminders only.
    NotifyEnding,
    /// Sync participant revenue.
    Sync {
        /// Restrict the sync to one competition.
        #[arg(long)]
        competition: Option<Uuid>,
    },
    /// Settle a completed competition.
    Settle {
        /// Competition to settle.
        competition: Uuid,
    },
    /// Show an operational snapshot.
    Status,
}

impl Command {
    pub(crate) async fn execute(self, app: &LiveApp) -> eyre::Result<()> {
        let now = Utc::now();
        match self {
            Self::Run => {
                let report = app.run_jobs(now).await;
                print_json(&report)?;
                eyre::ensure!(report.success, "job run finished with failures");
            }
            Self::Advance => {
                print_json(&app.lifecycle().advance_statuses(now).await?)?;
            }
            Self::NotifyUpcoming => {
                print_json(&app.lifecycle().notify_upcoming_starts(now).await?)?;
            }
            Self::NotifyEnding => {
                print_json(&app.lifecycle().notify_ending_soon(now).await?)?;
            }
            Self::Sync { competition } => match competition {
                Some(id) => print_json(&app.sync().sync_competition(&id, now).await?)?,
                None => print_json(&app.sync().sync_all_active(now).await?)?,
            },
            Self::Settle { competition } => {
                print_json(&app.settlement().settle(&competition, now).await?)?;
            }
            Self::Status => {
                print_json(&app.job_status(now)?)?;
            }
        }
        Ok(())
    }
}
