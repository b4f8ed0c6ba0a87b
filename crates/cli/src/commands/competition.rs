use chrono::{DateTime, Utc};
use prettytable::{row, Table};
use rust_decimal::Decimal;
use uuid::Uuid;

use cartbrawl_core::model::{CreateCompetition, JoinCompetition};

use super::{print_json, LiveApp};

/// Competition management commands.
#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Create a competition and escrow its prize.
    Create {
        /// Display title.
        #[arg(long)]
        title: String,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
        /// Prize amount.
        #[arg(long)]
        prize: Decimal,
        /// Start time, RFC 3339 (e.g. 2026-09-01T00:00:00Z).
        #[arg(long)]
        start: DateTime<Utc>,
        /// End time, RFC 3339.
        #[arg(long)]
        end: DateTime<Utc>,
        /// User id of the creator funding the prize.
        #[arg(long)]
        creator: String,
    },
    /// Enroll a store in a competition.
    Join {
        /// Competition to join.
        competition: Uuid,
        /// User id of the store owner.
        #[arg(long)]
        user: String,
        /// Storefront domain to track.
        #[arg(long)]
        store_domain: String,
        /// Storefront API credential.
        #[arg(long, env = "CARTBRAWL_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
    },
    /// Manually start an upcoming competition. Restricted to its creator.
    Start {
        /// Competition to start.
        competition: Uuid,
        /// User id of the caller.
        #[arg(long)]
        creator: String,
    },
    /// Show a competition with its settlement state.
    Show {
        /// Competition to show.
        competition: Uuid,
    },
    /// Print the ranked leaderboard.
    Leaderboard {
        /// Competition to rank.
        competition: Uuid,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// List competitions a user created or joined.
    List {
        /// User to list for.
        user: String,
    },
}

impl Command {
    pub(crate) async fn execute(self, app: &LiveApp) -> eyre::Result<()> {
        let now = Utc::now();
        match self {
            Self::Create {
                title,
                description,
                prize,
                start,
                end,
                creator,
            } => {
                let input = CreateCompetition {
                    title,
                    description,
                    prize,
                    start_at: start,
                    end_at: end,
                    creator_id: creator,
                };
                print_json(&app.competitions().create(input, now).await?)?;
            }
            Self::Join {
                competition,
                user,
                store_domain,
                access_token,
            } => {
                let input = JoinCompetition {
                    competition_id: competition,
                    user_id: user,
                    store_domain,
                    access_token,
                };
                let participant = app.competitions().join(input, now).await?;
                // The sealed credential stays out of the output.
                print_json(&serde_json::json!({
                    "id": participant.id,
                    "competition_id": participant.competition_id,
                    "user_id": participant.user_id,
                    "store_domain": participant.store_domain,
                    "joined_at": participant.joined_at,
                }))?;
            }
            Self::Start {
                competition,
                creator,
            } => {
                print_json(&app.competitions().start(&competition, &creator, now).await?)?;
            }
            Self::Show { competition } => {
                print_json(&app.competitions().details(&competition)?)?;
            }
            Self::Leaderboard { competition, json } => {
                let leaderboard = app.competitions().leaderboard(&competition)?;
                if json {
                    print_json(&leaderboard)?;
                } else {
                    let mut table = Table::new();
                    table.set_titles(row!["Rank", "User", "Store", "Revenue", "Last synced"]);
                    for entry in &leaderboard.entries {
                        table.add_row(row![
                            entry.rank,
                            entry.user_id,
                            entry.store_domain,
                            entry.total_revenue,
                            entry
                                .last_synced_at
                                .map(|at| at.to_rfc3339())
                                .unwrap_or_else(|| "never".into()),
                        ]);
                    }
                    println!("{} [{}]", leaderboard.title, leaderboard.status);
                    table.printstd();
                    println!(
                        "{} stores, total {}, average {}",
                        leaderboard.stats.participants,
                        leaderboard.stats.total_revenue,
                        leaderboard.stats.average_revenue,
                    );
                }
            }
            Self::List { user } => {
                print_json(&app.competitions().user_competitions(&user)?)?;
            }
        }
        Ok(())
    }
}
