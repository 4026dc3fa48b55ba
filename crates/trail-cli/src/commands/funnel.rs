use clap::{Args, Subcommand};
use serde::Serialize;
use trail_funnels::types::{CreateFunnelRequest, FunnelResponse};
use trail_funnels::FunnelService;
use tracing::{debug, info};

use super::DatabaseArgs;

#[derive(Args)]
pub struct FunnelCommand {
    #[command(subcommand)]
    pub action: FunnelAction,
}

#[derive(Subcommand)]
pub enum FunnelAction {
    /// Per-step counts, people and average time between steps
    Steps(FunnelTarget),
    /// Conversion between two steps over time
    Trends(TrendsArgs),
    /// List a team's funnels
    List(TeamArgs),
    /// Save a funnel from a JSON filter
    Create(CreateArgs),
    /// Soft delete a funnel
    Delete(FunnelTarget),
}

#[derive(Args, Debug)]
pub struct TeamArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[arg(long)]
    pub team_id: i32,
}

#[derive(Args, Debug)]
pub struct FunnelTarget {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[arg(long)]
    pub team_id: i32,

    #[arg(long)]
    pub funnel_id: i32,
}

#[derive(Args, Debug)]
pub struct TrendsArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[arg(long)]
    pub team_id: i32,

    #[arg(long)]
    pub funnel_id: i32,

    /// Step the conversion is measured from (requires --to-step)
    #[arg(long)]
    pub from_step: Option<String>,

    /// Step the conversion is measured to (requires --from-step)
    #[arg(long)]
    pub to_step: Option<String>,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[arg(long)]
    pub team_id: i32,

    #[arg(long)]
    pub name: Option<String>,

    /// Filter blob, e.g. '{"events": [{"id": "$pageview", "order": 0}]}'
    #[arg(long)]
    pub filters: String,

    /// User recorded as the funnel's creator
    #[arg(long)]
    pub created_by_id: Option<i32>,
}

impl FunnelAction {
    fn database(&self) -> &DatabaseArgs {
        match self {
            FunnelAction::Steps(target) | FunnelAction::Delete(target) => &target.database,
            FunnelAction::Trends(args) => &args.database,
            FunnelAction::List(team) => &team.database,
            FunnelAction::Create(args) => &args.database,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl FunnelCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let db = self.action.database().connect().await?;
            let service = FunnelService::new(db);

            match self.action {
                FunnelAction::Steps(target) => {
                    debug!(
                        "Computing steps for funnel {} of team {}",
                        target.funnel_id, target.team_id
                    );
                    let steps = service.get_steps(target.team_id, target.funnel_id).await?;
                    print_json(&steps)
                }
                FunnelAction::Trends(args) => {
                    debug!(
                        "Computing trends for funnel {} of team {}",
                        args.funnel_id, args.team_id
                    );
                    let trends = service
                        .get_trends(
                            args.team_id,
                            args.funnel_id,
                            args.from_step.as_deref(),
                            args.to_step.as_deref(),
                        )
                        .await?;
                    print_json(&trends)
                }
                FunnelAction::List(team) => {
                    let funnels: Vec<FunnelResponse> = service
                        .list_funnels(team.team_id)
                        .await?
                        .into_iter()
                        .map(FunnelResponse::from)
                        .collect();
                    print_json(&funnels)
                }
                FunnelAction::Create(args) => {
                    let filters: serde_json::Value = serde_json::from_str(&args.filters)
                        .map_err(|e| anyhow::anyhow!("--filters is not valid JSON: {}", e))?;
                    let funnel = service
                        .create_funnel(
                            args.team_id,
                            args.created_by_id,
                            CreateFunnelRequest {
                                name: args.name,
                                filters,
                            },
                        )
                        .await?;
                    info!("Created funnel {}", funnel.id);
                    print_json(&FunnelResponse::from(funnel))
                }
                FunnelAction::Delete(target) => {
                    service
                        .delete_funnel(target.team_id, target.funnel_id)
                        .await?;
                    info!("Deleted funnel {}", target.funnel_id);
                    Ok(())
                }
            }
        })
    }
}
