//! One-shot mode — run a single scenario and print JSON to stdout.

use clap::Subcommand;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use scaleprobe_recommend::ScoreWeights;

use crate::ClusterArgs;
use crate::cluster::assemble;

#[derive(Subcommand, Debug)]
pub enum Scenario {
    /// Recommend units to add until all workload is placed.
    ScaleUp {
        #[arg(long, default_value_t = 1.0)]
        least_waste: f64,

        #[arg(long, default_value_t = 1.0)]
        least_cost: f64,
    },
    /// Recommend units that can be removed.
    ScaleDown {
        /// Units to test; every unit when omitted.
        #[arg(long = "unit")]
        units: Vec<String>,
    },
}

pub async fn run_scenario(args: ClusterArgs, scenario: Scenario) -> anyhow::Result<()> {
    let assembly = assemble(&args)?;
    let recommender = assembly.recommender;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, cancelling run");
            let _ = shutdown_tx.send(true);
        }
    });
    let ctx = recommender.context().with_shutdown(shutdown_rx);

    let output = match scenario {
        Scenario::ScaleUp {
            least_waste,
            least_cost,
        } => {
            let weights = ScoreWeights {
                least_waste,
                least_cost,
            };
            let rec = recommender.run_scale_up(&ctx, &weights).await?;
            serde_json::to_value(rec)?
        }
        Scenario::ScaleDown { units } => {
            let removable = if units.is_empty() {
                recommender.run_scale_down(&ctx, None).await?
            } else {
                let live = assembly.cluster.store().list_units()?;
                let selected = units
                    .iter()
                    .map(|name| {
                        live.iter()
                            .find(|u| &u.name == name)
                            .cloned()
                            .ok_or_else(|| anyhow::anyhow!("unit {name} not found"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                recommender.run_scale_down(&ctx, Some(&selected)).await?
            };
            json!({ "removable": removable })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
