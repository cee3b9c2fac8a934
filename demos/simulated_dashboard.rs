//! Simulated dashboard - runs the engine against the local feed and prints each view
//!
//! Set LANEWATCH_ENDPOINT to a ws:// URL to watch a live feed instead.

use std::time::Duration;

use lanewatch::{DashboardClient, DashboardConfig, NotificationCause};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = DashboardConfig::from_env();
    println!("=== Lane Monitor ({} lanes, {} mode) ===\n", config.lane_count, config.light_mode);

    let client = DashboardClient::start(config)?;

    let _alerts = client.observe(|n| {
        if n.cause == NotificationCause::IncidentRecorded {
            if let Some(attack) = &n.snapshot.last_attack {
                println!("    ! {} - {}", attack.category, attack.description);
            }
        }
    });

    client.connect().await?;

    let mut views = client.watch();
    let run_for = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(run_for);

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                let lanes: Vec<String> = view
                    .snapshot
                    .lanes
                    .values()
                    .map(|lane| {
                        let lock = if lane.secured { "" } else { " [UNSECURED]" };
                        format!("{} {:>2} {:<6}{}", lane.lane_id, lane.vehicle_count, lane.light.as_str(), lock)
                    })
                    .collect();
                println!("[{:<19}] rev {:>3} | {}", view.badge(), view.snapshot.revision, lanes.join(" | "));
            }
            _ = &mut run_for => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let snapshot = client.snapshot();
    println!("\nIncidents recorded: {}", snapshot.incidents.total_recorded());
    for (category, count) in snapshot.incidents.category_counts() {
        println!("    {:<18} {}", category, count);
    }

    client.shutdown().await?;
    Ok(())
}
