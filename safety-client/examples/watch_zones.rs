//! Watch safety zones live
//!
//! Loads every zone, then prints the list again whenever the store reports a
//! change. Stops on Ctrl-C.
//!
//! Run: cargo run -p safety-client --example watch_zones
//!
//! Reads SUPABASE_URL / SUPABASE_ANON_KEY (and the optional variables listed
//! in `safety_client::config`) from the environment or a `.env` file.

use anyhow::Context;
use safety_client::{ClientConfig, DEFAULT_LOCATION, ZoneState, ZoneViewModel};
use tracing_subscriber::EnvFilter;

/// Radius for the "near you" section, in meters
const NEARBY_RADIUS_M: f64 = 2_000.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::from_env().context("loading client configuration")?;
    let view_model = ZoneViewModel::connect(&config)?;
    view_model
        .activate()
        .await
        .context("subscribing to zone changes")?;

    let mut state = view_model.subscribe_state();
    print_state(&state.borrow_and_update());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                print_state(&state.borrow_and_update());
            }
        }
    }

    view_model.deactivate().await;
    println!("bye");
    Ok(())
}

fn print_state(state: &ZoneState) {
    if state.is_loading {
        println!("⏳ loading safety zones...");
        return;
    }
    if let Some(error) = &state.error {
        println!("⚠️  {error}");
    }

    println!("\n{} safety zone(s)", state.zones.len());
    for zone in &state.zones {
        println!(
            "  [{:<11}] {:<30} ★ {:.1} ({} reviews){}",
            zone.safety_level.label(),
            zone.name,
            zone.average_rating,
            zone.reviews.len(),
            if zone.verified { " ✔" } else { "" }
        );
    }

    let nearby = state.nearby(DEFAULT_LOCATION, NEARBY_RADIUS_M);
    if !nearby.is_empty() {
        println!("Near you:");
        for (zone, distance) in nearby {
            println!("  {:<30} {:>6.0} m", zone.name, distance);
        }
    }
}
