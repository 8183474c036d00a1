mod aggregate;
mod enricher;
mod error;
#[cfg(test)]
mod fakes;
mod fetcher;
mod geocoder;
mod parse;
mod record;
mod server;
mod taxonomy;
mod upstream;

use crate::parse::Args;
use crate::server::{AppState, SearchDefaults};
use crate::upstream::{EbirdClient, NominatimClient};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn build_state(args: &Args) -> Result<AppState, Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(args.timeout);

    let ebird = EbirdClient::new(&args.ebird_api_key, timeout)?.with_base_url(&args.ebird_base_url);
    let geocoder = NominatimClient::new(timeout)?
        .with_base_url(&args.geocoder_url)
        .with_delay(args.delay)
        .with_max_retries(args.retries);

    let defaults = SearchDefaults {
        radius_miles: args.radius,
        lookback_days: args.days,
        max_results: args.max_results,
        grouping: args.grouping,
        lookup_timeout: timeout,
    };

    Ok(AppState::new(Arc::new(ebird), Arc::new(geocoder), defaults))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::try_parse()?;
    // Initialize logger
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::init_from_env(Env::default().default_filter_or(level));

    let state = build_state(&args)?;
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;

    info!(
        "Searching within {} miles over {} days by default, grouping {:?}",
        args.radius, args.days, args.grouping
    );
    server::run(addr, state).await?;

    Ok(())
}
