use crate::aggregate::GroupingPolicy;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "kestrel")]
#[command(about = "A small backend for searching recent bird observations near a place")]
#[command(version = "0.1")]
pub(crate) struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// Address to bind to
    #[arg(short, long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: String,

    /// eBird API token
    #[arg(short = 'k', long, env = "EBIRD_API_KEY", hide_env_values = true)]
    pub ebird_api_key: String,

    #[arg(long, env = "EBIRD_BASE_URL", default_value = "https://api.ebird.org/v2")]
    pub ebird_base_url: String,

    #[arg(long, env = "GEOCODER_URL", default_value = "https://nominatim.openstreetmap.org")]
    pub geocoder_url: String,

    /// Timeout for each external call, in seconds
    #[arg(short, long, default_value = "10")]
    pub timeout: u64,

    /// Maximum number of retry attempts for geocoding lookups
    #[arg(short, long, default_value = "0")]
    pub retries: u32,

    /// Base backoff delay between geocoding retries in milliseconds
    #[arg(short, long, default_value = "500")]
    pub delay: u64,

    /// Default search radius in miles
    #[arg(long, default_value = "20")]
    pub radius: f64,

    /// Default lookback window in days
    #[arg(long, default_value = "30")]
    pub days: u32,

    /// Cap on the number of observations requested upstream
    #[arg(long)]
    pub max_results: Option<u32>,

    /// Grouping applied when a request does not pick one
    #[arg(short, long, value_enum, default_value_t = GroupingPolicy::ByChecklist)]
    pub grouping: GroupingPolicy,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
