use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use mikrolage::embed::{self, EmbedOptions, MapType};
use mikrolage::location::{
    AddressResolver, CacheStore, LatLng, NominatimClient, RateLimitedResolver, RateLimiter,
    ResolvedAddress, StructuredAddress, TravelMode,
};
use mikrolage::{logging, Config, MicroLocationService};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Mikrolage: micro-location profiles for street addresses.
///
/// Geocodes an address, finds nearby shopping, transit and leisure places,
/// measures driving/walking/transit distances to each and suggests a
/// street-view camera. Remote answers are cached for 30 days.
///
/// Examples:
///   mikrolage enrich "Beispielstr. 1, 10115 Berlin"
///   mikrolage geocode --free "Marienplatz 1, München"
///   mikrolage places --lat 52.5323 --lng 13.3846 --category transit
///   mikrolage distances --origin 52.5323,13.3846 --to 52.52,13.40 --to 52.53,13.39
///   mikrolage cache stats
#[derive(Parser)]
#[command(name = "mikrolage", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Google Maps API key (geocoding, places, distance matrix, embeds).
    #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Cache database path. Defaults to ~/.mikrolage/cache.db.
    #[arg(long, env = "MIKROLAGE_CACHE_DB", global = true)]
    cache_db: Option<PathBuf>,

    /// Response language for provider results.
    #[arg(long, env = "MIKROLAGE_LANGUAGE", default_value = "de", global = true)]
    language: String,

    /// Timeout for each outbound request, in seconds.
    #[arg(long, default_value_t = 10, global = true)]
    timeout_secs: u64,

    /// Debug logging on stderr (RUST_LOG overrides).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Full micro-location bundle for an address.
    Enrich {
        address: String,
        /// Ignore cached entries (results are still cached).
        #[arg(long)]
        force_refresh: bool,
        /// Travel modes, comma separated.
        #[arg(long, value_delimiter = ',', default_value = "driving,walking,transit")]
        modes: Vec<TravelMode>,
        /// Search radius in meters.
        #[arg(long)]
        radius: Option<u32>,
    },
    /// Resolve an address to coordinates and administrative components.
    Geocode {
        address: String,
        /// Use the free, rate-limited Nominatim resolver instead of Google.
        #[arg(long)]
        free: bool,
        #[arg(long)]
        force_refresh: bool,
    },
    /// Resolve coordinates to an address.
    Reverse {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long)]
        free: bool,
        #[arg(long)]
        force_refresh: bool,
    },
    /// Check a structured address against the free resolver.
    Validate {
        #[arg(long)]
        street: Option<String>,
        #[arg(long)]
        house_number: Option<String>,
        #[arg(long)]
        postcode: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        country: Option<String>,
    },
    /// Nearest places of one category.
    Places {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// shopping, transit or leisure.
        #[arg(long)]
        category: String,
        #[arg(long)]
        radius: Option<u32>,
        #[arg(long)]
        force_refresh: bool,
    },
    /// Distances from one origin to several destinations.
    Distances {
        /// LAT,LNG
        #[arg(long, allow_hyphen_values = true)]
        origin: LatLng,
        /// LAT,LNG; repeat for more destinations.
        #[arg(long = "to", required = true, allow_hyphen_values = true)]
        destinations: Vec<LatLng>,
        #[arg(long, value_delimiter = ',', default_value = "driving,walking,transit")]
        modes: Vec<TravelMode>,
        #[arg(long)]
        force_refresh: bool,
    },
    /// Google Maps embed URL for a coordinate.
    MapUrl {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// roadmap, satellite, hybrid, terrain or streetview.
        #[arg(long, default_value = "roadmap")]
        map_type: MapType,
        #[arg(long, default_value_t = 15)]
        zoom: i32,
        #[arg(long, default_value_t = 0)]
        heading: i32,
        #[arg(long, default_value_t = 10, allow_hyphen_values = true)]
        pitch: i32,
        #[arg(long, default_value_t = 90)]
        fov: i32,
    },
    /// Inspect or clean the local cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Entries and expired entries per table.
    Stats,
    /// Delete expired entries.
    Purge,
}

/// Exit code for "address not found".
const NOT_FOUND: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.global.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn config_from(global: &GlobalArgs) -> Config {
    Config {
        api_key: global.api_key.clone(),
        cache_path: global.cache_db.clone(),
        request_timeout: Duration::from_secs(global.timeout_secs),
        language: global.language.clone(),
        ..Config::default()
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = config_from(&cli.global);

    match cli.command {
        Command::Enrich {
            address,
            force_refresh,
            modes,
            radius,
        } => {
            config.travel_modes = modes;
            if let Some(radius) = radius {
                config.search_radius_m = radius;
            }
            let service = MicroLocationService::from_config(&config)?;
            let bundle = service.enrich(&address, force_refresh)?;
            print_optional(&bundle)
        }
        Command::Geocode {
            address,
            free,
            force_refresh,
        } => {
            let resolved = if free {
                free_resolver(&config)?.resolve(&address, force_refresh)?
            } else {
                MicroLocationService::from_config(&config)?
                    .resolver()
                    .resolve(&address, force_refresh)?
            };
            print_optional(&resolved)
        }
        Command::Reverse {
            lat,
            lng,
            free,
            force_refresh,
        } => {
            let at = LatLng::new(lat, lng);
            if !at.is_valid() {
                bail!("coordinates out of range: {}", at);
            }
            let resolved: Option<ResolvedAddress> = if free {
                free_resolver(&config)?.reverse(at, force_refresh)?
            } else {
                MicroLocationService::from_config(&config)?
                    .resolver()
                    .reverse(at, force_refresh)?
            };
            print_optional(&resolved)
        }
        Command::Validate {
            street,
            house_number,
            postcode,
            city,
            state,
            country,
        } => {
            let address = StructuredAddress {
                street,
                house_number,
                postcode,
                city,
                state,
                country,
            };
            let check = free_resolver(&config)?.validate_and_enrich(&address)?;
            print_json(&check)?;
            Ok(if check.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(NOT_FOUND)
            })
        }
        Command::Places {
            lat,
            lng,
            category,
            radius,
            force_refresh,
        } => {
            let at = LatLng::new(lat, lng);
            if !at.is_valid() {
                bail!("coordinates out of range: {}", at);
            }
            // Reject an unknown category before any credentials or cache are needed.
            let category: mikrolage::location::Category = category.parse()?;
            let service = MicroLocationService::from_config(&config)?;
            let places = service.places().find(at, category, radius, force_refresh)?;
            print_json(&places)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Distances {
            origin,
            destinations,
            modes,
            force_refresh,
        } => {
            let service = MicroLocationService::from_config(&config)?;
            let matrix = service
                .distances()
                .compute_batch(origin, &destinations, &modes, force_refresh);
            print_json(&matrix)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::MapUrl {
            lat,
            lng,
            map_type,
            zoom,
            heading,
            pitch,
            fov,
        } => {
            let api_key = config.require_api_key()?;
            let options = EmbedOptions {
                zoom,
                heading,
                pitch,
                fov,
            };
            let url = embed::map_url(api_key, lat, lng, map_type, &options)?;
            print_json(&serde_json::json!({ "url": url }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Cache { action } => {
            let path = config.cache_path();
            let cache = CacheStore::open_at(&path)
                .with_context(|| format!("cannot open cache at {}", path.display()))?
                .with_ttl(config.cache_ttl);
            match action {
                CacheAction::Stats => print_json(&serde_json::json!({
                    "path": path,
                    "tables": cache.stats()?,
                }))?,
                CacheAction::Purge => print_json(&serde_json::json!({
                    "path": path,
                    "purged": cache.purge_expired()?,
                }))?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn free_resolver(config: &Config) -> anyhow::Result<RateLimitedResolver> {
    config.validate()?;
    let provider = NominatimClient::with_base_url(
        config.nominatim_url.clone(),
        config.nominatim_user_agent.clone(),
        config.request_timeout,
        config.language.clone(),
    );
    let limiter = Arc::new(RateLimiter::new(config.nominatim_min_interval));
    Ok(RateLimitedResolver::new(Arc::new(provider), limiter))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `null` and exit code 2 when there is nothing to print.
fn print_optional<T: Serialize>(value: &Option<T>) -> anyhow::Result<ExitCode> {
    print_json(value)?;
    Ok(if value.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(NOT_FOUND)
    })
}
