mod serve;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use time::OffsetDateTime;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Parking lot management backend.
#[derive(Parser)]
#[command(name = "carpark", version, about = "Parking lot management backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP JSON API server
    Serve {
        /// Port to listen on (falls back to CARPARK_PORT, then 8080)
        #[arg(long)]
        port: Option<u16>,
        /// Seed the lot with this many spaces at startup
        #[arg(long)]
        generate: Option<usize>,
        /// Zone count for the startup seed
        #[arg(long, default_value_t = carpark_core::DEFAULT_ZONE_COUNT)]
        zones: usize,
        /// Run the expiry sweeper every SECS seconds (0 = on demand only)
        #[arg(long, value_name = "SECS", default_value_t = 0)]
        sweep_interval: u64,
    },

    /// Preview the lot layout a generate call would produce
    Layout {
        /// Number of spaces to lay out
        #[arg(long)]
        spaces: usize,
        /// Number of zones to split across
        #[arg(long, default_value_t = carpark_core::DEFAULT_ZONE_COUNT)]
        zones: usize,
        /// Seed for the vehicle-type draw (random when absent)
        #[arg(long)]
        seed: Option<u64>,
        /// Output format (text or json)
        #[arg(long, default_value = "text", value_enum)]
        output: OutputFormat,
    },
}

/// Default port when neither --port nor CARPARK_PORT is given.
const DEFAULT_PORT: u16 = 8080;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            generate,
            zones,
            sweep_interval,
        } => {
            let port = port
                .or_else(|| {
                    std::env::var("CARPARK_PORT")
                        .ok()
                        .and_then(|v| v.parse().ok())
                })
                .unwrap_or(DEFAULT_PORT);
            let opts = serve::ServeOptions {
                port,
                generate,
                zones,
                sweep_interval,
            };
            let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            if let Err(e) = rt.block_on(serve::start_server(opts)) {
                eprintln!("Server error: {e}");
                process::exit(1);
            }
        }
        Commands::Layout {
            spaces,
            zones,
            seed,
            output,
        } => cmd_layout(spaces, zones, seed, output),
    }
}

fn cmd_layout(spaces: usize, zones: usize, seed: Option<u64>, output: OutputFormat) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let layout =
        match carpark_core::generate_layout(spaces, zones, &mut rng, OffsetDateTime::now_utc()) {
            Ok(layout) => layout,
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        };

    match output {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&layout).expect("layout serializes")
            );
        }
        OutputFormat::Text => {
            let mut current_zone = None;
            for space in &layout {
                if current_zone != Some(space.zone) {
                    println!("Zone {}:", space.zone);
                    current_zone = Some(space.zone);
                }
                println!("  {}  {}", space.number, space.vehicle_type);
            }
            println!("{} spaces across {} zones", layout.len(), zones);
        }
    }
}
