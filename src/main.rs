use std::{path::PathBuf, process::ExitCode};

use clap::Parser;

/// Geotag photos from a GPS track by matching capture times
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Track files (.kml, .gpx) and photos, in any order; directories are searched recursively
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Location to set on every photo instead of using tracks: "lat,lon" or "lat,lon,alt"
    #[arg(short, long, allow_hyphen_values = true)]
    location: Option<String>,
    /// Also write the results as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
    /// Match and report without modifying any photo
    #[arg(short = 'n', long, action)]
    dry_run: bool,
    #[arg(short, long, action)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match geotrack_tag::run(
        &args.paths,
        args.location.as_deref(),
        args.dry_run,
        args.report.as_deref(),
    ) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e @ geotrack_tag::Error::InvalidLocation { .. }) => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
