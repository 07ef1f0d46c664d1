use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tripcal::calendar::{CalendarError, build_calendar};
use tripcal::distance::{DistanceCache, DistanceProvider, NoDistances};
use tripcal::parser::TripParser;
use tripcal::render::render_calendar_html;
use tripcal::storage::{FsTripStore, TripSource, TripStore};

#[derive(Debug, Parser)]
#[command(
    name = "tripcal",
    about = "Trip itinerary parsing and calendar rendering",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a trip file as a standalone HTML calendar page.
    Render(RenderArgs),

    /// Parse a trip file and print its structure.
    Parse(ParseArgs),

    /// List the trips in a trips directory.
    List(ListArgs),

    /// Create a new trip file seeded with a title directive.
    New(NewArgs),
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// Trip file to render.
    input: PathBuf,
    /// Optional JSON distance cache for travel-day annotations.
    #[arg(long)]
    distances: Option<PathBuf>,
    /// Write the HTML to this path instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Trip file to parse.
    input: PathBuf,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Directory containing trip files.
    dir: PathBuf,
}

#[derive(Debug, Args)]
struct NewArgs {
    /// Directory to create the trip file in.
    dir: PathBuf,
    /// Trip name (becomes the file name; sanitized).
    name: String,
    /// Display title. Defaults to the trip name.
    #[arg(long)]
    title: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    match cli.command {
        Commands::Render(args) => handle_render(args, verbose),
        Commands::Parse(args) => handle_parse(args, verbose),
        Commands::List(args) => handle_list(args, verbose),
        Commands::New(args) => handle_new(args, verbose),
    }
}

fn handle_render(args: RenderArgs, verbose: bool) -> Result<()> {
    let RenderArgs {
        input,
        distances,
        output,
    } = args;

    if verbose {
        eprintln!("Parsing {:?}", input);
    }
    let trip = TripParser.parse_trip(&input)?;

    let calendar = match build_calendar(&trip) {
        Ok(calendar) => calendar,
        Err(CalendarError::NoEvents) => {
            for warning in &trip.warnings {
                eprintln!("warning: {warning}");
            }
            println!("No dates found in {:?}; nothing to render.", input);
            return Ok(());
        }
    };
    for warning in &calendar.warnings {
        eprintln!("warning: {warning}");
    }

    let provider: Box<dyn DistanceProvider> = match distances {
        Some(path) => {
            if verbose {
                eprintln!("Loading distance cache {:?}", path);
            }
            Box::new(DistanceCache::load(&path)?)
        }
        None => Box::new(NoDistances),
    };

    let html = render_calendar_html(&calendar, provider.as_ref());
    match output {
        Some(path) => {
            fs::write(&path, html.as_bytes()).with_context(|| format!("writing {:?}", path))?;
            println!("Wrote calendar to {:?}", path);
        }
        None => print!("{html}"),
    }
    Ok(())
}

fn handle_parse(args: ParseArgs, verbose: bool) -> Result<()> {
    let ParseArgs { input, json } = args;

    if verbose {
        eprintln!("Parsing {:?}", input);
    }
    let trip = TripParser.parse_trip(&input)?;
    for warning in &trip.warnings {
        eprintln!("warning: {warning}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&trip)?);
    } else {
        println!("{:#?}", trip);
    }
    Ok(())
}

fn handle_list(args: ListArgs, verbose: bool) -> Result<()> {
    let ListArgs { dir } = args;

    if verbose {
        eprintln!("Scanning {:?}", dir);
    }
    let store = FsTripStore::new(&dir);
    let trips = store.list()?;
    if trips.is_empty() {
        println!("No trips found in {:?}.", dir);
        return Ok(());
    }
    for trip in trips {
        println!("{:<20} {}", trip.name, trip.title);
    }
    Ok(())
}

fn handle_new(args: NewArgs, verbose: bool) -> Result<()> {
    let NewArgs { dir, name, title } = args;

    let store = FsTripStore::new(&dir);
    let title = title.unwrap_or_else(|| name.clone());
    let path = store.create(&name, &title)?;
    if verbose {
        eprintln!("Seeded {:?} with a title directive", path);
    }
    println!("Created {:?}", path);
    Ok(())
}
