use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    config::{load_settings, normalize_database_url},
    CatalogSnapshot, FetchOutcome, GooglePlacesClient, PlaceCatalog,
};
use shared::domain::{PlaceId, PlaceRecord};
use storage::SqlitePreferenceStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Browse historical places and keep track of the ones you visited")]
struct Args {
    /// Overrides the configured places api key.
    #[arg(long)]
    api_key: Option<String>,
    /// Sqlite url or file path for the visited-places store.
    #[arg(long)]
    database_url: Option<String>,
    /// Print snapshots as JSON instead of a listing.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List,
    More,
    Open(PlaceId),
    Toggle(PlaceId),
    Random,
    Retry,
    Sync,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next()?;
        let arg = parts.next().map(PlaceId::from);
        match (verb, arg) {
            ("list" | "ls", None) => Some(Self::List),
            ("more" | "m", None) => Some(Self::More),
            ("open" | "o", Some(id)) => Some(Self::Open(id)),
            ("toggle" | "t", Some(id)) => Some(Self::Toggle(id)),
            ("random" | "r", None) => Some(Self::Random),
            ("retry", None) => Some(Self::Retry),
            ("sync", None) => Some(Self::Sync),
            ("help" | "?", None) => Some(Self::Help),
            ("quit" | "q" | "exit", None) => Some(Self::Quit),
            _ => None,
        }
    }
}

const HELP: &str = "commands: list | more | open <id> | toggle <id> | random | retry | sync | help | quit";

fn render_place(index: usize, place: &PlaceRecord) -> String {
    let mark = if place.visited { "[x]" } else { "[ ]" };
    format!(
        "{index:>3}. {mark} {} ({}) - {}\n       id={}",
        place.name,
        place.rating_label(),
        place.description,
        place.id
    )
}

fn render(snapshot: &CatalogSnapshot, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(snapshot)?);
    }
    if let Some(error) = &snapshot.error {
        return Ok(format!("Error: {error}\n(type `retry` to reload the list)"));
    }

    let mut out = snapshot
        .places
        .iter()
        .enumerate()
        .map(|(i, place)| render_place(i + 1, place))
        .collect::<Vec<_>>()
        .join("\n");
    if snapshot.page_cursor.is_some() {
        out.push_str("\n     ... `more` loads the next page");
    }
    Ok(out)
}

fn render_detail(snapshot: &CatalogSnapshot, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&snapshot.current_place)?);
    }
    if let Some(error) = &snapshot.error {
        return Ok(format!("Error: {error}"));
    }
    let Some(place) = &snapshot.current_place else {
        return Ok("Loading...".to_string());
    };
    Ok(format!(
        "{}\n  {}\n  Rating: {}\n  Image: {}\n  Status: {}",
        place.name,
        place.description,
        place.rating_label(),
        place.image_url,
        if place.visited { "Visited" } else { "Not visited" }
    ))
}

fn toggle_message(id: &PlaceId, result: Result<Option<bool>>) -> String {
    match result {
        Ok(Some(true)) => format!("{id} marked visited"),
        Ok(Some(false)) => format!("{id} marked not visited"),
        Ok(None) => format!("{id} is not loaded"),
        Err(err) => format!("Error: could not save {id}: {err:#}"),
    }
}

fn pick_index(len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as usize)
        .unwrap_or_default();
    Some(nanos % len)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(api_key) = args.api_key {
        settings.api_key = api_key;
    }
    if let Some(database_url) = args.database_url {
        settings.preferences_database_url = database_url;
    }
    if settings.api_key.trim().is_empty() {
        bail!("no places api key configured; pass --api-key or set PLACES_API_KEY");
    }

    let database_url = normalize_database_url(&settings.preferences_database_url);
    let store = SqlitePreferenceStore::new(&database_url)
        .await
        .with_context(|| format!("failed to open preferences store at {database_url}"))?;
    let api = GooglePlacesClient::new(&settings)?;
    let catalog = PlaceCatalog::new(Arc::new(api), Arc::new(store));
    info!(%database_url, query = %settings.search_query, "places: catalog ready");

    catalog.retry().await;
    println!("{}", render(&catalog.snapshot().await, args.json)?);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = Command::parse(&line) else {
            if !line.trim().is_empty() {
                println!("unrecognized input; {HELP}");
            }
            continue;
        };

        match command {
            Command::List => println!("{}", render(&catalog.snapshot().await, args.json)?),
            Command::More => {
                if catalog.load_more().await == FetchOutcome::Skipped {
                    println!("no further pages");
                } else {
                    println!("{}", render(&catalog.snapshot().await, args.json)?);
                }
            }
            Command::Open(id) => {
                catalog.open_place(&id).await;
                println!("{}", render_detail(&catalog.snapshot().await, args.json)?);
            }
            Command::Toggle(id) => {
                let result = catalog.toggle_visited(&id).await;
                println!("{}", toggle_message(&id, result));
            }
            Command::Random => {
                let snapshot = catalog.snapshot().await;
                match pick_index(snapshot.places.len()).and_then(|i| snapshot.places.get(i)) {
                    Some(place) => {
                        let id = place.id.clone();
                        catalog.open_place(&id).await;
                        println!("{}", render_detail(&catalog.snapshot().await, args.json)?);
                    }
                    None => println!("nothing to suggest yet"),
                }
            }
            Command::Retry => {
                catalog.retry().await;
                println!("{}", render(&catalog.snapshot().await, args.json)?);
            }
            Command::Sync => {
                catalog.sync_visited_state().await;
                println!("{}", render(&catalog.snapshot().await, args.json)?);
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    Ok(())
}
