//! Main entry point for the cineflow CLI application.

use cineflow::api::{TimeWindow, TmdbClient, TrendingScope};
use cineflow::config::Config;
use cineflow::error::{AppError, Result};
use cineflow::history::WatchState;
use cineflow::player::{EpisodePosition, Navigator, PlayerLocation};
use cineflow::search::{SearchFilter, debounce, filter_results};
use cineflow::storage::FileStore;
use cineflow::tracker::PlayerSession;
use cineflow::types::{MediaType, Title, TitleDetails};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

/// Command-line arguments for the cineflow application.
#[derive(Parser, Debug)]
#[command(
    name = "cineflow",
    version,
    about = "Browse movies and TV shows and keep track of what you watch",
    long_about = "Browse the TMDB catalog, keep a watchlist, and follow playback in an embedded player."
)]
struct Args {
    /// Log verbosity level: 0=error, 1=warn, 2=info, 3=debug, 4=trace
    #[arg(short, long, default_value_t = 1)]
    log: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search movies and shows; without a query, read queries from stdin
    Search {
        query: Option<String>,
        /// Result kinds to show: all, movie or tv
        #[arg(short, long, default_value = "all")]
        filter: SearchFilter,
    },
    /// Trending titles
    Trending {
        /// all, movie or tv
        #[arg(short, long, default_value = "all")]
        media: String,
        /// day or week
        #[arg(short, long, default_value = "week")]
        window: TimeWindow,
    },
    /// Popular movies or shows
    Popular { media: MediaType },
    /// Genres for movies or shows
    Genres { media: MediaType },
    /// Titles in one genre
    Genre { media: MediaType, id: u64 },
    /// Titles similar to one title
    Similar { media: MediaType, id: u64 },
    /// Movie details
    Movie { id: u64 },
    /// Show details and seasons
    Tv { id: u64 },
    /// Episodes of one season
    Season { id: u64, season: u32 },
    /// A person and their credits
    Person { id: u64 },
    /// Show or edit the watchlist
    Watchlist {
        #[command(subcommand)]
        action: Option<WatchlistAction>,
    },
    /// Recently played titles, most recent first
    Continue,
    /// Open the player and track progress
    Play {
        #[command(subcommand)]
        target: PlayCommand,
    },
}

#[derive(Subcommand, Debug)]
enum WatchlistAction {
    List,
    Add { media: MediaType, id: u64 },
    Remove { media: MediaType, id: u64 },
}

#[derive(Subcommand, Debug)]
enum PlayCommand {
    Movie {
        id: u64,
    },
    /// Season and episode default to the last recorded position, else 1/1;
    /// a season other than the recorded one starts at episode 1
    Tv {
        id: u64,
        season: Option<u32>,
        episode: Option<u32>,
    },
}

/// The player address as last pasted on stdin.
#[derive(Default)]
struct PastedLocation(Mutex<Option<String>>);

impl PastedLocation {
    fn set(&self, location: &str) {
        if let Ok(mut current) = self.0.lock() {
            *current = Some(location.to_string());
        }
    }
}

impl PlayerLocation for PastedLocation {
    fn current_location(&self) -> Option<String> {
        self.0.lock().ok()?.clone()
    }
}

/// Prints the page address whenever it changes.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn replace_url(&self, url: &str) {
        println!("  page: {}", url);
    }
}

fn print_titles<'a>(items: impl IntoIterator<Item = &'a Title>) {
    let mut count = 0;
    for item in items {
        println!("{}", item.to_display());
        count += 1;
    }
    if count == 0 {
        println!("No results.");
    }
}

fn print_details(
    client: &TmdbClient,
    details: &TitleDetails,
    media_type: MediaType,
    state: &WatchState<FileStore>,
) {
    let title = &details.title;
    println!("{} ({} {})", title.display_title(), media_type, title.id);

    let mut facts = Vec::new();
    if let Some(year) = title.year() {
        facts.push(year.to_string());
    }
    if let Some(runtime) = details.runtime {
        facts.push(format!("{}m", runtime));
    }
    if let Some(seasons) = details.number_of_seasons {
        facts.push(format!("{} Seasons", seasons));
    }
    if title.vote_average > 0.0 {
        facts.push(format!("★ {:.1}", title.vote_average));
    }
    if let Some(revenue) = details.revenue.filter(|r| *r > 0) {
        facts.push(format!("${}M", revenue / 1_000_000));
    }
    if !facts.is_empty() {
        println!("{}", facts.join(" · "));
    }

    if !details.genres.is_empty() {
        let names: Vec<&str> = details.genres.iter().map(|g| g.name.as_str()).collect();
        println!("{}", names.join(", "));
    }
    if let Some(overview) = title.overview.as_deref().filter(|o| !o.is_empty()) {
        println!("\n{}\n", overview);
    }
    if let Some(director) = details.director() {
        println!("Director: {}", director.name);
    }
    if let Some(logo) = details.logo() {
        if let Some(url) = client.image_url(Some(&logo.file_path), "w500") {
            println!("Logo: {}", url);
        }
    }
    if let Some(trailer) = details.trailer() {
        println!("Trailer: https://www.youtube.com/watch?v={}", trailer.key);
    }

    let cast = details.top_cast(10);
    if !cast.is_empty() {
        println!("Cast:");
        for member in cast {
            match member.character.as_deref() {
                Some(character) if !character.is_empty() => {
                    println!("  {} as {} [{}]", member.name, character, member.id)
                }
                _ => println!("  {} [{}]", member.name, member.id),
            }
        }
    }

    for season in details.regular_seasons() {
        println!("Season {} ({} episodes)", season.season_number, season.episode_count);
    }

    let marker = if state.is_in_watchlist(title.id, media_type) {
        "In Watchlist"
    } else {
        "Not in watchlist"
    };
    println!("{}", marker);
}

async fn details_for(client: &TmdbClient, media_type: MediaType, id: u64) -> Result<TitleDetails> {
    match media_type {
        MediaType::Movie => client.movie_details(id).await,
        MediaType::Tv => client.tv_details(id).await,
    }
}

async fn interactive_search(client: &TmdbClient, filter: SearchFilter, config: &Config) -> Result<()> {
    let (tx, rx) = mpsc::channel(16);
    let mut queries = debounce(rx, config.search_debounce());

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });

    while let Some(query) = queries.recv().await {
        let query = query.trim();
        if query.is_empty() {
            continue;
        }
        match client.search_multi(query).await {
            Ok(results) => print_titles(filter_results(&results, filter)),
            Err(e) => warn!("Search for '{}' failed: {}", query, e),
        }
    }

    Ok(())
}

async fn play(
    target: PlayCommand,
    client: &TmdbClient,
    state: Arc<WatchState<FileStore>>,
    config: &Config,
) -> Result<()> {
    let location = Arc::new(PastedLocation::default());
    let mut session = PlayerSession::new(
        Arc::clone(&state),
        location.clone(),
        Arc::new(ConsoleNavigator),
        &config.player_base_url,
        config.poll_interval(),
    );

    let embed = match target {
        PlayCommand::Movie { id } => {
            let details = client.movie_details(id).await?;
            session.play_movie(&details.playable(MediaType::Movie))?
        }
        PlayCommand::Tv {
            id,
            season,
            episode,
        } => {
            let details = client.tv_details(id).await?;
            let resume = state
                .continue_watching_for(id, MediaType::Tv)
                .and_then(|r| Some(EpisodePosition::new(r.season?, r.episode?)));
            let position = EpisodePosition::starting_point(season, episode, resume);
            session.play_episode(&details.playable(MediaType::Tv), position)?
        }
    };

    println!("Open the player: {}", embed);
    println!("Paste the player's address whenever it changes; 'q' closes the player.");

    let mut changes = state.subscribe();
    let observer_state = Arc::clone(&state);
    let observer = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    if let Some(latest) = observer_state.get_continue_watching().first() {
                        println!("  continue watching: {}", latest.to_display());
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "q" {
            break;
        }
        if !line.is_empty() {
            location.set(line);
        }
    }

    session.close();
    observer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    debug!("Log level set to {:?}", log_level);

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config: {}. Using defaults.", e);
        Config::new()
    });

    let data_dir = config.resolve_data_dir()?;
    info!("Watch state in {}", data_dir.display());
    let state = Arc::new(WatchState::new(FileStore::new(data_dir)));

    if let Err(e) = run(args.command, &config, state).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Command, config: &Config, state: Arc<WatchState<FileStore>>) -> Result<()> {
    // Local-only commands work without an API key.
    match &command {
        Command::Continue => {
            let positions = state.get_continue_watching();
            if positions.is_empty() {
                println!("Nothing in progress.");
            }
            for entry in positions {
                println!("[{} {}] {}", entry.media_type, entry.id, entry.to_display());
            }
            return Ok(());
        }
        Command::Watchlist { action } => match action {
            None | Some(WatchlistAction::List) => {
                let entries = state.get_watchlist();
                if entries.is_empty() {
                    println!("Watchlist is empty.");
                }
                for entry in entries {
                    println!("[{} {}] {}", entry.media_type, entry.id, entry.title);
                }
                return Ok(());
            }
            Some(WatchlistAction::Remove { media, id }) => {
                if !state.is_in_watchlist(*id, *media) {
                    println!("{} {} is not in the watchlist.", media, id);
                    return Ok(());
                }
                state.remove_from_watchlist(*id, *media);
                println!("Removed {} {} from the watchlist.", media, id);
                return Ok(());
            }
            Some(WatchlistAction::Add { .. }) => {}
        },
        _ => {}
    }

    let client = TmdbClient::new(config)?;

    match command {
        Command::Search {
            query: Some(query),
            filter,
        } => {
            let results = client.search_multi(&query).await?;
            let shown = filter_results(&results, filter);
            println!("Found {} result{}", shown.len(), if shown.len() == 1 { "" } else { "s" });
            print_titles(shown);
        }
        Command::Search {
            query: None,
            filter,
        } => interactive_search(&client, filter, config).await?,
        Command::Trending { media, window } => {
            let scope = match media.as_str() {
                "all" => TrendingScope::All,
                other => TrendingScope::Only(other.parse()?),
            };
            print_titles(&client.trending(scope, window).await?);
        }
        Command::Popular { media } => print_titles(&client.popular(media).await?),
        Command::Genres { media } => {
            for genre in client.genres(media).await? {
                println!("[{}] {}", genre.id, genre.name);
            }
        }
        Command::Genre { media, id } => print_titles(&client.by_genre(id, media).await?),
        Command::Similar { media, id } => print_titles(&client.similar(id, media).await?),
        Command::Movie { id } => {
            let details = client.movie_details(id).await?;
            print_details(&client, &details, MediaType::Movie, &state);
            print_recommendations(&client, id, MediaType::Movie).await;
        }
        Command::Tv { id } => {
            let details = client.tv_details(id).await?;
            print_details(&client, &details, MediaType::Tv, &state);
            print_recommendations(&client, id, MediaType::Tv).await;
        }
        Command::Season { id, season } => {
            let details = client.season_details(id, season).await?;
            if details.episodes.is_empty() {
                return Err(AppError::NotFound(format!("season {} of show {}", season, id)));
            }
            for episode in &details.episodes {
                println!("{}", episode.to_display());
            }
        }
        Command::Person { id } => {
            let person = client.person_details(id).await?;
            println!("{}", person.name);
            if let Some(department) = &person.known_for_department {
                println!("Known For: {}", department);
            }
            if let Some(birthday) = &person.birthday {
                println!("Born: {}", birthday);
            }
            if let Some(place) = &person.place_of_birth {
                println!("Place of birth: {}", place);
            }
            if !person.biography.is_empty() {
                println!("\n{}\n", person.biography);
            }
            println!("Known for:");
            print_titles(person.known_for(10));
            println!("Filmography:");
            print_titles(person.filmography());
        }
        Command::Watchlist {
            action: Some(WatchlistAction::Add { media, id }),
        } => {
            let details = details_for(&client, media, id).await?;
            let title = details.playable(media);
            state.add_to_watchlist(title.watchlist_entry());
            println!("Added {} to the watchlist.", title.title);
        }
        Command::Play { target } => play(target, &client, state, config).await?,
        Command::Watchlist { .. } | Command::Continue => {}
    }

    Ok(())
}

async fn print_recommendations(client: &TmdbClient, id: u64, media_type: MediaType) {
    match client.recommendations(id, media_type).await {
        Ok(items) if !items.is_empty() => {
            println!("\nYou May Also Like:");
            print_titles(&items);
        }
        Ok(_) => {}
        Err(e) => warn!("Could not load recommendations: {}", e),
    }
}
