//! A movie and TV discovery client with watch-state tracking.
//!
//! cineflow browses the TMDB catalog (trending, search, details, seasons,
//! people, recommendations) and hands playback to an external embedded player.
//! It keeps two pieces of local state: a watchlist of saved titles and a
//! continue-watching list of the last position reached in each title.
//!
//! # Features
//!
//! - Search movies and shows, with debounced input and kind filters
//! - Title, season and person details
//! - Watchlist and continue-watching persisted under the user data directory
//! - Episode tracking: follows the player as it moves between episodes
//!
//! # Usage
//!
//! ```bash
//! # Search the catalog
//! cargo run -- search "fight club"
//!
//! # Play an episode and track progress
//! cargo run -- play tv 1399 1 1
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod player;
pub mod search;
pub mod storage;
pub mod tracker;
pub mod types;
