//! Type definitions for the cineflow application.
//!
//! This module contains the catalog records returned by TMDB and the entity
//! shapes persisted by the watch-state store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Kind of title that can be watched and tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            other => Err(AppError::InvalidInput(format!(
                "unknown media type '{}', expected 'movie' or 'tv'",
                other
            ))),
        }
    }
}

/// The `media_type` tag on mixed search results, which may also be a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Movie,
    Tv,
    Person,
}

impl ResultKind {
    /// The watchable media type, if any.
    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            ResultKind::Movie => Some(MediaType::Movie),
            ResultKind::Tv => Some(MediaType::Tv),
            ResultKind::Person => None,
        }
    }
}

/// Composite identity shared by watchlist and continue-watching entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TitleKey {
    pub id: u64,
    pub media_type: MediaType,
}

impl TitleKey {
    pub fn new(id: u64, media_type: MediaType) -> Self {
        Self { id, media_type }
    }
}

/// A title saved by the user for later viewing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub id: u64,
    pub media_type: MediaType,
    pub title: String,
    /// Relative TMDB image path, or empty.
    #[serde(default)]
    pub poster: String,
}

impl WatchlistEntry {
    pub fn key(&self) -> TitleKey {
        TitleKey::new(self.id, self.media_type)
    }
}

/// Last known playback position for a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueWatchingEntry {
    pub id: u64,
    pub media_type: MediaType,
    pub title: String,
    #[serde(default)]
    pub poster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    /// Milliseconds since the Unix epoch; stamped by the store on every write.
    #[serde(default)]
    pub last_watched_at: u64,
}

impl ContinueWatchingEntry {
    /// Position for a movie: no season or episode.
    pub fn movie(id: u64, title: &str, poster: &str) -> Self {
        Self {
            id,
            media_type: MediaType::Movie,
            title: title.to_string(),
            poster: poster.to_string(),
            season: None,
            episode: None,
            last_watched_at: 0,
        }
    }

    pub fn episode(id: u64, title: &str, poster: &str, season: u32, episode: u32) -> Self {
        Self {
            id,
            media_type: MediaType::Tv,
            title: title.to_string(),
            poster: poster.to_string(),
            season: Some(season),
            episode: Some(episode),
            last_watched_at: 0,
        }
    }

    pub fn key(&self) -> TitleKey {
        TitleKey::new(self.id, self.media_type)
    }

    /// Format the entry for display in lists.
    ///
    /// # Examples
    ///
    /// ```
    /// use cineflow::types::ContinueWatchingEntry;
    ///
    /// let entry = ContinueWatchingEntry::episode(1399, "Game of Thrones", "", 1, 2);
    /// assert_eq!(entry.to_display(), "Game of Thrones S1E2");
    ///
    /// let movie = ContinueWatchingEntry::movie(550, "Fight Club", "/p.jpg");
    /// assert_eq!(movie.to_display(), "Fight Club");
    /// ```
    pub fn to_display(&self) -> String {
        match (self.season, self.episode) {
            (Some(s), Some(e)) => format!("{} S{}E{}", self.title, s, e),
            _ => self.title.clone(),
        }
    }
}

/// Identity and artwork of something being played, as known to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableTitle {
    pub id: u64,
    pub media_type: MediaType,
    pub title: String,
    pub poster: String,
}

impl PlayableTitle {
    pub fn new(id: u64, media_type: MediaType, title: &str, poster: &str) -> Self {
        Self {
            id,
            media_type,
            title: title.to_string(),
            poster: poster.to_string(),
        }
    }

    pub fn watchlist_entry(&self) -> WatchlistEntry {
        WatchlistEntry {
            id: self.id,
            media_type: self.media_type,
            title: self.title.clone(),
            poster: self.poster.clone(),
        }
    }
}

/// A search, list or credit item from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
    #[serde(default)]
    pub media_type: Option<ResultKind>,
}

impl Title {
    /// Title, else name, else "Untitled".
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.name.as_deref().filter(|n| !n.is_empty()))
            .unwrap_or("Untitled")
    }

    /// Release year taken from the release or first-air date.
    pub fn year(&self) -> Option<&str> {
        self.release_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(self.first_air_date.as_deref().filter(|d| !d.is_empty()))
            .and_then(|d| d.split('-').next())
    }

    /// Explicit media type, else movie when a `title` is present, else tv.
    ///
    /// Returns `None` for people.
    pub fn inferred_media_type(&self) -> Option<MediaType> {
        match self.media_type {
            Some(kind) => kind.media_type(),
            None if self.title.is_some() => Some(MediaType::Movie),
            None => Some(MediaType::Tv),
        }
    }

    /// Date used to order filmographies; undated credits sort last.
    pub fn sort_date(&self) -> &str {
        self.release_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(self.first_air_date.as_deref().filter(|d| !d.is_empty()))
            .unwrap_or("1900-01-01")
    }

    /// Format the title for display in result lists.
    ///
    /// # Examples
    ///
    /// ```
    /// use cineflow::types::Title;
    ///
    /// let item: Title = serde_json::from_str(
    ///     r#"{"id": 550, "title": "Fight Club", "release_date": "1999-10-15", "vote_average": 8.4}"#,
    /// ).unwrap();
    /// assert_eq!(item.to_display(), "[movie 550] Fight Club (1999) ★ 8.4");
    /// ```
    pub fn to_display(&self) -> String {
        let kind = self
            .inferred_media_type()
            .map(|m| m.as_str())
            .unwrap_or("person");
        let mut line = format!("[{} {}] {}", kind, self.id, self.display_title());
        if let Some(year) = self.year() {
            line.push_str(&format!(" ({})", year));
        }
        if self.vote_average > 0.0 {
            line.push_str(&format!(" ★ {:.1}", self.vote_average));
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewMember {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub job: String,
    #[serde(default)]
    pub department: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub key: String,
    pub name: String,
    pub site: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub official: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Videos {
    #[serde(default)]
    pub results: Vec<Video>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logo {
    pub file_path: String,
    #[serde(default)]
    pub aspect_ratio: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Images {
    #[serde(default)]
    pub logos: Vec<Logo>,
}

/// Season summary as listed on a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: u64,
    pub season_number: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub episode_count: u32,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub overview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: u64,
    pub episode_number: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub still_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub runtime: Option<u32>,
}

impl Episode {
    /// Format the episode for display in selection menus.
    ///
    /// # Examples
    ///
    /// ```
    /// use cineflow::types::Episode;
    ///
    /// let ep: Episode = serde_json::from_str(
    ///     r#"{"id": 63056, "episode_number": 1, "name": "Winter Is Coming", "runtime": 62}"#,
    /// ).unwrap();
    /// assert_eq!(ep.to_display(), "1. Winter Is Coming (62m)");
    /// ```
    pub fn to_display(&self) -> String {
        match self.runtime {
            Some(runtime) => format!("{}. {} ({}m)", self.episode_number, self.name, runtime),
            None => format!("{}. {}", self.episode_number, self.name),
        }
    }
}

/// Episodes of one season.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeasonDetails {
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// Full record for a movie or a show, with appended credits, videos and images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleDetails {
    #[serde(flatten)]
    pub title: Title,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub credits: Option<Credits>,
    #[serde(default)]
    pub videos: Option<Videos>,
    #[serde(default)]
    pub revenue: Option<u64>,
    #[serde(default)]
    pub budget: Option<u64>,
    #[serde(default)]
    pub number_of_seasons: Option<u32>,
    #[serde(default)]
    pub number_of_episodes: Option<u32>,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub images: Option<Images>,
}

impl TitleDetails {
    /// First `Trailer` video hosted on YouTube.
    pub fn trailer(&self) -> Option<&Video> {
        self.videos
            .as_ref()?
            .results
            .iter()
            .find(|v| v.kind == "Trailer" && v.site == "YouTube")
    }

    /// First logo with a usable image path.
    pub fn logo(&self) -> Option<&Logo> {
        self.images
            .as_ref()?
            .logos
            .iter()
            .find(|l| !l.file_path.is_empty())
    }

    pub fn director(&self) -> Option<&CrewMember> {
        self.credits
            .as_ref()?
            .crew
            .iter()
            .find(|c| c.job == "Director")
    }

    pub fn top_cast(&self, limit: usize) -> &[CastMember] {
        match &self.credits {
            Some(credits) => &credits.cast[..credits.cast.len().min(limit)],
            None => &[],
        }
    }

    /// Seasons a viewer can pick from; specials (season 0) are excluded.
    pub fn regular_seasons(&self) -> impl Iterator<Item = &Season> {
        self.seasons.iter().filter(|s| s.season_number > 0)
    }

    pub fn playable(&self, media_type: MediaType) -> PlayableTitle {
        PlayableTitle::new(
            self.title.id,
            media_type,
            self.title.display_title(),
            self.title.poster_path.as_deref().unwrap_or(""),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CombinedCredits {
    #[serde(default)]
    pub cast: Vec<Title>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDetails {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub biography: String,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub place_of_birth: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
    #[serde(default)]
    pub known_for_department: Option<String>,
    #[serde(default)]
    pub combined_credits: Option<CombinedCredits>,
}

impl PersonDetails {
    fn credits(&self) -> Vec<&Title> {
        self.combined_credits
            .as_ref()
            .map(|c| c.cast.iter().collect())
            .unwrap_or_default()
    }

    /// Highest rated credits first.
    pub fn known_for(&self, limit: usize) -> Vec<&Title> {
        let mut credits = self.credits();
        credits.sort_by(|a, b| b.vote_average.total_cmp(&a.vote_average));
        credits.truncate(limit);
        credits
    }

    /// All credits, newest first.
    pub fn filmography(&self) -> Vec<&Title> {
        let mut credits = self.credits();
        credits.sort_by(|a, b| b.sort_date().cmp(a.sort_date()));
        credits
    }
}
