//! Addressing for the embedded player and the shareable page URLs.
//!
//! The player is an external page; we only build the address we hand it and
//! read back whatever address it reports while playing.

use crate::types::MediaType;
use regex::Regex;
use std::sync::LazyLock;

/// Query marker that tells the page to open straight into the player.
pub const WATCH_MARKER: &str = "watch=true";

static EPISODE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/tv/(\d+)/(\d+)/(\d+)").expect("episode path pattern is valid"));

/// A season/episode pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpisodePosition {
    pub season: u32,
    pub episode: u32,
}

impl EpisodePosition {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }

    /// Where to start playing, given what the user asked for and the last
    /// recorded position.
    ///
    /// A missing season resumes the recorded season. A missing episode
    /// resumes the recorded episode only within the recorded season, and is
    /// 1 otherwise.
    pub fn starting_point(
        season: Option<u32>,
        episode: Option<u32>,
        resume: Option<EpisodePosition>,
    ) -> Self {
        let season = season.or(resume.map(|r| r.season)).unwrap_or(1);
        let episode = episode
            .or(resume.filter(|r| r.season == season).map(|r| r.episode))
            .unwrap_or(1);
        Self::new(season, episode)
    }
}

/// What the player is asked to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayTarget {
    Movie { id: u64 },
    Episode { id: u64, position: EpisodePosition },
}

impl PlayTarget {
    pub fn id(&self) -> u64 {
        match self {
            PlayTarget::Movie { id } | PlayTarget::Episode { id, .. } => *id,
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            PlayTarget::Movie { .. } => MediaType::Movie,
            PlayTarget::Episode { .. } => MediaType::Tv,
        }
    }

    fn path(&self) -> String {
        match self {
            PlayTarget::Movie { id } => format!("/movie/{}", id),
            PlayTarget::Episode { id, position } => {
                format!("/tv/{}/{}/{}", id, position.season, position.episode)
            }
        }
    }
}

/// Address of the embedded player for `target`.
///
/// # Examples
///
/// ```
/// use cineflow::player::{embed_url, EpisodePosition, PlayTarget};
///
/// let url = embed_url(
///     "https://player.example/embed/",
///     &PlayTarget::Episode { id: 1399, position: EpisodePosition::new(1, 3) },
/// );
/// assert_eq!(url, "https://player.example/embed/tv/1399/1/3");
/// ```
pub fn embed_url(base: &str, target: &PlayTarget) -> String {
    format!("{}{}", base.trim_end_matches('/'), target.path())
}

/// Shareable page path for `target`, optionally in watch mode.
///
/// # Examples
///
/// ```
/// use cineflow::player::{page_url, PlayTarget};
///
/// assert_eq!(page_url(&PlayTarget::Movie { id: 550 }, true), "/movie/550?watch=true");
/// assert_eq!(page_url(&PlayTarget::Movie { id: 550 }, false), "/movie/550");
/// ```
pub fn page_url(target: &PlayTarget, watch_mode: bool) -> String {
    if watch_mode {
        format!("{}?{}", target.path(), WATCH_MARKER)
    } else {
        target.path()
    }
}

/// Pull the season and episode out of a player address of the form
/// `.../tv/{show}/{season}/{episode}`.
///
/// Returns `None` when the pattern is absent or a number does not fit.
pub fn parse_episode_location(location: &str) -> Option<EpisodePosition> {
    let caps = EPISODE_PATH.captures(location)?;
    let season = caps[2].parse().ok()?;
    let episode = caps[3].parse().ok()?;
    Some(EpisodePosition { season, episode })
}

/// Read access to the player's current address.
///
/// Reads may fail, as with a cross-origin frame; that is `None`, not an error.
pub trait PlayerLocation: Send + Sync {
    fn current_location(&self) -> Option<String>;
}

/// The visible, shareable address of the page hosting the player.
pub trait Navigator: Send + Sync {
    /// Replace the current address without adding a history entry.
    fn replace_url(&self, url: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_url_movie() {
        assert_eq!(
            embed_url("https://vidzy.luna.tattoo/embed", &PlayTarget::Movie { id: 550 }),
            "https://vidzy.luna.tattoo/embed/movie/550"
        );
    }

    #[test]
    fn test_page_url_episode() {
        let target = PlayTarget::Episode {
            id: 1399,
            position: EpisodePosition::new(2, 4),
        };
        assert_eq!(page_url(&target, true), "/tv/1399/2/4?watch=true");
        assert_eq!(page_url(&target, false), "/tv/1399/2/4");
        assert_eq!(target.media_type(), MediaType::Tv);
        assert_eq!(target.id(), 1399);
    }

    #[test]
    fn test_starting_point_resumes_recorded_position() {
        let resume = Some(EpisodePosition::new(3, 7));
        assert_eq!(
            EpisodePosition::starting_point(None, None, resume),
            EpisodePosition::new(3, 7)
        );
        assert_eq!(
            EpisodePosition::starting_point(Some(3), None, resume),
            EpisodePosition::new(3, 7)
        );
        assert_eq!(
            EpisodePosition::starting_point(None, None, None),
            EpisodePosition::new(1, 1)
        );
    }

    #[test]
    fn test_starting_point_other_season_starts_at_first_episode() {
        let resume = Some(EpisodePosition::new(3, 7));
        assert_eq!(
            EpisodePosition::starting_point(Some(1), None, resume),
            EpisodePosition::new(1, 1)
        );
        assert_eq!(
            EpisodePosition::starting_point(Some(1), Some(4), resume),
            EpisodePosition::new(1, 4)
        );
    }

    #[test]
    fn test_parse_episode_location() {
        assert_eq!(
            parse_episode_location("https://vidzy.luna.tattoo/embed/tv/1399/1/4"),
            Some(EpisodePosition::new(1, 4))
        );
        assert_eq!(
            parse_episode_location("https://player.example/embed/tv/1399/10/12?autoplay=1"),
            Some(EpisodePosition::new(10, 12))
        );
    }

    #[test]
    fn test_parse_episode_location_rejects_other_paths() {
        assert_eq!(parse_episode_location("https://ads.example/interstitial?next=1"), None);
        assert_eq!(parse_episode_location("https://player.example/embed/movie/550"), None);
        assert_eq!(parse_episode_location("https://player.example/embed/tv/1399/1"), None);
        assert_eq!(parse_episode_location("about:blank"), None);
        assert_eq!(parse_episode_location(""), None);
    }

    #[test]
    fn test_parse_episode_location_overflow_is_no_match() {
        assert_eq!(parse_episode_location("/tv/1/99999999999/1"), None);
    }
}
