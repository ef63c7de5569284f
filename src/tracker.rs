//! Playback session and episode-progress tracking.
//!
//! While a show is playing, the embedded player can move on to the next
//! episode by itself. [`EpisodeTracker`] polls the player's address on a fixed
//! interval and, when the season or episode changes, records the new position
//! and rewrites the page address to match.
//!
//! [`PlayerSession`] is the `Idle`/`Playing` state machine around it: entering
//! `Playing` records the starting position, leaving it stops the tracker and
//! drops the watch marker from the page address.

use crate::error::{AppError, Result};
use crate::history::WatchState;
use crate::player::{
    EpisodePosition, Navigator, PlayTarget, PlayerLocation, embed_url, page_url,
    parse_episode_location,
};
use crate::storage::KeyValueStore;
use crate::types::{ContinueWatchingEntry, MediaType, PlayableTitle};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// What one poll of the player found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The player address could not be read.
    Unavailable,
    /// The address did not look like an episode address.
    Unrecognized,
    /// Same episode as before.
    Unchanged,
    /// The player moved to a new episode, now recorded.
    Advanced(EpisodePosition),
}

/// Per-session polling state, shared between the task and its handle.
struct Ticker<S> {
    state: Arc<WatchState<S>>,
    location: Arc<dyn PlayerLocation>,
    navigator: Arc<dyn Navigator>,
    title: PlayableTitle,
    position: EpisodePosition,
    last_unrecognized: Option<String>,
    cancelled: bool,
}

impl<S: KeyValueStore> Ticker<S> {
    fn tick(&mut self) -> TickOutcome {
        let Some(location) = self.location.current_location() else {
            return TickOutcome::Unavailable;
        };

        let Some(position) = parse_episode_location(&location) else {
            // Say it once per address so a changed player URL scheme is visible
            // in debug logs without flooding them every interval.
            if self.last_unrecognized.as_deref() != Some(location.as_str()) {
                debug!("Player address not recognised as an episode: {}", location);
                self.last_unrecognized = Some(location);
            }
            return TickOutcome::Unrecognized;
        };
        self.last_unrecognized = None;

        if position == self.position {
            return TickOutcome::Unchanged;
        }

        info!(
            "Player moved to S{}E{} of {}",
            position.season, position.episode, self.title.title
        );
        self.position = position;

        let target = PlayTarget::Episode {
            id: self.title.id,
            position,
        };
        self.navigator.replace_url(&page_url(&target, true));
        self.state.add_to_continue_watching(ContinueWatchingEntry::episode(
            self.title.id,
            &self.title.title,
            &self.title.poster,
            position.season,
            position.episode,
        ));

        TickOutcome::Advanced(position)
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicked tick leaves nothing half-written worth refusing to read.
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Type-erased view of a ticker so handles need not carry the store type.
trait TickerControl: Send {
    fn cancel(&mut self);
    fn position(&self) -> EpisodePosition;
}

impl<S: KeyValueStore> TickerControl for Ticker<S> {
    fn cancel(&mut self) {
        self.cancelled = true;
    }

    fn position(&self) -> EpisodePosition {
        self.position
    }
}

/// Background poller for one show.
pub struct EpisodeTracker;

impl EpisodeTracker {
    /// Start polling every `period`, beginning one period from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S: KeyValueStore + 'static>(
        state: Arc<WatchState<S>>,
        location: Arc<dyn PlayerLocation>,
        navigator: Arc<dyn Navigator>,
        title: PlayableTitle,
        position: EpisodePosition,
        period: Duration,
    ) -> TrackerHandle {
        let ticker = Arc::new(Mutex::new(Ticker {
            state,
            location,
            navigator,
            title,
            position,
            last_unrecognized: None,
            cancelled: false,
        }));

        let shared = Arc::clone(&ticker);
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;
                let mut ticker = lock(&shared);
                if ticker.cancelled {
                    break;
                }
                ticker.tick();
            }
        });

        let control: Arc<Mutex<dyn TickerControl>> = ticker;
        TrackerHandle {
            control,
            task: Some(task),
        }
    }
}

/// Owner of a running tracker. Cancelling, or dropping the handle, stops it.
pub struct TrackerHandle {
    control: Arc<Mutex<dyn TickerControl>>,
    task: Option<JoinHandle<()>>,
}

impl TrackerHandle {
    /// Stop polling. Safe to call more than once.
    ///
    /// Once this returns no further tick runs; a tick already in progress
    /// finishes first because ticks and cancellation share one lock.
    pub fn cancel(&mut self) {
        lock(&self.control).cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Episode tracker stopped");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_none()
    }

    /// Last position the tracker knows about.
    pub fn position(&self) -> EpisodePosition {
        lock(&self.control).position()
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Public view of a session's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing(PlayTarget),
}

enum Phase {
    Idle,
    Playing {
        title: PlayableTitle,
        target: PlayTarget,
        tracker: Option<TrackerHandle>,
    },
}

/// The player view of one page.
pub struct PlayerSession<S> {
    state: Arc<WatchState<S>>,
    location: Arc<dyn PlayerLocation>,
    navigator: Arc<dyn Navigator>,
    player_base_url: String,
    poll_interval: Duration,
    phase: Phase,
}

impl<S: KeyValueStore + 'static> PlayerSession<S> {
    pub fn new(
        state: Arc<WatchState<S>>,
        location: Arc<dyn PlayerLocation>,
        navigator: Arc<dyn Navigator>,
        player_base_url: &str,
        poll_interval: Duration,
    ) -> Self {
        Self {
            state,
            location,
            navigator,
            player_base_url: player_base_url.to_string(),
            poll_interval,
            phase: Phase::Idle,
        }
    }

    /// Current state. For a show, the position is the tracker's latest.
    pub fn state(&self) -> SessionState {
        match &self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Playing { target, tracker, .. } => {
                SessionState::Playing(current_target(target, tracker.as_ref()))
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.phase, Phase::Playing { .. })
    }

    /// Open the player on a movie. Returns the embed address.
    pub fn play_movie(&mut self, title: &PlayableTitle) -> Result<String> {
        ensure_media_type(title, MediaType::Movie)?;
        let target = PlayTarget::Movie { id: title.id };

        self.enter(title, target, None);
        self.state
            .add_to_continue_watching(ContinueWatchingEntry::movie(title.id, &title.title, &title.poster));

        Ok(embed_url(&self.player_base_url, &target))
    }

    /// Open the player on an episode and start tracking it. Returns the embed
    /// address.
    ///
    /// Must be called from within a tokio runtime.
    pub fn play_episode(&mut self, title: &PlayableTitle, position: EpisodePosition) -> Result<String> {
        ensure_media_type(title, MediaType::Tv)?;
        let target = PlayTarget::Episode {
            id: title.id,
            position,
        };

        // Stop any previous tracker before the new position is recorded.
        self.phase = Phase::Idle;

        let tracker = EpisodeTracker::start(
            Arc::clone(&self.state),
            Arc::clone(&self.location),
            Arc::clone(&self.navigator),
            title.clone(),
            position,
            self.poll_interval,
        );
        self.enter(title, target, Some(tracker));
        self.state.add_to_continue_watching(ContinueWatchingEntry::episode(
            title.id,
            &title.title,
            &title.poster,
            position.season,
            position.episode,
        ));

        Ok(embed_url(&self.player_base_url, &target))
    }

    /// Close the player. The last recorded position stands; nothing is
    /// written here. Closing an idle session does nothing.
    pub fn close(&mut self) {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let Phase::Playing {
            title,
            target,
            mut tracker,
        } = phase
        else {
            return;
        };

        let target = current_target(&target, tracker.as_ref());
        if let Some(tracker) = tracker.as_mut() {
            tracker.cancel();
        }

        debug!("Closed player for {}", title.title);
        self.navigator.replace_url(&page_url(&target, false));
    }

    fn enter(&mut self, title: &PlayableTitle, target: PlayTarget, tracker: Option<TrackerHandle>) {
        info!("Playing {} ({} {})", title.title, target.media_type(), target.id());
        self.navigator.replace_url(&page_url(&target, true));
        self.phase = Phase::Playing {
            title: title.clone(),
            target,
            tracker,
        };
    }
}

fn current_target(target: &PlayTarget, tracker: Option<&TrackerHandle>) -> PlayTarget {
    match (target, tracker) {
        (PlayTarget::Episode { id, .. }, Some(tracker)) => PlayTarget::Episode {
            id: *id,
            position: tracker.position(),
        },
        _ => *target,
    }
}

fn ensure_media_type(title: &PlayableTitle, expected: MediaType) -> Result<()> {
    if title.media_type != expected {
        return Err(AppError::InvalidInput(format!(
            "{} {} cannot be played as a {}",
            title.media_type, title.id, expected
        )));
    }
    Ok(())
}
