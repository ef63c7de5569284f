//! Search helpers: result filtering and debounced query input.

use crate::error::AppError;
use crate::types::{ResultKind, Title};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Which kinds of result to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchFilter {
    #[default]
    All,
    Movie,
    Tv,
}

impl FromStr for SearchFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SearchFilter::All),
            "movie" | "movies" => Ok(SearchFilter::Movie),
            "tv" => Ok(SearchFilter::Tv),
            other => Err(AppError::InvalidInput(format!(
                "unknown filter '{}', expected all, movie or tv",
                other
            ))),
        }
    }
}

impl SearchFilter {
    /// Whether a result passes this filter. People never do.
    pub fn matches(&self, item: &Title) -> bool {
        match (self, item.media_type) {
            (_, Some(ResultKind::Person)) => false,
            (SearchFilter::All, _) => true,
            (SearchFilter::Movie, Some(kind)) => kind == ResultKind::Movie,
            (SearchFilter::Movie, None) => item.title.is_some(),
            (SearchFilter::Tv, Some(kind)) => kind == ResultKind::Tv,
            (SearchFilter::Tv, None) => item.name.is_some() && item.title.is_none(),
        }
    }
}

/// Keep only the results that pass `filter`, preserving order.
pub fn filter_results(results: &[Title], filter: SearchFilter) -> Vec<&Title> {
    results.iter().filter(|item| filter.matches(item)).collect()
}

/// Forward the last value of every burst once `input` has been quiet for
/// `delay`.
///
/// Values arriving within `delay` of each other replace one another; only
/// the newest is emitted. A value still pending when `input` closes is
/// flushed before the output closes.
pub fn debounce<T: Send + 'static>(
    mut input: mpsc::Receiver<T>,
    delay: Duration,
) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut pending: Option<T> = None;

        loop {
            let next = if pending.is_some() {
                tokio::select! {
                    value = input.recv() => Some(value),
                    _ = sleep(delay) => None,
                }
            } else {
                Some(input.recv().await)
            };

            match next {
                // New value: restart the quiet period.
                Some(Some(value)) => pending = Some(value),
                // Input closed.
                Some(None) => {
                    if let Some(value) = pending.take() {
                        let _ = tx.send(value).await;
                    }
                    break;
                }
                // Quiet long enough.
                None => {
                    if let Some(value) = pending.take() {
                        if tx.send(value).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    rx
}
