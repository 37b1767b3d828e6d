use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::animation::{RotationAnimation, RotationAnimator};
use crate::countries::CountryFeature;
use crate::projection::{GeoPoint, Rotation};
use crate::rotation::SharedRotation;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Countries are still loading.")]
    NotLoaded,

    #[error("Please enter a country name.")]
    EmptyQuery,

    #[error("No country matching \"{0}\" found.")]
    NotFound(String),
}

/// First feature with a candidate name containing `query`, ignoring case.
pub fn search(query: &str, countries: &[CountryFeature]) -> Result<usize, SearchError> {
    if countries.is_empty() {
        return Err(SearchError::NotLoaded);
    }

    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    countries
        .iter()
        .position(|country| {
            country
                .names
                .candidates()
                .any(|candidate| candidate.to_lowercase().contains(&needle))
        })
        .ok_or_else(|| SearchError::NotFound(query.trim().to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Rotating,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    Searching,
    Found { index: usize, phase: RotationPhase },
    NotFound,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub index: usize,
    pub centroid: GeoPoint,
    pub target: Rotation,
}

/// Country lookup driving a fly-to rotation of its own globe group.
pub struct GeoSearchSelector {
    group: SharedRotation,
    duration: Duration,
    state: SelectionState,
    selected: Option<usize>,
}

impl GeoSearchSelector {
    pub fn new(group: SharedRotation, duration: Duration) -> Self {
        Self {
            group,
            duration,
            state: SelectionState::Idle,
            selected: None,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// The rotation group the fly-to animates.
    pub fn group(&self) -> &SharedRotation {
        &self.group
    }

    /// Run a search and, on a match, start rotating toward its centroid.
    ///
    /// - no countries loaded yet, or empty query: nothing changes,
    /// - no match: rotation untouched, previous selection cleared,
    /// - match: any in-flight animation of the group is cancelled first.
    pub fn submit(
        &mut self,
        query: &str,
        countries: &[CountryFeature],
        animator: &mut RotationAnimator,
        now: Instant,
    ) -> Result<SearchHit, SearchError> {
        let index = match search(query, countries) {
            Ok(index) => index,
            Err(e @ (SearchError::NotLoaded | SearchError::EmptyQuery)) => return Err(e),
            Err(e) => {
                self.state = SelectionState::NotFound;
                self.selected = None;
                info!(query, "country search found nothing");
                return Err(e);
            }
        };
        self.state = SelectionState::Searching;

        let country = &countries[index];
        let centroid = country.centroid().unwrap_or_else(|| {
            // Degenerate geometry: keep looking where we are.
            self.group.borrow().rotation().center()
        });
        let target = Rotation::facing(centroid);

        let (group_id, from) = {
            let group = self.group.borrow();
            (group.id(), group.rotation())
        };
        animator.start(
            group_id,
            RotationAnimation::new(from, target, now, self.duration),
        );

        self.selected = Some(index);
        self.state = SelectionState::Found {
            index,
            phase: RotationPhase::Rotating,
        };
        info!(
            query,
            country = country.display_name(),
            longitude = centroid.longitude,
            latitude = centroid.latitude,
            "country selected"
        );

        Ok(SearchHit {
            index,
            centroid,
            target,
        })
    }

    /// Mark the fly-to rotation as finished.
    pub fn settle(&mut self) {
        if let SelectionState::Found { index, .. } = self.state {
            debug!(index, "search rotation settled");
            self.state = SelectionState::Found {
                index,
                phase: RotationPhase::Settled,
            };
        }
    }

    /// Back to idle; the selection is kept for the drill-down view.
    pub fn reset(&mut self) {
        self.state = SelectionState::Idle;
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.state = SelectionState::Idle;
    }
}
