//! What the navigator tells its subscribers

use crate::types::Listing;
use serde::Serialize;

/// Where a rendered listing came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingSource {
    /// Served from the entry store without waiting on the network
    Cache,
    /// Fetched because nothing usable was cached
    Network,
    /// A background revalidation found a newer listing
    Revalidated,
    /// A local edit awaiting server confirmation
    Optimistic,
}

#[derive(Debug, Clone)]
pub enum NavigationEvent {
    /// A network read for `path` started and nothing can be shown yet
    Loading { epoch: u64, path: String },
    ListingUpdated {
        epoch: u64,
        path: String,
        listing: Listing,
        source: ListingSource,
    },
    /// The current navigation failed; emitted at most once per navigation
    Failed {
        epoch: u64,
        path: String,
        error: String,
    },
}

impl NavigationEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            Self::Loading { epoch, .. }
            | Self::ListingUpdated { epoch, .. }
            | Self::Failed { epoch, .. } => *epoch,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Loading { path, .. }
            | Self::ListingUpdated { path, .. }
            | Self::Failed { path, .. } => path,
        }
    }
}

/// Navigator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    /// A cached listing was shown
    Serving,
    /// A cached listing is shown and being revalidated in the background
    Revalidating,
    /// Waiting on a network read with nothing to show
    Loading,
}

/// Result of a navigation request
#[derive(Debug, Clone)]
pub enum Navigation {
    Rendered {
        epoch: u64,
        listing: Listing,
        source: ListingSource,
    },
    /// A later navigation took over before this one finished
    Superseded { epoch: u64 },
}

impl Navigation {
    pub fn epoch(&self) -> u64 {
        match self {
            Self::Rendered { epoch, .. } | Self::Superseded { epoch } => *epoch,
        }
    }

    pub fn listing(&self) -> Option<&Listing> {
        match self {
            Self::Rendered { listing, .. } => Some(listing),
            Self::Superseded { .. } => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}
