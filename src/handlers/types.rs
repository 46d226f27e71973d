//! Handler contract and the parsed-data bag.

use super::{
    animations::AnimationData, auction_worklets::AuctionWorkletsData, frames::FramesData,
    largest_image_paint::LargestImagePaintData, layout_shifts::LayoutShiftsData, meta::MetaData,
    network_requests::NetworkRequestsData, page_load_metrics::PageLoadMetricsData,
    renderer::RendererData, screenshots::ScreenshotsData, user_interactions::UserInteractionsData,
    user_timings::UserTimingsData,
};
use crate::types::TraceEvent;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Closed set of handler names
///
/// The declaration order doubles as the tie-break order of the
/// orchestrator's topological sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HandlerName {
    Meta,
    Animations,
    AuctionWorklets,
    Frames,
    LargestImagePaint,
    LayoutShifts,
    NetworkRequests,
    PageLoadMetrics,
    Renderer,
    Screenshots,
    UserInteractions,
    UserTimings,
}

impl HandlerName {
    pub const ALL: [HandlerName; 12] = [
        HandlerName::Meta,
        HandlerName::Animations,
        HandlerName::AuctionWorklets,
        HandlerName::Frames,
        HandlerName::LargestImagePaint,
        HandlerName::LayoutShifts,
        HandlerName::NetworkRequests,
        HandlerName::PageLoadMetrics,
        HandlerName::Renderer,
        HandlerName::Screenshots,
        HandlerName::UserInteractions,
        HandlerName::UserTimings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerName::Meta => "Meta",
            HandlerName::Animations => "Animations",
            HandlerName::AuctionWorklets => "AuctionWorklets",
            HandlerName::Frames => "Frames",
            HandlerName::LargestImagePaint => "LargestImagePaint",
            HandlerName::LayoutShifts => "LayoutShifts",
            HandlerName::NetworkRequests => "NetworkRequests",
            HandlerName::PageLoadMetrics => "PageLoadMetrics",
            HandlerName::Renderer => "Renderer",
            HandlerName::Screenshots => "Screenshots",
            HandlerName::UserInteractions => "UserInteractions",
            HandlerName::UserTimings => "UserTimings",
        }
    }
}

impl fmt::Display for HandlerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HandlerName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Lifecycle of a handler within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerState {
    #[default]
    Uninitialized,
    Initialized,
    Finalized,
}

impl HandlerState {
    /// Gate for `handle_event`
    pub fn ensure_initialized(self, name: HandlerName) -> Result<(), HandlerError> {
        match self {
            HandlerState::Initialized => Ok(()),
            _ => Err(HandlerError::NotInitialized(name)),
        }
    }

    /// Gate for `data`
    pub fn ensure_finalized(self, name: HandlerName) -> Result<(), HandlerError> {
        match self {
            HandlerState::Finalized => Ok(()),
            _ => Err(HandlerError::NotFinalized(name)),
        }
    }
}

/// A streaming trace processor
///
/// The orchestrator calls `reset` once, `handle_event` for every event in
/// trace order, then `finalize` once all dependencies have finalized. Only
/// after `finalize` may `data` be read.
#[async_trait]
pub trait TraceHandler: Send {
    fn name(&self) -> HandlerName;

    /// Handlers that must finalize before this one
    fn deps(&self) -> &'static [HandlerName] {
        &[]
    }

    /// Drop all state and become ready for a new trace
    fn reset(&mut self);

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError>;

    /// Build the result; `parsed` holds every already-finalized dependency
    async fn finalize(&mut self, parsed: &ParsedTraceData) -> Result<(), HandlerError>;

    fn data(&self) -> Result<HandlerData, HandlerError>;
}

/// A finalized handler result
#[derive(Debug, Clone)]
pub enum HandlerData {
    Meta(Arc<MetaData>),
    Animations(Arc<AnimationData>),
    AuctionWorklets(Arc<AuctionWorkletsData>),
    Frames(Arc<FramesData>),
    LargestImagePaint(Arc<LargestImagePaintData>),
    LayoutShifts(Arc<LayoutShiftsData>),
    NetworkRequests(Arc<NetworkRequestsData>),
    PageLoadMetrics(Arc<PageLoadMetricsData>),
    Renderer(Arc<RendererData>),
    Screenshots(Arc<ScreenshotsData>),
    UserInteractions(Arc<UserInteractionsData>),
    UserTimings(Arc<UserTimingsData>),
}

impl HandlerData {
    pub fn name(&self) -> HandlerName {
        match self {
            HandlerData::Meta(_) => HandlerName::Meta,
            HandlerData::Animations(_) => HandlerName::Animations,
            HandlerData::AuctionWorklets(_) => HandlerName::AuctionWorklets,
            HandlerData::Frames(_) => HandlerName::Frames,
            HandlerData::LargestImagePaint(_) => HandlerName::LargestImagePaint,
            HandlerData::LayoutShifts(_) => HandlerName::LayoutShifts,
            HandlerData::NetworkRequests(_) => HandlerName::NetworkRequests,
            HandlerData::PageLoadMetrics(_) => HandlerName::PageLoadMetrics,
            HandlerData::Renderer(_) => HandlerName::Renderer,
            HandlerData::Screenshots(_) => HandlerName::Screenshots,
            HandlerData::UserInteractions(_) => HandlerName::UserInteractions,
            HandlerData::UserTimings(_) => HandlerName::UserTimings,
        }
    }
}

/// Keyed bag of finalized handler results for one trace
#[derive(Debug, Clone, Default)]
pub struct ParsedTraceData {
    entries: BTreeMap<HandlerName, HandlerData>,
}

macro_rules! typed_accessor {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&self) -> Result<&Arc<$ty>, HandlerError> {
            match self.entries.get(&HandlerName::$variant) {
                Some(HandlerData::$variant(data)) => Ok(data),
                _ => Err(HandlerError::NotFinalized(HandlerName::$variant)),
            }
        }
    };
}

impl ParsedTraceData {
    pub fn insert(&mut self, data: HandlerData) {
        self.entries.insert(data.name(), data);
    }

    pub fn get(&self, name: HandlerName) -> Option<&HandlerData> {
        self.entries.get(&name)
    }

    pub fn contains(&self, name: HandlerName) -> bool {
        self.entries.contains_key(&name)
    }

    pub fn keys(&self) -> impl Iterator<Item = HandlerName> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    typed_accessor!(meta, Meta, MetaData);
    typed_accessor!(animations, Animations, AnimationData);
    typed_accessor!(auction_worklets, AuctionWorklets, AuctionWorkletsData);
    typed_accessor!(frames, Frames, FramesData);
    typed_accessor!(largest_image_paint, LargestImagePaint, LargestImagePaintData);
    typed_accessor!(layout_shifts, LayoutShifts, LayoutShiftsData);
    typed_accessor!(network_requests, NetworkRequests, NetworkRequestsData);
    typed_accessor!(page_load_metrics, PageLoadMetrics, PageLoadMetricsData);
    typed_accessor!(renderer, Renderer, RendererData);
    typed_accessor!(screenshots, Screenshots, ScreenshotsData);
    typed_accessor!(user_interactions, UserInteractions, UserInteractionsData);
    typed_accessor!(user_timings, UserTimings, UserTimingsData);
}

/// Fetch a dependency inside `finalize`, reporting which handler needed it
pub(crate) fn require<'a, T>(
    handler: HandlerName,
    dependency: HandlerName,
    lookup: Result<&'a Arc<T>, HandlerError>,
) -> Result<&'a Arc<T>, HandlerError> {
    lookup.map_err(|_| HandlerError::MissingDependency {
        handler,
        dependency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_name_parsing() {
        assert_eq!("Meta".parse::<HandlerName>(), Ok(HandlerName::Meta));
        assert_eq!(
            " networkrequests ".parse::<HandlerName>(),
            Ok(HandlerName::NetworkRequests)
        );
        assert!("Bogus".parse::<HandlerName>().is_err());
    }

    #[test]
    fn test_state_gates() {
        assert!(HandlerState::Uninitialized
            .ensure_initialized(HandlerName::Meta)
            .is_err());
        assert!(HandlerState::Initialized
            .ensure_initialized(HandlerName::Meta)
            .is_ok());
        assert!(matches!(
            HandlerState::Initialized.ensure_finalized(HandlerName::Meta),
            Err(HandlerError::NotFinalized(HandlerName::Meta))
        ));
        assert!(HandlerState::Finalized
            .ensure_finalized(HandlerName::Meta)
            .is_ok());
    }

    #[test]
    fn test_empty_bag_accessors_fail() {
        let parsed = ParsedTraceData::default();
        assert!(parsed.meta().is_err());
        assert!(parsed.is_empty());
    }
}
