//! Trace handlers.
//!
//! Each handler sees every event once, in trace order, and produces an
//! immutable result in `finalize`. The orchestrator in `processor` wires
//! them together according to their declared dependencies.

pub mod animations;
pub mod auction_worklets;
pub mod frames;
pub mod largest_image_paint;
pub mod layout_shifts;
pub mod meta;
pub mod network_requests;
pub mod page_load_metrics;
pub mod renderer;
pub mod screenshots;
pub mod types;
pub mod user_interactions;
pub mod user_timings;

pub use types::{HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler};

/// Fresh, uninitialized handler for `name`
pub fn handler_for(name: HandlerName) -> Box<dyn TraceHandler> {
    match name {
        HandlerName::Meta => Box::new(meta::MetaHandler::new()),
        HandlerName::Animations => Box::new(animations::AnimationsHandler::new()),
        HandlerName::AuctionWorklets => Box::new(auction_worklets::AuctionWorkletsHandler::new()),
        HandlerName::Frames => Box::new(frames::FramesHandler::new()),
        HandlerName::LargestImagePaint => {
            Box::new(largest_image_paint::LargestImagePaintHandler::new())
        }
        HandlerName::LayoutShifts => Box::new(layout_shifts::LayoutShiftsHandler::new()),
        HandlerName::NetworkRequests => Box::new(network_requests::NetworkRequestsHandler::new()),
        HandlerName::PageLoadMetrics => Box::new(page_load_metrics::PageLoadMetricsHandler::new()),
        HandlerName::Renderer => Box::new(renderer::RendererHandler::new()),
        HandlerName::Screenshots => Box::new(screenshots::ScreenshotsHandler::new()),
        HandlerName::UserInteractions => {
            Box::new(user_interactions::UserInteractionsHandler::new())
        }
        HandlerName::UserTimings => Box::new(user_timings::UserTimingsHandler::new()),
    }
}

/// One instance of every known handler
pub fn all_handlers() -> Vec<Box<dyn TraceHandler>> {
    HandlerName::ALL.iter().map(|name| handler_for(*name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_for_reports_matching_name() {
        for name in HandlerName::ALL {
            assert_eq!(handler_for(name).name(), name);
        }
    }

    #[test]
    fn test_declared_dependencies() {
        assert!(handler_for(HandlerName::Meta).deps().is_empty());
        assert_eq!(
            handler_for(HandlerName::Frames).deps(),
            &[HandlerName::Meta, HandlerName::Renderer]
        );
    }
}
