//! Navigation lookups shared by handlers, the graph builder and insights.

use crate::handlers::meta::MetaData;
use crate::types::{MicroSeconds, TraceEvent, TraceWindow};
use std::collections::HashMap;
use std::sync::Arc;

/// `args.data.navigationId` of a `navigationStart` event
pub fn navigation_id(event: &TraceEvent) -> Option<&str> {
    event.data_str("navigationId")
}

/// `args.data.documentLoaderURL` of a `navigationStart` event
pub fn document_url(event: &TraceEvent) -> Option<&str> {
    event.data_str("documentLoaderURL")
}

pub fn is_main_frame_navigation(event: &TraceEvent) -> bool {
    event
        .data_bool("isOutermostMainFrame")
        .or_else(|| event.data_bool("isLoadingMainFrame"))
        .unwrap_or(false)
}

/// The latest navigation of `frame_id` that started at or before `ts`
///
/// `navigations_by_frame_id` lists must be sorted by timestamp.
pub fn navigation_for_timestamp<'a>(
    ts: MicroSeconds,
    frame_id: &str,
    navigations_by_frame_id: &'a HashMap<String, Vec<Arc<TraceEvent>>>,
) -> Option<&'a Arc<TraceEvent>> {
    let navigations = navigations_by_frame_id.get(frame_id)?;
    let index = navigations.partition_point(|nav| nav.ts <= ts);
    index.checked_sub(1).map(|i| &navigations[i])
}

/// One navigation's slice of the trace
#[derive(Debug, Clone)]
pub struct NavigationScope {
    pub navigation: Arc<TraceEvent>,
    pub navigation_id: String,
    pub frame_id: String,
    /// From the navigation start up to the next navigation of the same frame
    /// (exclusive), or the end of the trace
    pub window: TraceWindow,
}

impl NavigationScope {
    /// Resolve a navigation by id, checking it belongs to `frame_id`
    pub fn resolve(meta: &MetaData, frame_id: &str, navigation_id: &str) -> Option<Self> {
        let navigation = meta.navigations_by_navigation_id.get(navigation_id)?;
        if navigation.frame_id() != Some(frame_id) {
            return None;
        }

        let end = meta
            .navigations_by_frame_id
            .get(frame_id)
            .and_then(|navs| navs.iter().find(|nav| nav.ts > navigation.ts))
            .map(|next| next.ts - MicroSeconds(1))
            .unwrap_or(meta.trace_bounds.max)
            .max(navigation.ts);

        Some(Self {
            navigation: Arc::clone(navigation),
            navigation_id: navigation_id.to_string(),
            frame_id: frame_id.to_string(),
            window: TraceWindow::new(navigation.ts, end),
        })
    }

    pub fn contains(&self, ts: MicroSeconds) -> bool {
        self.window.contains(ts)
    }

    /// In the window and attributed to this scope's frame
    pub fn contains_frame_event(&self, frame_id: Option<&str>, ts: MicroSeconds) -> bool {
        frame_id == Some(self.frame_id.as_str()) && self.contains(ts)
    }

    pub fn document_url(&self) -> Option<&str> {
        document_url(&self.navigation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;
    use serde_json::json;

    fn nav(ts: i64, frame: &str, id: &str) -> Arc<TraceEvent> {
        let mut event = TraceEvent::new("navigationStart", Phase::Mark, MicroSeconds(ts));
        event.args = json!({"frame": frame,
            "data": {"navigationId": id, "documentLoaderURL": "https://a.test/"}});
        Arc::new(event)
    }

    #[test]
    fn test_navigation_for_timestamp() {
        let mut by_frame = HashMap::new();
        by_frame.insert("F".to_string(), vec![nav(100, "F", "N1"), nav(500, "F", "N2")]);

        assert!(navigation_for_timestamp(MicroSeconds(50), "F", &by_frame).is_none());
        let found = navigation_for_timestamp(MicroSeconds(100), "F", &by_frame).unwrap();
        assert_eq!(navigation_id(found), Some("N1"));
        let found = navigation_for_timestamp(MicroSeconds(900), "F", &by_frame).unwrap();
        assert_eq!(navigation_id(found), Some("N2"));
        assert!(navigation_for_timestamp(MicroSeconds(900), "other", &by_frame).is_none());
    }
}
