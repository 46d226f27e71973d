//! Filmstrip screenshots captured by the browser process.

use super::types::{
    require, HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler,
};
use crate::types::{names, MicroSeconds, Phase, TraceEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SyntheticScreenshot {
    pub index: usize,
    pub ts: MicroSeconds,
    pub data_uri: String,
    pub event: Arc<TraceEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct ScreenshotsData {
    pub screenshots: Vec<Arc<SyntheticScreenshot>>,
}

#[derive(Debug, Default)]
pub struct ScreenshotsHandler {
    state: HandlerState,
    events: Vec<Arc<TraceEvent>>,
    result: Option<Arc<ScreenshotsData>>,
}

impl ScreenshotsHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceHandler for ScreenshotsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Screenshots
    }

    fn deps(&self) -> &'static [HandlerName] {
        &[HandlerName::Meta]
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        if event.name == names::SCREENSHOT && event.ph == Phase::ObjectSnapshot {
            self.events.push(Arc::clone(event));
        }
        Ok(())
    }

    async fn finalize(&mut self, parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        let meta = require(self.name(), HandlerName::Meta, parsed.meta())?;

        let mut events = std::mem::take(&mut self.events);
        // Only the browser process captures the filmstrip
        if let Some(browser_pid) = meta.browser_process_id {
            events.retain(|e| e.pid == browser_pid);
        }
        events.sort_by_key(|e| e.ts);

        let screenshots = events
            .into_iter()
            .filter_map(|event| {
                let snapshot = event.arg_str("snapshot")?.to_string();
                Some((event, snapshot))
            })
            .enumerate()
            .map(|(index, (event, snapshot))| {
                Arc::new(SyntheticScreenshot {
                    index,
                    ts: event.ts,
                    data_uri: format!("data:image/jpg;base64,{}", snapshot),
                    event,
                })
            })
            .collect();

        self.result = Some(Arc::new(ScreenshotsData { screenshots }));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::Screenshots)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::meta::MetaData;
    use crate::types::ProcessId;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_screenshots_from_browser_only_and_indexed() {
        let mut parsed = ParsedTraceData::default();
        parsed.insert(HandlerData::Meta(Arc::new(MetaData {
            browser_process_id: Some(ProcessId(1)),
            ..MetaData::default()
        })));

        let mut handler = ScreenshotsHandler::new();
        handler.reset();
        for (ts, pid) in [(300, 1), (100, 1), (200, 9)] {
            let event: TraceEvent = serde_json::from_value(json!({
                "name": "Screenshot", "ph": "O", "ts": ts, "pid": pid,
                "args": {"snapshot": format!("img{}", ts)}
            }))
            .unwrap();
            handler.handle_event(&Arc::new(event)).unwrap();
        }
        block_on(handler.finalize(&parsed)).unwrap();

        let HandlerData::Screenshots(data) = handler.data().unwrap() else {
            panic!("wrong data");
        };
        assert_eq!(data.screenshots.len(), 2);
        assert_eq!(data.screenshots[0].ts, MicroSeconds(100));
        assert_eq!(data.screenshots[0].data_uri, "data:image/jpg;base64,img100");
        assert_eq!(data.screenshots[1].index, 1);
    }
}
