//! `performance.mark`, `performance.measure` and `console.time` entries.

use super::types::{HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler};
use crate::types::{MicroSeconds, Phase, TraceEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const USER_TIMING_CATEGORY: &str = "blink.user_timing";
const CONSOLE_CATEGORY: &str = "blink.console";

/// A begin/end pair collapsed into one span
#[derive(Debug, Clone)]
pub struct SyntheticTimingPair {
    pub name: String,
    pub id: String,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub begin: Arc<TraceEvent>,
    pub end: Arc<TraceEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct UserTimingsData {
    pub performance_marks: Vec<Arc<TraceEvent>>,
    pub performance_measures: Vec<Arc<SyntheticTimingPair>>,
    pub console_timings: Vec<Arc<SyntheticTimingPair>>,
}

impl UserTimingsData {
    pub fn is_empty(&self) -> bool {
        self.performance_marks.is_empty()
            && self.performance_measures.is_empty()
            && self.console_timings.is_empty()
    }
}

#[derive(Debug, Default)]
struct PairBuffer {
    open: HashMap<String, Arc<TraceEvent>>,
    pairs: Vec<Arc<SyntheticTimingPair>>,
}

impl PairBuffer {
    fn push(&mut self, event: &Arc<TraceEvent>) {
        let Some(id) = event.async_id() else {
            return;
        };
        // Same id may be reused by different names
        let key = format!("{}:{}:{}", event.pid, event.name, id);
        match event.ph {
            Phase::AsyncNestableStart | Phase::AsyncStart => {
                self.open.insert(key, Arc::clone(event));
            }
            Phase::AsyncNestableEnd | Phase::AsyncEnd => {
                if let Some(begin) = self.open.remove(&key) {
                    self.pairs.push(Arc::new(SyntheticTimingPair {
                        name: begin.name.clone(),
                        id,
                        ts: begin.ts,
                        dur: (event.ts - begin.ts).max(MicroSeconds::ZERO),
                        begin,
                        end: Arc::clone(event),
                    }));
                }
            }
            _ => {}
        }
    }

    fn into_sorted(self) -> Vec<Arc<SyntheticTimingPair>> {
        let mut pairs = self.pairs;
        // Longer spans first so parents precede children
        pairs.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| b.dur.cmp(&a.dur)));
        pairs
    }
}

#[derive(Debug, Default)]
pub struct UserTimingsHandler {
    state: HandlerState,
    marks: Vec<Arc<TraceEvent>>,
    measures: PairBuffer,
    console: PairBuffer,
    result: Option<Arc<UserTimingsData>>,
}

impl UserTimingsHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceHandler for UserTimingsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::UserTimings
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        if event.has_category(USER_TIMING_CATEGORY) {
            match event.ph {
                Phase::Mark | Phase::Instant => self.marks.push(Arc::clone(event)),
                _ => self.measures.push(event),
            }
        } else if event.has_category(CONSOLE_CATEGORY) {
            self.console.push(event);
        }
        Ok(())
    }

    async fn finalize(&mut self, _parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;

        let mut performance_marks = std::mem::take(&mut self.marks);
        performance_marks.sort_by_key(|e| e.ts);

        self.result = Some(Arc::new(UserTimingsData {
            performance_marks,
            performance_measures: std::mem::take(&mut self.measures).into_sorted(),
            console_timings: std::mem::take(&mut self.console).into_sorted(),
        }));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::UserTimings)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_marks_measures_and_console_timings() {
        let mut handler = UserTimingsHandler::new();
        handler.reset();
        let raw = [
            json!({"name": "app-start", "cat": "blink.user_timing", "ph": "R", "ts": 50, "pid": 1}),
            json!({"name": "boot", "cat": "blink.user_timing", "ph": "b", "ts": 100, "pid": 1, "id2": {"local": "0x1"}}),
            json!({"name": "render", "cat": "blink.user_timing", "ph": "b", "ts": 120, "pid": 1, "id2": {"local": "0x1"}}),
            json!({"name": "render", "cat": "blink.user_timing", "ph": "e", "ts": 150, "pid": 1, "id2": {"local": "0x1"}}),
            json!({"name": "boot", "cat": "blink.user_timing", "ph": "e", "ts": 400, "pid": 1, "id2": {"local": "0x1"}}),
            json!({"name": "fetch", "cat": "blink.console", "ph": "S", "ts": 10, "pid": 1, "id": "0x9"}),
            json!({"name": "fetch", "cat": "blink.console", "ph": "F", "ts": 30, "pid": 1, "id": "0x9"}),
        ];
        for value in raw {
            handler
                .handle_event(&Arc::new(serde_json::from_value(value).unwrap()))
                .unwrap();
        }
        block_on(handler.finalize(&ParsedTraceData::default())).unwrap();

        let HandlerData::UserTimings(data) = handler.data().unwrap() else {
            panic!("wrong data");
        };
        assert_eq!(data.performance_marks.len(), 1);
        let names: Vec<&str> = data.performance_measures.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["boot", "render"]);
        assert_eq!(data.performance_measures[0].dur, MicroSeconds(300));
        assert_eq!(data.console_timings.len(), 1);
        assert_eq!(data.console_timings[0].dur, MicroSeconds(20));
    }

    #[test]
    fn test_data_before_finalize_fails() {
        let mut handler = UserTimingsHandler::new();
        handler.reset();
        assert!(matches!(
            handler.data(),
            Err(HandlerError::NotFinalized(HandlerName::UserTimings))
        ));
    }
}
