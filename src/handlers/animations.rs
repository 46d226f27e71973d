//! Animation async begin/end pairs and their instant events.
//!
//! Instant events carry `compositeFailed` masks explaining why an
//! animation could not run on the compositor.

use super::types::{HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler};
use crate::types::{names, MicroSeconds, Phase, TraceEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SyntheticAnimationPair {
    pub id: String,
    pub name: Option<String>,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub begin: Arc<TraceEvent>,
    pub end: Arc<TraceEvent>,
    pub instant_events: Vec<Arc<TraceEvent>>,
}

impl SyntheticAnimationPair {
    /// Union of all `compositeFailed` masks reported for this animation
    pub fn composite_failed_mask(&self) -> u64 {
        self.instant_events
            .iter()
            .filter_map(|e| e.data_value("compositeFailed").and_then(serde_json::Value::as_u64))
            .fold(0, |acc, mask| acc | mask)
    }

    pub fn unsupported_properties(&self) -> Vec<String> {
        let mut props = Vec::new();
        for event in &self.instant_events {
            let unsupported = event.data_value("unsupportedProperties");
            let Some(list) = unsupported.and_then(|v| v.as_array()) else {
                continue;
            };
            for prop in list.iter().filter_map(|p| p.as_str()) {
                if !props.iter().any(|p: &String| p == prop) {
                    props.push(prop.to_string());
                }
            }
        }
        props
    }

    pub fn end_time(&self) -> MicroSeconds {
        self.ts + self.dur
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnimationData {
    /// Sorted by start time
    pub animations: Vec<Arc<SyntheticAnimationPair>>,
}

#[derive(Debug, Default)]
struct PendingAnimation {
    begin: Option<Arc<TraceEvent>>,
    end: Option<Arc<TraceEvent>>,
    instants: Vec<Arc<TraceEvent>>,
}

#[derive(Debug, Default)]
pub struct AnimationsHandler {
    state: HandlerState,
    pending: HashMap<String, PendingAnimation>,
    result: Option<Arc<AnimationData>>,
}

impl AnimationsHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceHandler for AnimationsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Animations
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        if event.name != names::ANIMATION {
            return Ok(());
        }
        let Some(id) = event.async_id() else {
            return Ok(());
        };
        let pending = self.pending.entry(id).or_default();
        match event.ph {
            Phase::AsyncNestableStart => pending.begin = Some(Arc::clone(event)),
            Phase::AsyncNestableEnd => pending.end = Some(Arc::clone(event)),
            Phase::AsyncNestableInstant => pending.instants.push(Arc::clone(event)),
            _ => {}
        }
        Ok(())
    }

    async fn finalize(&mut self, _parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;

        let mut animations: Vec<Arc<SyntheticAnimationPair>> = std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|(id, pending)| {
                let begin = pending.begin?;
                let end = pending.end?;
                let mut instant_events = pending.instants;
                instant_events.sort_by_key(|e| e.ts);
                Some(Arc::new(SyntheticAnimationPair {
                    name: begin
                        .data_str("displayName")
                        .or_else(|| begin.data_str("name"))
                        .map(str::to_string),
                    ts: begin.ts,
                    dur: (end.ts - begin.ts).max(MicroSeconds::ZERO),
                    id,
                    begin,
                    end,
                    instant_events,
                }))
            })
            .collect();
        animations.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));

        self.result = Some(Arc::new(AnimationData { animations }));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::Animations)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_pairs_animations_and_merges_failure_masks() {
        let mut handler = AnimationsHandler::new();
        handler.reset();
        let raw = [
            json!({"name": "Animation", "ph": "b", "ts": 10, "id2": {"local": "0x1"}, "args": {"data": {"displayName": "fade"}}}),
            json!({"name": "Animation", "ph": "n", "ts": 12, "id2": {"local": "0x1"}, "args": {"data": {"compositeFailed": 8192, "unsupportedProperties": ["top"]}}}),
            json!({"name": "Animation", "ph": "n", "ts": 13, "id2": {"local": "0x1"}, "args": {"data": {"compositeFailed": 2048, "unsupportedProperties": ["top", "left"]}}}),
            json!({"name": "Animation", "ph": "e", "ts": 40, "id2": {"local": "0x1"}}),
            json!({"name": "Animation", "ph": "b", "ts": 50, "id2": {"local": "0x2"}}),
        ];
        for value in raw {
            handler
                .handle_event(&Arc::new(serde_json::from_value(value).unwrap()))
                .unwrap();
        }
        block_on(handler.finalize(&ParsedTraceData::default())).unwrap();

        let HandlerData::Animations(data) = handler.data().unwrap() else {
            panic!("wrong data");
        };
        assert_eq!(data.animations.len(), 1);
        let animation = &data.animations[0];
        assert_eq!(animation.name.as_deref(), Some("fade"));
        assert_eq!(animation.dur, MicroSeconds(30));
        assert_eq!(animation.composite_failed_mask(), 8192 | 2048);
        assert_eq!(animation.unsupported_properties(), vec!["top", "left"]);
    }
}
