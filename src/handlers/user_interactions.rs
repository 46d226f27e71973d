//! User input events (`EventTiming`) and interactions.
//!
//! Each `EventTiming` begin/end pair becomes one synthetic event. Events
//! with a non-zero `interactionId` are interactions; when several
//! interactions end at the same time only the earliest-starting one is
//! kept in `interaction_events_with_no_nesting`.

use super::types::{HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler};
use crate::types::{names, MicroSeconds, Phase, TraceEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SyntheticInteraction {
    pub event_type: String,
    pub interaction_id: i64,
    pub frame: Option<String>,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    /// Absolute trace times; fall back to the event bounds when absent
    pub processing_start: MicroSeconds,
    pub processing_end: MicroSeconds,
    pub begin: Arc<TraceEvent>,
    pub end: Arc<TraceEvent>,
}

impl SyntheticInteraction {
    pub fn end_time(&self) -> MicroSeconds {
        self.ts + self.dur
    }

    pub fn input_delay(&self) -> MicroSeconds {
        (self.processing_start - self.ts).max(MicroSeconds::ZERO)
    }

    pub fn processing_duration(&self) -> MicroSeconds {
        (self.processing_end - self.processing_start).max(MicroSeconds::ZERO)
    }

    pub fn presentation_delay(&self) -> MicroSeconds {
        (self.end_time() - self.processing_end).max(MicroSeconds::ZERO)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserInteractionsData {
    /// Every paired `EventTiming`, in time order
    pub all_events: Vec<Arc<SyntheticInteraction>>,
    pub interaction_events: Vec<Arc<SyntheticInteraction>>,
    pub interaction_events_with_no_nesting: Vec<Arc<SyntheticInteraction>>,
    pub longest_interaction_event: Option<Arc<SyntheticInteraction>>,
}

#[derive(Debug, Default)]
pub struct UserInteractionsHandler {
    state: HandlerState,
    begins: HashMap<String, Arc<TraceEvent>>,
    pairs: Vec<(Arc<TraceEvent>, Arc<TraceEvent>)>,
    result: Option<Arc<UserInteractionsData>>,
}

impl UserInteractionsHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

fn synthesize(begin: Arc<TraceEvent>, end: Arc<TraceEvent>) -> SyntheticInteraction {
    let ts = begin.ts;
    let dur = (end.ts - begin.ts).max(MicroSeconds::ZERO);
    // processingStart/End are milliseconds on the same clock as timeStamp
    let offset = |key: &str| -> Option<MicroSeconds> {
        let at = begin.data_f64(key)?;
        let origin = begin.data_f64("timeStamp")?;
        Some(ts + MicroSeconds::from_millis(at - origin))
    };
    SyntheticInteraction {
        event_type: begin.data_str("type").unwrap_or_default().to_string(),
        interaction_id: begin.data_i64("interactionId").unwrap_or(0),
        frame: begin.data_str("frame").map(str::to_string),
        processing_start: offset("processingStart").unwrap_or(ts),
        processing_end: offset("processingEnd").unwrap_or(ts + dur),
        ts,
        dur,
        begin,
        end,
    }
}

/// Keep only the earliest-starting interaction of each end time
///
/// Input need not be sorted; output is in timestamp order.
pub fn remove_nested_interactions(
    interactions: &[Arc<SyntheticInteraction>],
) -> Vec<Arc<SyntheticInteraction>> {
    let mut sorted: Vec<Arc<SyntheticInteraction>> = interactions.to_vec();
    sorted.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| b.dur.cmp(&a.dur)));

    let mut seen_end_times: HashSet<MicroSeconds> = HashSet::new();
    sorted
        .into_iter()
        .filter(|interaction| seen_end_times.insert(interaction.end_time()))
        .collect()
}

#[async_trait]
impl TraceHandler for UserInteractionsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::UserInteractions
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        if event.name != names::EVENT_TIMING {
            return Ok(());
        }
        let Some(id) = event.async_id() else {
            return Ok(());
        };
        let key = format!("{}:{}", event.pid, id);
        match event.ph {
            Phase::AsyncNestableStart => {
                self.begins.insert(key, Arc::clone(event));
            }
            Phase::AsyncNestableEnd => {
                if let Some(begin) = self.begins.remove(&key) {
                    self.pairs.push((begin, Arc::clone(event)));
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn finalize(&mut self, _parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;

        let mut all_events: Vec<Arc<SyntheticInteraction>> = std::mem::take(&mut self.pairs)
            .into_iter()
            .map(|(begin, end)| Arc::new(synthesize(begin, end)))
            .collect();
        all_events.sort_by_key(|e| e.ts);

        let interaction_events: Vec<Arc<SyntheticInteraction>> = all_events
            .iter()
            .filter(|e| e.interaction_id > 0)
            .cloned()
            .collect();

        // First of equally long interactions wins
        let longest_interaction_event = interaction_events
            .iter()
            .fold(None::<&Arc<SyntheticInteraction>>, |best, e| match best {
                Some(b) if b.dur >= e.dur => Some(b),
                _ => Some(e),
            })
            .cloned();

        self.result = Some(Arc::new(UserInteractionsData {
            interaction_events_with_no_nesting: remove_nested_interactions(&interaction_events),
            all_events,
            interaction_events,
            longest_interaction_event,
        }));
        self.begins.clear();
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::UserInteractions)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}
