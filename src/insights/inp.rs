//! Interaction to Next Paint.

use super::InsightContext;
use crate::handlers::user_interactions::SyntheticInteraction;
use crate::handlers::ParsedTraceData;
use crate::types::MicroSeconds;
use crate::utils::config::{INP_INTERACTIONS_PER_PERCENTILE_STEP, INP_MAX_PERCENTILE_OFFSET};
use crate::utils::error::InsightError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Report view of one interaction, durations in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionSummary {
    pub event_type: String,
    pub interaction_id: i64,
    pub ts: MicroSeconds,
    pub duration_ms: f64,
    pub input_delay_ms: f64,
    pub processing_duration_ms: f64,
    pub presentation_delay_ms: f64,
}

impl InteractionSummary {
    fn new(interaction: &SyntheticInteraction) -> Self {
        Self {
            event_type: interaction.event_type.clone(),
            interaction_id: interaction.interaction_id,
            ts: interaction.ts,
            duration_ms: interaction.dur.as_millis_f64(),
            input_delay_ms: interaction.input_delay().as_millis_f64(),
            processing_duration_ms: interaction.processing_duration().as_millis_f64(),
            presentation_delay_ms: interaction.presentation_delay().as_millis_f64(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InteractionToNextPaintInsight {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longest_interaction: Option<InteractionSummary>,
    /// The interaction reported as INP: one outlier is ignored per 50 interactions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_percentile_interaction: Option<InteractionSummary>,
}

/// Longest event per interaction id, longest first
fn normalize(interactions: &[&Arc<SyntheticInteraction>]) -> Vec<Arc<SyntheticInteraction>> {
    let mut longest: HashMap<i64, &Arc<SyntheticInteraction>> = HashMap::new();
    for interaction in interactions {
        let entry = longest.entry(interaction.interaction_id).or_insert(interaction);
        if interaction.dur > entry.dur {
            *entry = interaction;
        }
    }
    let mut normalized: Vec<Arc<SyntheticInteraction>> =
        longest.into_values().map(Arc::clone).collect();
    normalized.sort_by(|a, b| b.dur.cmp(&a.dur).then_with(|| a.ts.cmp(&b.ts)));
    normalized
}

/// Index of the interaction reported as INP among `count` normalized interactions
pub fn high_percentile_index(count: usize) -> usize {
    (count / INP_INTERACTIONS_PER_PERCENTILE_STEP).min(INP_MAX_PERCENTILE_OFFSET)
}

/// INP insight of one navigation
///
/// # Errors
/// * `InsightError::MissingData` - Meta or UserInteractions missing
pub fn generate_insight(
    parsed: &ParsedTraceData,
    context: &InsightContext<'_>,
) -> Result<InteractionToNextPaintInsight, InsightError> {
    let scope = context.scope(parsed)?;
    let interactions = parsed.user_interactions()?;

    let in_navigation: Vec<_> = interactions
        .interaction_events_with_no_nesting
        .iter()
        .filter(|interaction| scope.contains(interaction.ts))
        .filter(|interaction| {
            interaction
                .frame
                .as_deref()
                .map_or(true, |frame| frame == context.frame_id)
        })
        .collect();

    let normalized = normalize(&in_navigation);
    Ok(InteractionToNextPaintInsight {
        longest_interaction: normalized.first().map(|i| InteractionSummary::new(i)),
        high_percentile_interaction: normalized
            .get(high_percentile_index(normalized.len()))
            .map(|i| InteractionSummary::new(i)),
    })
}
