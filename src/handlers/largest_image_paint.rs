//! `LargestImagePaint::Candidate` events keyed by DOM node id.
//!
//! The LCP candidate event only carries a node id; this map resolves it to
//! the image URL that was painted.

use super::types::{HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler};
use crate::types::{names, TraceEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct LargestImagePaintData {
    /// Latest candidate per DOM node
    pub image_by_dom_node_id: HashMap<i64, Arc<TraceEvent>>,
}

impl LargestImagePaintData {
    pub fn image_url(&self, dom_node_id: i64) -> Option<&str> {
        self.image_by_dom_node_id
            .get(&dom_node_id)
            .and_then(|event| event.data_str("imageUrl"))
    }
}

#[derive(Debug, Default)]
pub struct LargestImagePaintHandler {
    state: HandlerState,
    images: HashMap<i64, Arc<TraceEvent>>,
    result: Option<Arc<LargestImagePaintData>>,
}

impl LargestImagePaintHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceHandler for LargestImagePaintHandler {
    fn name(&self) -> HandlerName {
        HandlerName::LargestImagePaint
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        if event.name != names::LARGEST_IMAGE_PAINT_CANDIDATE {
            return Ok(());
        }
        if let Some(node_id) = event.data_i64("DOMNodeId") {
            self.images.insert(node_id, Arc::clone(event));
        }
        Ok(())
    }

    async fn finalize(&mut self, _parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        self.result = Some(Arc::new(LargestImagePaintData {
            image_by_dom_node_id: std::mem::take(&mut self.images),
        }));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::LargestImagePaint)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}
