//! Compositor frame model.
//!
//! Compositor events (`BeginFrame`, `DrawFrame`, `DroppedFrame`, ...) and
//! the relevant main-thread markers are buffered during the event pass and
//! replayed in `finalize`, once Meta knows the main frame and Renderer
//! knows which threads are main-frame main threads.
//!
//! A `BeginFrame` is queued until its `DrawFrame` arrives; dropped frames
//! popped on the way are reported as their own frames. A frame is idle when
//! `NeedsBeginFrameChanged` announced activity that never produced a draw.

use super::types::{
    require, HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler,
};
use crate::types::{names, MicroSeconds, ProcessId, ThreadId, TraceEvent};
use crate::utils::config::TOP_LEVEL_TASK_NAMES;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const MAIN_FRAME_MARKERS: [&str; 4] = [
    names::SCHEDULE_STYLE_RECALCULATION,
    names::INVALIDATE_LAYOUT,
    names::BEGIN_MAIN_THREAD_FRAME,
    "ScrollLayer",
];

const COMPOSITOR_EVENTS: [&str; 8] = [
    names::BEGIN_FRAME,
    names::DROPPED_FRAME,
    names::DRAW_FRAME,
    names::REQUEST_MAIN_THREAD_FRAME,
    names::NEEDS_BEGIN_FRAME_CHANGED,
    names::ACTIVATE_LAYER_TREE,
    names::COMMIT,
    names::COMPOSITE_LAYERS,
];

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineFrame {
    pub seq_id: i64,
    pub start_time: MicroSeconds,
    /// Offset from the earliest timestamp seen by the frame model
    pub start_time_offset: MicroSeconds,
    pub end_time: MicroSeconds,
    pub duration: MicroSeconds,
    pub idle: bool,
    pub dropped: bool,
    pub is_partial: bool,
    /// `BeginMainThreadFrame` id of the committed main-thread frame
    pub main_frame_id: Option<i64>,
}

impl TimelineFrame {
    fn new(seq_id: i64, start_time: MicroSeconds, start_time_offset: MicroSeconds) -> Self {
        Self {
            seq_id,
            start_time,
            start_time_offset,
            end_time: start_time,
            duration: MicroSeconds::ZERO,
            idle: false,
            dropped: false,
            is_partial: false,
            main_frame_id: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FramesData {
    pub frames: Vec<Arc<TimelineFrame>>,
}

impl FramesData {
    /// Frames overlapping `[start, end]`
    pub fn frames_within(&self, start: MicroSeconds, end: MicroSeconds) -> &[Arc<TimelineFrame>] {
        let first = self.frames.partition_point(|f| f.end_time < start);
        let last = self.frames.partition_point(|f| f.start_time < end);
        &self.frames[first..last.max(first)]
    }

    pub fn dropped_count(&self) -> usize {
        self.frames.iter().filter(|f| f.dropped).count()
    }
}

#[derive(Debug, Clone, Copy)]
struct BeginFrameInfo {
    seq_id: i64,
    start_time: MicroSeconds,
    is_dropped: bool,
    is_partial: bool,
}

/// BeginFrames waiting for their DrawFrame
#[derive(Debug, Default)]
struct BeginFrameQueue {
    order: VecDeque<i64>,
    frames: HashMap<i64, BeginFrameInfo>,
}

impl BeginFrameQueue {
    fn add_if_missing(
        &mut self,
        seq_id: i64,
        start_time: MicroSeconds,
        is_dropped: bool,
        is_partial: bool,
    ) {
        if !self.frames.contains_key(&seq_id) {
            self.frames.insert(
                seq_id,
                BeginFrameInfo {
                    seq_id,
                    start_time,
                    is_dropped,
                    is_partial,
                },
            );
            self.order.push_back(seq_id);
        }
    }

    fn mark_dropped(&mut self, seq_id: i64, is_partial: bool) {
        if let Some(info) = self.frames.get_mut(&seq_id) {
            info.is_dropped = true;
            info.is_partial = is_partial;
        }
    }

    /// Pop everything up to `seq_id`, keeping dropped frames and the drawn one
    fn pop_for_draw(&mut self, seq_id: i64) -> Vec<BeginFrameInfo> {
        let mut visible = Vec::new();
        if !self.frames.contains_key(&seq_id) {
            return visible;
        }
        while let Some(current) = self.order.pop_front() {
            let Some(info) = self.frames.remove(&current) else {
                continue;
            };
            if current == seq_id {
                visible.push(info);
                break;
            }
            if info.is_dropped {
                visible.push(info);
            }
        }
        visible
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingFrame {
    trigger_time: MicroSeconds,
    main_frame_id: Option<i64>,
}

/// Replays compositor events into frames
#[derive(Debug, Default)]
struct FrameModel {
    frames: Vec<TimelineFrame>,
    queue: BeginFrameQueue,
    minimum_record_time: Option<MicroSeconds>,
    last_frame: Option<TimelineFrame>,
    main_frame_committed: bool,
    main_frame_requested: bool,
    frame_pending_commit: Option<PendingFrame>,
    frame_pending_activation: Option<PendingFrame>,
    last_begin_frame: Option<MicroSeconds>,
    last_needs_begin_frame: Option<MicroSeconds>,
    last_task_begin_time: Option<MicroSeconds>,
    layer_tree_id: Option<i64>,
}

impl FrameModel {
    fn start_frame(&mut self, start_time: MicroSeconds, seq_id: i64) {
        if let Some(mut previous) = self.last_frame.take() {
            previous.end_time = start_time;
            previous.duration = start_time - previous.start_time;
            self.frames.push(previous);
        }
        let offset = start_time - self.minimum_record_time.unwrap_or(start_time);
        self.last_frame = Some(TimelineFrame::new(seq_id, start_time, offset));
    }

    fn commit_pending_frame(&mut self) {
        let (Some(pending), Some(frame)) =
            (self.frame_pending_activation, self.last_frame.as_mut())
        else {
            return;
        };
        frame.main_frame_id = pending.main_frame_id;
        self.frame_pending_activation = None;
    }

    fn begin_frame(&mut self, ts: MicroSeconds, seq_id: i64) {
        if self.last_frame.is_none() {
            self.start_frame(ts, seq_id);
        }
        self.last_begin_frame = Some(ts);
        self.queue.add_if_missing(seq_id, ts, false, false);
    }

    fn dropped_frame(&mut self, ts: MicroSeconds, seq_id: i64, is_partial: bool) {
        if self.last_frame.is_none() {
            self.start_frame(ts, seq_id);
        }
        self.queue.add_if_missing(seq_id, ts, true, is_partial);
        self.queue.mark_dropped(seq_id, is_partial);
    }

    fn draw_frame(&mut self, ts: MicroSeconds, seq_id: i64) {
        let Some(last_start) = self.last_frame.as_ref().map(|f| f.start_time) else {
            self.start_frame(ts, seq_id);
            return;
        };

        if self.main_frame_committed || !self.main_frame_requested {
            if let Some(needs_begin_frame) = self.last_needs_begin_frame.take() {
                let idle_time_end = match self.frame_pending_activation {
                    Some(pending) => pending.trigger_time,
                    None => self.last_begin_frame.unwrap_or(needs_begin_frame),
                };
                if idle_time_end > last_start {
                    if let Some(frame) = self.last_frame.as_mut() {
                        frame.idle = true;
                    }
                    self.last_begin_frame = None;
                }
            }

            for info in self.queue.pop_for_draw(seq_id) {
                let last_was_idle = self.last_frame.as_ref().is_some_and(|f| f.idle);
                self.start_frame(info.start_time, seq_id);
                if last_was_idle && self.frame_pending_activation.is_some() {
                    self.commit_pending_frame();
                }
                if let Some(frame) = self.last_frame.as_mut() {
                    frame.dropped |= info.is_dropped;
                    frame.is_partial |= info.is_partial;
                }
            }
        }
        self.main_frame_committed = false;
    }

    fn activate_layer_tree(&mut self) {
        if self.last_frame.is_some()
            && self.frame_pending_activation.is_some()
            && self.last_needs_begin_frame.is_none()
        {
            self.commit_pending_frame();
        }
    }

    fn commit(&mut self) {
        let Some(pending) = self.frame_pending_commit.take() else {
            return;
        };
        self.frame_pending_activation = Some(pending);
        self.main_frame_requested = false;
        self.main_frame_committed = true;
    }

    fn compositor_event(&mut self, event: &TraceEvent) {
        if event.arg("layerTreeId").and_then(serde_json::Value::as_i64) != self.layer_tree_id {
            return;
        }
        let seq_id = event.arg("frameSeqId").and_then(serde_json::Value::as_i64).unwrap_or(0);
        match event.name.as_str() {
            names::BEGIN_FRAME => self.begin_frame(event.ts, seq_id),
            names::DRAW_FRAME => self.draw_frame(event.ts, seq_id),
            names::ACTIVATE_LAYER_TREE => self.activate_layer_tree(),
            names::REQUEST_MAIN_THREAD_FRAME => {
                if self.last_frame.is_some() {
                    self.main_frame_requested = true;
                }
            }
            names::NEEDS_BEGIN_FRAME_CHANGED => {
                let needs_begin_frame = event
                    .data_value("needsBeginFrame")
                    .is_some_and(|v| v.as_bool().unwrap_or(v.as_i64().unwrap_or(0) != 0));
                if needs_begin_frame {
                    self.last_needs_begin_frame = Some(event.ts);
                }
            }
            names::DROPPED_FRAME => {
                let partial = event
                    .arg("hasPartialUpdate")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                self.dropped_frame(event.ts, seq_id, partial);
            }
            _ => {}
        }
    }

    fn main_thread_event(&mut self, event: &TraceEvent) {
        if TOP_LEVEL_TASK_NAMES.contains(&event.name.as_str()) {
            self.last_task_begin_time = Some(event.ts);
        }
        let is_main_frame_marker = MAIN_FRAME_MARKERS.contains(&event.name.as_str());
        if self.frame_pending_commit.is_none() && is_main_frame_marker {
            self.frame_pending_commit = Some(PendingFrame {
                trigger_time: self.last_task_begin_time.unwrap_or(event.ts),
                main_frame_id: None,
            });
        }
        let Some(pending) = self.frame_pending_commit.as_mut() else {
            return;
        };
        if event.name == names::BEGIN_MAIN_THREAD_FRAME {
            if let Some(id) = event.data_i64("frameId") {
                pending.main_frame_id = Some(id);
            }
        }
        if (event.name == names::COMMIT || event.name == names::COMPOSITE_LAYERS)
            && event.arg("layerTreeId").and_then(serde_json::Value::as_i64) == self.layer_tree_id
        {
            self.commit();
        }
    }

    /// Feed events in time order; `active_thread` is the main thread in charge at that time
    fn add_event(&mut self, event: &TraceEvent, main_frame_id: &str, is_active_thread: bool) {
        if event.ts > MicroSeconds::ZERO
            && self.minimum_record_time.map_or(true, |min| event.ts < min)
        {
            self.minimum_record_time = Some(event.ts);
        }

        if event.name == names::SET_LAYER_TREE_ID {
            if event.data_str("frame") == Some(main_frame_id) {
                self.layer_tree_id = event.data_i64("layerTreeId");
            }
            return;
        }
        if COMPOSITOR_EVENTS.contains(&event.name.as_str()) {
            self.compositor_event(event);
        }
        if is_active_thread {
            self.main_thread_event(event);
        }
    }
}

fn is_frame_relevant(event: &TraceEvent) -> bool {
    let name = event.name.as_str();
    name == names::SET_LAYER_TREE_ID
        || COMPOSITOR_EVENTS.contains(&name)
        || MAIN_FRAME_MARKERS.contains(&name)
        || TOP_LEVEL_TASK_NAMES.contains(&name)
}

#[derive(Debug, Default)]
pub struct FramesHandler {
    state: HandlerState,
    events: Vec<Arc<TraceEvent>>,
    result: Option<Arc<FramesData>>,
}

impl FramesHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceHandler for FramesHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Frames
    }

    fn deps(&self) -> &'static [HandlerName] {
        &[HandlerName::Meta, HandlerName::Renderer]
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        if is_frame_relevant(event) {
            self.events.push(Arc::clone(event));
        }
        Ok(())
    }

    async fn finalize(&mut self, parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        let meta = require(self.name(), HandlerName::Meta, parsed.meta())?;
        let renderer = require(self.name(), HandlerName::Renderer, parsed.renderer())?;

        // Main-frame main threads ordered by when they first appear
        let mut main_threads: Vec<(ProcessId, ThreadId, MicroSeconds)> = renderer
            .main_frame_main_threads()
            .filter_map(|(pid, thread)| {
                thread.entries.first().map(|first| (pid, thread.tid, first.ts))
            })
            .collect();
        main_threads.sort_by_key(|(_, _, start)| *start);

        let mut events = std::mem::take(&mut self.events);
        events.sort_by_key(|e| e.ts);

        let mut model = FrameModel::default();
        let mut active = 0usize;
        for event in &events {
            while active + 1 < main_threads.len() && main_threads[active + 1].2 <= event.ts {
                active += 1;
            }
            let is_active_thread = main_threads
                .get(active)
                .is_some_and(|(pid, tid, _)| event.pid == *pid && event.tid == *tid);
            model.add_event(event, &meta.main_frame_id, is_active_thread);
        }

        let frames: Vec<Arc<TimelineFrame>> = model.frames.into_iter().map(Arc::new).collect();
        debug!(
            "Frames: {} frames from {} compositor events",
            frames.len(),
            events.len()
        );

        self.result = Some(Arc::new(FramesData { frames }));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::Frames)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}
