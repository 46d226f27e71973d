//! Auction worklet processes.
//!
//! The top-level pid of `AuctionWorkletRunningInProcess` and
//! `AuctionWorkletDoneWithProcess` is the browser; the worklet's own
//! process is `args.data.pid`. Either event alone is enough to report a
//! worklet, and both are paired by `args.data.target` when present. A
//! worklet is only reported when its process named both its utility and
//! V8 helper threads.

use super::types::{HandlerData, HandlerName, HandlerState, ParsedTraceData, TraceHandler};
use crate::types::{names, MicroSeconds, Phase, ProcessId, TraceEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const UTILITY_THREAD_NAME: &str = "auction_worklet.CrUtilityMain";
const V8_HELPER_THREAD_NAME: &str = "AuctionV8HelperThread";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuctionWorkletType {
    Bidder,
    Seller,
    Unknown,
}

impl AuctionWorkletType {
    fn parse(raw: &str) -> Self {
        match raw {
            "bidder" => AuctionWorkletType::Bidder,
            "seller" => AuctionWorkletType::Seller,
            _ => AuctionWorkletType::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticAuctionWorklet {
    pub target: String,
    /// Process the worklet ran in
    pub pid: ProcessId,
    pub host: Option<String>,
    pub worklet_type: AuctionWorkletType,
    /// Timestamp of whichever event created the worklet
    pub ts: MicroSeconds,
    pub running_in_process_event: Option<Arc<TraceEvent>>,
    pub done_with_process_event: Option<Arc<TraceEvent>>,
    pub utility_thread: Arc<TraceEvent>,
    pub v8_helper_thread: Arc<TraceEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct AuctionWorkletsData {
    pub worklets: Vec<Arc<SyntheticAuctionWorklet>>,
}

#[derive(Debug, Default)]
pub struct AuctionWorkletsHandler {
    state: HandlerState,
    running_in_process: Vec<Arc<TraceEvent>>,
    done_with_process: Vec<Arc<TraceEvent>>,
    utility_threads: HashMap<ProcessId, Arc<TraceEvent>>,
    v8_helper_threads: HashMap<ProcessId, Arc<TraceEvent>>,
    result: Option<Arc<AuctionWorkletsData>>,
}

impl AuctionWorkletsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge(
        &self,
        worklets: &mut BTreeMap<String, SyntheticAuctionWorklet>,
        event: &Arc<TraceEvent>,
        running: bool,
    ) {
        let Some(pid) = event.data_i64("pid").map(ProcessId) else {
            return;
        };
        let (Some(utility), Some(helper)) =
            (self.utility_threads.get(&pid), self.v8_helper_threads.get(&pid))
        else {
            return;
        };
        let Some(target) = event.data_str("target") else {
            return;
        };

        let worklet = worklets
            .entry(target.to_string())
            .or_insert_with(|| SyntheticAuctionWorklet {
                target: target.to_string(),
                pid,
                host: event.data_str("host").map(str::to_string),
                worklet_type: AuctionWorkletType::parse(event.data_str("type").unwrap_or_default()),
                ts: event.ts,
                running_in_process_event: None,
                done_with_process_event: None,
                utility_thread: Arc::clone(utility),
                v8_helper_thread: Arc::clone(helper),
            });
        if running {
            worklet.running_in_process_event = Some(Arc::clone(event));
        } else {
            worklet.done_with_process_event = Some(Arc::clone(event));
        }
    }
}

#[async_trait]
impl TraceHandler for AuctionWorkletsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::AuctionWorklets
    }

    fn reset(&mut self) {
        *self = Self {
            state: HandlerState::Initialized,
            ..Self::default()
        };
    }

    fn handle_event(&mut self, event: &Arc<TraceEvent>) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;
        match event.name.as_str() {
            names::AUCTION_WORKLET_RUNNING => self.running_in_process.push(Arc::clone(event)),
            names::AUCTION_WORKLET_DONE => self.done_with_process.push(Arc::clone(event)),
            names::THREAD_NAME if event.ph == Phase::Metadata => match event.arg_str("name") {
                Some(UTILITY_THREAD_NAME) => {
                    self.utility_threads.insert(event.pid, Arc::clone(event));
                }
                Some(V8_HELPER_THREAD_NAME) => {
                    self.v8_helper_threads.insert(event.pid, Arc::clone(event));
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }

    async fn finalize(&mut self, _parsed: &ParsedTraceData) -> Result<(), HandlerError> {
        self.state.ensure_initialized(self.name())?;

        let mut worklets = BTreeMap::new();
        for event in &self.running_in_process {
            self.merge(&mut worklets, event, true);
        }
        for event in &self.done_with_process {
            self.merge(&mut worklets, event, false);
        }

        let mut worklets: Vec<Arc<SyntheticAuctionWorklet>> =
            worklets.into_values().map(Arc::new).collect();
        worklets.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.target.cmp(&b.target)));

        self.result = Some(Arc::new(AuctionWorkletsData { worklets }));
        self.state = HandlerState::Finalized;
        Ok(())
    }

    fn data(&self) -> Result<HandlerData, HandlerError> {
        self.state.ensure_finalized(self.name())?;
        self.result
            .clone()
            .map(HandlerData::AuctionWorklets)
            .ok_or(HandlerError::NotFinalized(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn run(raw: Vec<serde_json::Value>) -> Arc<AuctionWorkletsData> {
        let mut handler = AuctionWorkletsHandler::new();
        handler.reset();
        for value in raw {
            handler
                .handle_event(&Arc::new(serde_json::from_value(value).unwrap()))
                .unwrap();
        }
        block_on(handler.finalize(&ParsedTraceData::default())).unwrap();
        let HandlerData::AuctionWorklets(data) = handler.data().unwrap() else {
            panic!("wrong data");
        };
        data
    }

    fn thread_names(pid: i64) -> Vec<serde_json::Value> {
        vec![
            json!({"name": "thread_name", "ph": "M", "ts": 0, "pid": pid, "tid": 1, "args": {"name": "auction_worklet.CrUtilityMain"}}),
            json!({"name": "thread_name", "ph": "M", "ts": 0, "pid": pid, "tid": 2, "args": {"name": "AuctionV8HelperThread"}}),
        ]
    }

    #[test]
    fn test_pairs_running_and_done_by_target() {
        let mut raw = thread_names(50);
        raw.push(json!({"name": "AuctionWorkletRunningInProcess", "ph": "I", "ts": 100, "pid": 1,
            "args": {"data": {"pid": 50, "target": "T1", "type": "seller", "host": "https://ssp.test"}}}));
        raw.push(json!({"name": "AuctionWorkletDoneWithProcess", "ph": "I", "ts": 900, "pid": 1,
            "args": {"data": {"pid": 50, "target": "T1", "type": "seller", "host": "https://ssp.test"}}}));

        let data = run(raw);
        assert_eq!(data.worklets.len(), 1);
        let worklet = &data.worklets[0];
        assert_eq!(worklet.pid, ProcessId(50));
        assert_eq!(worklet.worklet_type, AuctionWorkletType::Seller);
        assert!(worklet.running_in_process_event.is_some());
        assert!(worklet.done_with_process_event.is_some());
    }

    #[test]
    fn test_done_event_alone_creates_worklet() {
        let mut raw = thread_names(60);
        raw.push(json!({"name": "AuctionWorkletDoneWithProcess", "ph": "I", "ts": 5, "pid": 1,
            "args": {"data": {"pid": 60, "target": "T2", "type": "bidder"}}}));

        let data = run(raw);
        assert_eq!(data.worklets.len(), 1);
        assert_eq!(data.worklets[0].worklet_type, AuctionWorkletType::Bidder);
        assert!(data.worklets[0].running_in_process_event.is_none());
    }

    #[test]
    fn test_missing_thread_names_drop_worklet() {
        let raw = vec![
            json!({"name": "thread_name", "ph": "M", "ts": 0, "pid": 70, "tid": 1, "args": {"name": "auction_worklet.CrUtilityMain"}}),
            json!({"name": "AuctionWorkletRunningInProcess", "ph": "I", "ts": 5, "pid": 1,
                "args": {"data": {"pid": 70, "target": "T3", "type": "bidder"}}}),
        ];
        assert!(run(raw).worklets.is_empty());
    }
}
