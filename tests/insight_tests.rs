mod common;

use common::{process, RequestSpec, TraceBuilder, FRAME, MAIN_TID, RENDERER_PID};
use page_trace_studio::insights::{
    forced_reflow, generate_insights, generate_navigation_insights, lcp, render_blocking,
    third_parties, viewport, InsightContext, InsightWarning,
};
use page_trace_studio::lantern::SimulationProfile;
use page_trace_studio::utils::error::InsightError;
use pretty_assertions::assert_eq;
use serde_json::json;

const NAV: i64 = 1_000_000;

#[test]
fn test_simple_page_load_lcp_phases() {
    let parsed = process(common::simple_page_load().trace_file());
    let insight = lcp::generate_insight(&parsed, &InsightContext::new(FRAME, "NAV-1")).unwrap();

    let lcp_ms = insight.lcp_ms.unwrap();
    assert!((lcp_ms - 472.3).abs() < 1e-6, "lcp {}", lcp_ms);
    assert!(insight.warnings.is_empty());

    let phases = insight.phases.unwrap();
    assert!((phases.ttfb - 81.0).abs() < 1e-6, "ttfb {}", phases.ttfb);
    assert!((phases.ttfb + phases.render_delay - lcp_ms).abs() < 1e-6);
    assert_eq!(phases.load_delay, None);
    assert!(insight.lcp_request.is_none());
}

#[test]
fn test_simple_page_load_render_blocking_and_viewport() {
    let parsed = process(common::simple_page_load().trace_file());
    let profile = SimulationProfile::mobile_slow_4g();
    let insights = generate_navigation_insights(&parsed, FRAME, "NAV-1", Some(&profile)).unwrap();

    assert_eq!(insights.url.as_deref(), Some("https://example.test/"));
    assert!(insights.errors.is_empty(), "{:?}", insights.errors);

    let blocking = insights.render_blocking.unwrap();
    let ids: Vec<&str> = blocking.requests.iter().map(|r| r.request_id.as_str()).collect();
    assert_eq!(ids, vec!["CSS-1"]);
    assert!(insights.lantern_error.is_none(), "{:?}", insights.lantern_error);
    let savings = blocking.estimated_fcp_savings_ms.unwrap();
    assert!(savings > 0.0, "savings {}", savings);

    assert_eq!(insights.viewport.unwrap().mobile_optimized, Some(true));
}

#[test]
fn test_layout_inside_script_is_a_forced_reflow() {
    let call = json!({"functionName": "resize", "url": "https://example.test/app.js",
        "scriptId": "4", "lineNumber": 12, "columnNumber": 8});
    let parsed = process(
        TraceBuilder::new()
            .navigation(NAV, "NAV-1", "https://example.test/")
            .event(json!({"name": "RunTask", "ph": "X", "ts": NAV + 100_000, "dur": 90_000,
                "pid": RENDERER_PID, "tid": MAIN_TID,
                "cat": "disabled-by-default-devtools.timeline", "args": {}}))
            .event(json!({"name": "FunctionCall", "ph": "X", "ts": NAV + 101_000, "dur": 80_000,
                "pid": RENDERER_PID, "tid": MAIN_TID, "cat": "devtools.timeline",
                "args": {"data": call.clone()}}))
            .event(json!({"name": "Layout", "ph": "X", "ts": NAV + 110_000, "dur": 40_000,
                "pid": RENDERER_PID, "tid": MAIN_TID, "cat": "devtools.timeline",
                "args": {"beginData": {"stackTrace": [call]}}}))
            .trace_file(),
    );
    let insight =
        forced_reflow::generate_insight(&parsed, &InsightContext::new(FRAME, "NAV-1")).unwrap();

    assert_eq!(insight.events.len(), 1);
    assert_eq!(insight.events[0].duration_ms, 40.0);
    assert_eq!(insight.top_level_reflow_time_ms, 40.0);
    let top = insight.top_level_function_call.unwrap();
    assert_eq!(top.function_name, "resize");
    assert_eq!(top.line_number, Some(12));
    assert_eq!(insight.aggregated_bottom_up.len(), 1);

    // the fixture's layout runs outside any script
    let simple = process(common::simple_page_load().trace_file());
    let context = InsightContext::new(FRAME, "NAV-1");
    assert!(forced_reflow::generate_insight(&simple, &context).unwrap().events.is_empty());
}

#[test]
fn test_only_user_timing_marks_has_no_lcp() {
    let parsed = process(
        TraceBuilder::new()
            .navigation(NAV, "NAV-1", "https://example.test/")
            .user_timing_mark(NAV + 100_000, "app-start")
            .user_timing_mark(NAV + 200_000, "app-ready")
            .trace_file(),
    );
    let context = InsightContext::new(FRAME, "NAV-1");

    let insight = lcp::generate_insight(&parsed, &context).unwrap();
    assert_eq!(insight.lcp_ms, None);
    assert_eq!(insight.warnings, vec![InsightWarning::NoLcp]);

    let blocking = render_blocking::generate_insight(&parsed, &context).unwrap();
    assert_eq!(blocking.warnings, vec![InsightWarning::NoFcp]);

    assert_eq!(viewport::generate_insight(&parsed, &context).unwrap().mobile_optimized, None);
}

#[test]
fn test_missing_document_request_is_a_warning() {
    let parsed = process(
        TraceBuilder::new()
            .navigation(NAV, "NAV-1", "https://example.test/")
            .largest_contentful_paint(NAV + 300_000, "NAV-1", 1)
            .trace_file(),
    );
    let insight = lcp::generate_insight(&parsed, &InsightContext::new(FRAME, "NAV-1")).unwrap();
    assert_eq!(insight.lcp_ms, Some(300.0));
    assert_eq!(insight.phases, None);
    assert_eq!(insight.warnings, vec![InsightWarning::NoDocumentRequest]);
}

/// Three navigations, each loading its own document, blocking stylesheet
/// and third-party script
fn three_navigations() -> TraceBuilder {
    let mut builder = TraceBuilder::new();
    for (i, host) in ["one.test", "two.test", "three.test"].iter().enumerate() {
        let start = NAV + i as i64 * 2_000_000;
        let nav_id = format!("NAV-{}", i + 1);
        builder = builder
            .navigation(start, &nav_id, &format!("https://{}/", host))
            .request(&RequestSpec::new(
                &nav_id,
                &format!("https://{}/", host),
                "Document",
                start + 1_000,
                start + 100_000,
            ))
            .request(
                &RequestSpec::new(
                    &format!("CSS-{}", i + 1),
                    &format!("https://{}/style.css", host),
                    "Stylesheet",
                    start + 110_000,
                    start + 200_000,
                )
                .blocking(),
            )
            .request(
                &RequestSpec::new(
                    &format!("AD-{}", i + 1),
                    &format!("https://cdn.ads-{}.test/ad.js", i + 1),
                    "Script",
                    start + 300_000,
                    start + 400_000,
                )
                .size(5_000),
            )
            .first_contentful_paint(start + 250_000, &nav_id);
    }
    builder
}

#[test]
fn test_insights_only_see_their_navigation() {
    let parsed = process(three_navigations().trace_file());
    let context = InsightContext::new(FRAME, "NAV-2");

    let blocking = render_blocking::generate_insight(&parsed, &context).unwrap();
    let ids: Vec<&str> = blocking.requests.iter().map(|r| r.request_id.as_str()).collect();
    assert_eq!(ids, vec!["CSS-2"]);

    let parties = third_parties::generate_insight(&parsed, &context).unwrap();
    assert_eq!(parties.first_party_entity.as_deref(), Some("two.test"));
    let entities: Vec<(&str, usize)> = parties
        .entities
        .iter()
        .map(|e| (e.entity.as_str(), e.request_count))
        .collect();
    assert_eq!(entities, vec![("two.test", 2), ("ads-2.test", 1)]);
    let third: Vec<&str> = parties.third_parties().map(|e| e.entity.as_str()).collect();
    assert_eq!(third, vec!["ads-2.test"]);
}

#[test]
fn test_generate_insights_covers_every_navigation() {
    let parsed = process(three_navigations().trace_file());
    let all = generate_insights(&parsed, None).unwrap();

    let ids: Vec<&str> = all.iter().map(|n| n.navigation_id.as_str()).collect();
    assert_eq!(ids, vec!["NAV-1", "NAV-2", "NAV-3"]);
    for navigation in &all {
        assert!(navigation.metrics.is_empty());
        assert_eq!(navigation.warnings(), vec![InsightWarning::NoLcp]);
    }
}

#[test]
fn test_unknown_navigation_is_an_error() {
    let parsed = process(three_navigations().trace_file());
    let result = generate_navigation_insights(&parsed, FRAME, "NAV-9", None);
    assert!(matches!(result, Err(InsightError::NavigationNotFound(id)) if id == "NAV-9"));
}
