//! Whether the page declares a mobile-friendly viewport.

use super::InsightContext;
use crate::handlers::ParsedTraceData;
use crate::utils::error::InsightError;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewportInsight {
    /// `None` when the navigation parsed no viewport meta tag
    pub mobile_optimized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Split `width=device-width, initial-scale=1` into lowercase key/value pairs
pub fn parse_viewport_content(content: &str) -> HashMap<String, String> {
    content
        .split([',', ';'])
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.trim().to_ascii_lowercase();
            (!key.is_empty()).then(|| (key, value.trim().to_ascii_lowercase()))
        })
        .collect()
}

/// A viewport is mobile optimized if it tracks the device width or sets an initial scale
pub fn is_mobile_optimized(content: &str) -> bool {
    let properties = parse_viewport_content(content);
    let tracks_device_width = properties
        .get("width")
        .is_some_and(|width| width == "device-width");
    tracks_device_width || properties.contains_key("initial-scale")
}

/// Viewport insight of one navigation; the last viewport tag parsed wins
///
/// # Errors
/// * `InsightError::MissingData` - Meta missing
pub fn generate_insight(
    parsed: &ParsedTraceData,
    context: &InsightContext<'_>,
) -> Result<ViewportInsight, InsightError> {
    let scope = context.scope(parsed)?;
    let meta = parsed.meta()?;

    let content = meta
        .viewport_events
        .iter()
        .filter(|event| {
            let in_frame = event
                .frame_id()
                .map_or(true, |frame| frame == context.frame_id);
            scope.contains(event.ts) && in_frame
        })
        .filter_map(|event| event.data_str("content"))
        .last();

    Ok(ViewportInsight {
        mobile_optimized: content.map(is_mobile_optimized),
        content: content.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_optimized_viewports() {
        assert!(is_mobile_optimized("width=device-width, initial-scale=1"));
        assert!(is_mobile_optimized("initial-scale=1.0"));
        assert!(is_mobile_optimized("Width = Device-Width"));
        assert!(!is_mobile_optimized("width=1024"));
        assert!(!is_mobile_optimized(""));
    }

    #[test]
    fn test_parse_viewport_content() {
        let properties = parse_viewport_content("width=device-width; user-scalable=no, minimal-ui");
        assert_eq!(properties.get("width").map(String::as_str), Some("device-width"));
        assert_eq!(properties.get("user-scalable").map(String::as_str), Some("no"));
        assert_eq!(properties.get("minimal-ui").map(String::as_str), Some(""));
    }
}
