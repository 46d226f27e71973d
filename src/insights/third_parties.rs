//! Transfer size and main-thread time per third-party entity.
//!
//! Entities are root domains (or extension origins). Main-thread time is
//! attributed per top-level task, to the first script URL the task ran.

use super::InsightContext;
use crate::handlers::network_requests::SyntheticNetworkRequest;
use crate::handlers::ParsedTraceData;
use crate::helpers::{root_domain, NavigationScope};
use crate::types::MicroSeconds;
use crate::utils::error::InsightError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntitySummary {
    pub entity: String,
    pub request_count: usize,
    pub transfer_size: u64,
    pub main_thread_time_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThirdPartiesInsight {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_party_entity: Option<String>,
    /// Every entity, first party included, largest transfer first
    pub entities: Vec<EntitySummary>,
}

impl ThirdPartiesInsight {
    pub fn third_parties(&self) -> impl Iterator<Item = &EntitySummary> + '_ {
        self.entities
            .iter()
            .filter(move |summary| Some(&summary.entity) != self.first_party_entity.as_ref())
    }
}

/// Entity owning `request`, if it has one
pub fn entity_for(request: &SyntheticNetworkRequest) -> Option<String> {
    match request.scheme.as_str() {
        "chrome-extension" => Some(format!("chrome-extension://{}", request.host)),
        "http" | "https" if !request.host.is_empty() => Some(root_domain(&request.host)),
        _ => None,
    }
}

/// Main-thread time of each script URL during the navigation
fn time_by_url(
    parsed: &ParsedTraceData,
    scope: &NavigationScope,
) -> Result<HashMap<String, MicroSeconds>, InsightError> {
    let renderer = parsed.renderer()?;
    let mut times: HashMap<String, MicroSeconds> = HashMap::new();
    for (_, thread) in renderer.main_frame_main_threads() {
        for task in thread.tasks.iter().filter(|task| scope.contains(task.start_time)) {
            if let Some(url) = &task.attributable_url {
                let total = times.entry(url.clone()).or_default();
                *total = *total + task.duration;
            }
        }
    }
    Ok(times)
}

/// Group `requests` by entity
pub fn summarize(
    requests: &[&SyntheticNetworkRequest],
    time_by_url: &HashMap<String, MicroSeconds>,
) -> Vec<EntitySummary> {
    let mut by_entity: BTreeMap<String, EntitySummary> = BTreeMap::new();
    for request in requests {
        let Some(entity) = entity_for(request) else {
            continue;
        };
        let summary = by_entity.entry(entity.clone()).or_insert_with(|| EntitySummary {
            entity,
            ..EntitySummary::default()
        });
        summary.request_count += 1;
        summary.transfer_size += request.transfer_size;
        summary.main_thread_time_ms += time_by_url
            .get(&request.url)
            .map_or(0.0, |time| time.as_millis_f64());
    }

    let mut entities: Vec<EntitySummary> = by_entity.into_values().collect();
    entities.sort_by(|a, b| {
        b.transfer_size
            .cmp(&a.transfer_size)
            .then_with(|| a.entity.cmp(&b.entity))
    });
    entities
}

/// Third-party insight of one navigation
///
/// # Errors
/// * `InsightError::MissingData` - Meta, NetworkRequests or Renderer missing
pub fn generate_insight(
    parsed: &ParsedTraceData,
    context: &InsightContext<'_>,
) -> Result<ThirdPartiesInsight, InsightError> {
    let scope = context.scope(parsed)?;
    let requests = parsed.network_requests()?;

    let navigation_requests: Vec<&SyntheticNetworkRequest> = requests
        .by_time
        .iter()
        .filter(|request| request.frame == context.frame_id && scope.contains(request.ts))
        .map(|request| request.as_ref())
        .collect();

    let first_party_entity = scope
        .document_url()
        .and_then(|raw| url::Url::parse(raw).ok())
        .and_then(|parsed| parsed.host_str().map(root_domain));

    Ok(ThirdPartiesInsight {
        first_party_entity,
        entities: summarize(&navigation_requests, &time_by_url(parsed, &scope)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(url: &str, scheme: &str, host: &str, size: u64) -> SyntheticNetworkRequest {
        SyntheticNetworkRequest {
            url: url.to_string(),
            scheme: scheme.to_string(),
            host: host.to_string(),
            transfer_size: size,
            ..SyntheticNetworkRequest::default()
        }
    }

    #[test]
    fn test_entities() {
        assert_eq!(
            entity_for(&request("https://cdn.ads.test/a.js", "https", "cdn.ads.test", 0))
                .as_deref(),
            Some("ads.test")
        );
        assert_eq!(
            entity_for(&request("chrome-extension://abc/x.js", "chrome-extension", "abc", 0))
                .as_deref(),
            Some("chrome-extension://abc")
        );
        assert_eq!(entity_for(&request("data:image/png;base64,", "data", "", 0)), None);
    }

    #[test]
    fn test_summaries_group_by_root_domain() {
        let a = request("https://www.site.test/app.js", "https", "www.site.test", 1_000);
        let b = request("https://cdn.ads.test/ad.js", "https", "cdn.ads.test", 5_000);
        let c = request("https://img.ads.test/pixel.gif", "https", "img.ads.test", 100);
        let mut time = HashMap::new();
        time.insert("https://cdn.ads.test/ad.js".to_string(), MicroSeconds(42_000));

        let entities = summarize(&[&a, &b, &c], &time);
        assert_eq!(
            entities,
            vec![
                EntitySummary {
                    entity: "ads.test".to_string(),
                    request_count: 2,
                    transfer_size: 5_100,
                    main_thread_time_ms: 42.0,
                },
                EntitySummary {
                    entity: "site.test".to_string(),
                    request_count: 1,
                    transfer_size: 1_000,
                    main_thread_time_ms: 0.0,
                },
            ]
        );

        let insight = ThirdPartiesInsight {
            first_party_entity: Some("site.test".to_string()),
            entities,
        };
        assert_eq!(insight.third_parties().count(), 1);
    }
}
