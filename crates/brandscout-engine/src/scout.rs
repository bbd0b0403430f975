use indexmap::IndexSet;
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

use brandscout_contracts::design::BrandQuery;

use crate::error::{error_chain_text, is_transport_error, truncate_text, ScoutError};

/// Upper bound on references shown per run.
pub const MAX_REFERENCES: usize = 3;

/// Query parameters for one image search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query_text: String,
    pub num: usize,
    pub search_type: &'static str,
    pub img_size: &'static str,
    pub safe: &'static str,
}

impl SearchRequest {
    pub fn for_query(query: &BrandQuery) -> Self {
        Self {
            query_text: query.search_text(),
            num: MAX_REFERENCES,
            search_type: "image",
            img_size: "large",
            safe: "active",
        }
    }
}

pub trait ImageSearch: Send + Sync {
    fn name(&self) -> &str;
    fn search(&self, request: &SearchRequest) -> Result<Vec<String>, ScoutError>;
}

#[derive(Debug)]
pub struct ScoutOutcome {
    pub references: Vec<String>,
    pub warning: Option<ScoutError>,
}

/// Runs one search and never fails: errors become a warning with no references.
pub fn scout(search: &dyn ImageSearch, query: &BrandQuery) -> ScoutOutcome {
    let request = SearchRequest::for_query(query);
    match search.search(&request) {
        Ok(links) => {
            let unique: IndexSet<String> = links
                .into_iter()
                .map(|link| link.trim().to_string())
                .filter(|link| !link.is_empty())
                .collect();
            let references: Vec<String> = unique.into_iter().take(MAX_REFERENCES).collect();
            tracing::debug!(
                provider = search.name(),
                count = references.len(),
                "reference search finished"
            );
            ScoutOutcome {
                references,
                warning: None,
            }
        }
        Err(err) => {
            tracing::warn!(provider = search.name(), error = %err, "reference search failed");
            ScoutOutcome {
                references: Vec::new(),
                warning: Some(err),
            }
        }
    }
}

/// Google Programmable Search (Custom Search JSON API) in image mode.
pub struct GoogleCustomSearch {
    api_base: String,
    api_key: Option<String>,
    engine_id: Option<String>,
    http: HttpClient,
}

impl GoogleCustomSearch {
    pub fn new(
        api_base: &str,
        api_key: Option<String>,
        engine_id: Option<String>,
        http: HttpClient,
    ) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            engine_id,
            http,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), ScoutError> {
        match (self.api_key.as_deref(), self.engine_id.as_deref()) {
            (Some(key), Some(cx)) => Ok((key, cx)),
            (None, None) => Err(ScoutError::MissingCredentials {
                message: "SEARCH_KEY and SEARCH_ENGINE_ID are not set".to_string(),
            }),
            (None, _) => Err(ScoutError::MissingCredentials {
                message: "SEARCH_KEY is not set".to_string(),
            }),
            (_, None) => Err(ScoutError::MissingCredentials {
                message: "SEARCH_ENGINE_ID is not set".to_string(),
            }),
        }
    }
}

impl ImageSearch for GoogleCustomSearch {
    fn name(&self) -> &str {
        "google-custom-search"
    }

    fn search(&self, request: &SearchRequest) -> Result<Vec<String>, ScoutError> {
        let (key, cx) = self.credentials()?;
        let num = request.num.to_string();
        tracing::debug!(q = %request.query_text, num = request.num, "requesting image search");
        let response = self
            .http
            .get(&self.api_base)
            .query(&[
                ("q", request.query_text.as_str()),
                ("cx", cx),
                ("key", key),
                ("searchType", request.search_type),
                ("num", num.as_str()),
                ("imgSize", request.img_size),
                ("safe", request.safe),
            ])
            .send()
            .map_err(|err| {
                let err = anyhow::Error::new(err);
                let prefix = if is_transport_error(&err) {
                    "transport error"
                } else {
                    "request error"
                };
                ScoutError::Transport {
                    message: format!("{prefix}: {}", error_chain_text(&err, 512)),
                }
            })?;
        let status = response.status();
        let body = response.text().map_err(|err| ScoutError::Transport {
            message: format!("response body read failed: {err}"),
        })?;
        if !status.is_success() {
            return Err(ScoutError::Api {
                status: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        let payload: Value =
            serde_json::from_str(&body).map_err(|err| ScoutError::InvalidResponse {
                message: format!("invalid JSON payload: {err}"),
            })?;
        extract_links(&payload)
    }
}

/// Pulls `items[].link` in order. A payload without `items` is a valid empty result.
pub fn extract_links(payload: &Value) -> Result<Vec<String>, ScoutError> {
    let Some(object) = payload.as_object() else {
        return Err(ScoutError::InvalidResponse {
            message: "expected a JSON object".to_string(),
        });
    };
    let items = match object.get("items") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ScoutError::InvalidResponse {
                message: "`items` is not an array".to_string(),
            })
        }
    };
    Ok(items
        .iter()
        .filter_map(|item| item.get("link").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use brandscout_contracts::design::BrandQuery;

    use super::{
        extract_links, scout, GoogleCustomSearch, ImageSearch, SearchRequest, MAX_REFERENCES,
    };
    use crate::error::ScoutError;

    struct FakeSearch {
        links: Vec<&'static str>,
        seen: Mutex<Vec<SearchRequest>>,
    }

    impl ImageSearch for FakeSearch {
        fn name(&self) -> &str {
            "fake"
        }

        fn search(&self, request: &SearchRequest) -> Result<Vec<String>, ScoutError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            Ok(self.links.iter().map(|link| link.to_string()).collect())
        }
    }

    struct TimedOutSearch;

    impl ImageSearch for TimedOutSearch {
        fn name(&self) -> &str {
            "timeout"
        }

        fn search(&self, _request: &SearchRequest) -> Result<Vec<String>, ScoutError> {
            Err(ScoutError::Transport {
                message: "operation timed out".to_string(),
            })
        }
    }

    #[test]
    fn request_uses_branding_keywords_and_fixed_filters() {
        let request = SearchRequest::for_query(&BrandQuery::default());
        assert_eq!(request.query_text, "Minimalist Wine Bar branding packaging");
        assert_eq!(request.num, 3);
        assert_eq!(request.search_type, "image");
        assert_eq!(request.img_size, "large");
        assert_eq!(request.safe, "active");
    }

    #[test]
    fn references_are_deduped_and_capped() {
        let search = FakeSearch {
            links: vec![
                "https://a.example/1.jpg",
                "https://a.example/1.jpg",
                " ",
                "https://b.example/2.jpg",
                "https://c.example/3.jpg",
                "https://d.example/4.jpg",
            ],
            seen: Mutex::new(Vec::new()),
        };
        let outcome = scout(&search, &BrandQuery::default());
        assert!(outcome.warning.is_none());
        assert_eq!(
            outcome.references,
            vec![
                "https://a.example/1.jpg".to_string(),
                "https://b.example/2.jpg".to_string(),
                "https://c.example/3.jpg".to_string(),
            ]
        );
        assert!(outcome.references.len() <= MAX_REFERENCES);
        assert_eq!(search.seen.lock().map(|seen| seen.len()).unwrap_or(0), 1);
    }

    #[test]
    fn search_failure_becomes_warning() {
        let outcome = scout(&TimedOutSearch, &BrandQuery::default());
        assert!(outcome.references.is_empty());
        assert!(matches!(
            outcome.warning,
            Some(ScoutError::Transport { ref message }) if message.contains("timed out")
        ));
    }

    #[test]
    fn missing_search_keys_fail_without_network() {
        let search = GoogleCustomSearch::new(
            "http://127.0.0.1:9/customsearch/v1",
            Some("key".to_string()),
            None,
            reqwest::blocking::Client::new(),
        );
        let outcome = scout(&search, &BrandQuery::default());
        assert!(outcome.references.is_empty());
        assert!(matches!(
            outcome.warning,
            Some(ScoutError::MissingCredentials { ref message }) if message.contains("SEARCH_ENGINE_ID")
        ));
    }

    #[test]
    fn extract_links_reads_items_in_order() -> anyhow::Result<()> {
        let payload = json!({
            "items": [
                {"link": "https://x.example/1.png", "title": "one"},
                {"title": "no link"},
                {"link": "https://x.example/2.png"}
            ]
        });
        assert_eq!(
            extract_links(&payload)?,
            vec![
                "https://x.example/1.png".to_string(),
                "https://x.example/2.png".to_string()
            ]
        );
        assert!(extract_links(&json!({"searchInformation": {}}))?.is_empty());
        Ok(())
    }

    #[test]
    fn extract_links_rejects_malformed_payloads() {
        assert!(matches!(
            extract_links(&json!([1, 2])),
            Err(ScoutError::InvalidResponse { .. })
        ));
        assert!(matches!(
            extract_links(&json!({"items": "nope"})),
            Err(ScoutError::InvalidResponse { .. })
        ));
    }
}
