//! Offline analysis of captured target-platform traffic
//!
//! Reads a proxy capture session (a JSON array of request records), keeps the
//! requests whose host matches one of the filters and summarizes them: host,
//! method and status distributions, authentication endpoints, activity and
//! workout endpoints with success rates, observed query parameters, and date
//! formats seen in request bodies. The most successful endpoints are turned
//! into [`EndpointCandidate`] lists ready to paste under `target.endpoints`.

mod report;

pub use report::render_text;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{EndpointCandidate, HttpMethod, ResponseShape};

/// Host substrings kept when no filter is given
pub const DEFAULT_HOST_FILTERS: [&str; 3] = ["whoop", "api-7", "app.whoop"];

/// Statuses counted as successful
pub const SUCCESS_STATUSES: [u16; 3] = [200, 201, 204];

/// Candidates suggested per operation
pub const MAX_SUGGESTIONS: usize = 5;

const AUTH_TERMS: [&str; 5] = ["oauth", "token", "login", "auth", "user"];

const MAX_PARAM_SAMPLES: usize = 5;

/// Analyzer errors
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Capture file could not be read
    #[error("Failed to read capture file {path}: {reason}")]
    Read {
        /// Capture path
        path: String,
        /// Detail
        reason: String,
    },

    /// Capture is not a JSON array of requests
    #[error("Failed to parse capture: {0}")]
    Parse(String),

    /// Suggestions could not be rendered
    #[error("Failed to render suggestions: {0}")]
    Render(String),
}

/// One captured request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapturedRequest {
    /// Host name
    #[serde(default)]
    pub host: String,
    /// Request path
    #[serde(default)]
    pub path: String,
    /// HTTP method
    #[serde(default)]
    pub method: String,
    /// Response status
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Raw query string
    #[serde(default)]
    pub query: Option<String>,
    /// Request side
    #[serde(default)]
    pub request: Option<CapturedMessage>,
    /// Response side
    #[serde(default)]
    pub response: Option<CapturedMessage>,
}

/// Headers and body of one side of an exchange
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapturedMessage {
    /// Header block
    #[serde(default)]
    pub header: Option<CapturedHeaders>,
    /// Body as captured: a JSON string, an object, or a `{ "text": ... }` wrapper
    #[serde(default)]
    pub body: Option<Value>,
}

/// Header block of a captured message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapturedHeaders {
    /// Header list
    #[serde(default)]
    pub headers: Vec<CapturedHeader>,
}

/// A single captured header
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapturedHeader {
    /// Header name
    #[serde(default)]
    pub name: String,
    /// Header value
    #[serde(default)]
    pub value: String,
}

impl CapturedRequest {
    fn status(&self) -> u16 {
        self.status_code.unwrap_or(0)
    }

    fn is_success(&self) -> bool {
        SUCCESS_STATUSES.contains(&self.status())
    }

    fn clean_path(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }

    fn key(&self) -> EndpointKey {
        EndpointKey {
            method: self.method.to_uppercase(),
            host: self.host.clone(),
            path: self.clean_path().to_string(),
        }
    }

    fn request_body(&self) -> Option<Value> {
        self.request.as_ref().and_then(|m| body_json(m.body.as_ref()))
    }

    fn response_body(&self) -> Option<Value> {
        self.response.as_ref().and_then(|m| body_json(m.body.as_ref()))
    }

    fn bearer_prefix(&self) -> Option<String> {
        self.request
            .as_ref()?
            .header
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("authorization"))
            .and_then(|h| h.value.strip_prefix("Bearer "))
            .map(|token| format!("{}...", token.chars().take(8).collect::<String>()))
    }
}

/// Body as JSON, whichever way the capture stored it
fn body_json(body: Option<&Value>) -> Option<Value> {
    match body? {
        Value::String(text) => serde_json::from_str(text).ok(),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(text)) => serde_json::from_str(text).ok(),
            _ => Some(Value::Object(map.clone())),
        },
        Value::Array(items) => Some(Value::Array(items.clone())),
        _ => None,
    }
}

/// Method, host and path of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EndpointKey {
    /// HTTP method
    pub method: String,
    /// Host name
    pub host: String,
    /// Path without the query string
    pub path: String,
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} https://{}{}", self.method, self.host, self.path)
    }
}

/// Request counts for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    /// Endpoint
    pub key: EndpointKey,
    /// Requests seen
    pub total: usize,
    /// Requests with a success status
    pub successful: usize,
}

impl EndpointStats {
    /// Successful share in percent
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }
}

/// Candidate lists keyed like `target.endpoints`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuggestedEndpoints {
    /// Activity listing candidates
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub find_strength_activities: Vec<EndpointCandidate>,
    /// Workout listing candidates
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub list_workouts: Vec<EndpointCandidate>,
    /// Workout creation candidates
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub create_workout: Vec<EndpointCandidate>,
    /// Link candidates
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub link_workout: Vec<EndpointCandidate>,
}

impl SuggestedEndpoints {
    /// Whether nothing was suggested
    pub fn is_empty(&self) -> bool {
        self.find_strength_activities.is_empty()
            && self.list_workouts.is_empty()
            && self.create_workout.is_empty()
            && self.link_workout.is_empty()
    }

    /// YAML for the `target.endpoints` section
    pub fn to_yaml(&self) -> Result<String, AnalyzerError> {
        serde_yaml::to_string(self).map_err(|e| AnalyzerError::Render(e.to_string()))
    }
}

/// Result of analyzing a capture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficReport {
    /// Requests in the capture
    pub total_requests: usize,
    /// Requests kept by the host filter
    pub matched_requests: usize,
    /// Requests per host, most frequent first
    pub hosts: Vec<(String, usize)>,
    /// Requests per method, most frequent first
    pub methods: Vec<(String, usize)>,
    /// Responses per status, most frequent first (0 when missing)
    pub statuses: Vec<(u16, usize)>,
    /// Endpoints that look like authentication
    pub auth_endpoints: Vec<EndpointKey>,
    /// Truncated bearer token prefixes seen
    pub bearer_prefixes: BTreeSet<String>,
    /// Endpoints whose path mentions activities
    pub activity_endpoints: Vec<EndpointStats>,
    /// Endpoints whose path mentions workouts
    pub workout_endpoints: Vec<EndpointStats>,
    /// Sample values per query parameter
    pub query_params: BTreeMap<String, BTreeSet<String>>,
    /// JSON value types per request body field
    pub body_fields: BTreeMap<String, BTreeSet<String>>,
    /// Date-like strings seen in request bodies
    pub date_formats: BTreeSet<String>,
    /// Candidate lists built from successful endpoints
    pub suggestions: SuggestedEndpoints,
}

/// Read and parse a capture file
pub fn load_capture(path: impl AsRef<Path>) -> Result<Vec<CapturedRequest>, AnalyzerError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| AnalyzerError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_capture(&content)
}

/// Parse capture JSON
pub fn parse_capture(content: &str) -> Result<Vec<CapturedRequest>, AnalyzerError> {
    serde_json::from_str(content).map_err(|e| AnalyzerError::Parse(e.to_string()))
}

/// Whether a host matches any filter (case-insensitive substring)
pub fn host_matches(host: &str, filters: &[String]) -> bool {
    let host = host.to_lowercase();
    filters
        .iter()
        .any(|filter| host.contains(&filter.to_lowercase()))
}

/// Default filters as owned strings
pub fn default_host_filters() -> Vec<String> {
    DEFAULT_HOST_FILTERS.iter().map(|s| s.to_string()).collect()
}

/// Analyze captured requests
///
/// An empty `host_filters` uses [`DEFAULT_HOST_FILTERS`].
pub fn analyze(requests: &[CapturedRequest], host_filters: &[String]) -> TrafficReport {
    let filters = if host_filters.is_empty() {
        default_host_filters()
    } else {
        host_filters.to_vec()
    };

    let matched: Vec<&CapturedRequest> = requests
        .iter()
        .filter(|r| host_matches(&r.host, &filters))
        .collect();

    info!(
        total = requests.len(),
        matched = matched.len(),
        "Analyzing captured traffic"
    );

    let date_pattern = regex_lite::Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}")
        .expect("Invalid regex pattern for date detection");

    let mut hosts = Counter::default();
    let mut methods = Counter::default();
    let mut statuses = Counter::default();
    let mut auth_endpoints = BTreeSet::new();
    let mut bearer_prefixes = BTreeSet::new();
    let mut query_params: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut body_fields: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut date_formats = BTreeSet::new();

    for request in &matched {
        hosts.add(request.host.clone());
        methods.add(request.method.to_uppercase());
        statuses.add(request.status());

        let path = request.clean_path().to_lowercase();
        if AUTH_TERMS.iter().any(|term| path.contains(term)) {
            auth_endpoints.insert(request.key());
        }
        if let Some(prefix) = request.bearer_prefix() {
            bearer_prefixes.insert(prefix);
        }

        for (name, value) in query_pairs(request.query.as_deref().unwrap_or_default()) {
            let samples = query_params.entry(name).or_default();
            if samples.len() < MAX_PARAM_SAMPLES {
                samples.insert(truncate(&value, 20));
            }
        }

        if let Some(Value::Object(body)) = request.request_body() {
            for (key, value) in &body {
                body_fields
                    .entry(key.clone())
                    .or_default()
                    .insert(json_type(value).to_string());
                if let Value::String(text) = value {
                    if date_pattern.is_match(text) {
                        date_formats.insert(text.clone());
                    }
                }
            }
        }
    }

    let activity: Vec<&CapturedRequest> = matched
        .iter()
        .copied()
        .filter(|r| r.clean_path().to_lowercase().contains("activit"))
        .collect();
    let workout: Vec<&CapturedRequest> = matched
        .iter()
        .copied()
        .filter(|r| r.clean_path().to_lowercase().contains("workout"))
        .collect();

    let suggestions = suggest_endpoints(&activity, &workout);
    debug!(
        activity_endpoints = activity.len(),
        workout_endpoints = workout.len(),
        "Built endpoint suggestions"
    );

    TrafficReport {
        total_requests: requests.len(),
        matched_requests: matched.len(),
        hosts: hosts.most_common(),
        methods: methods.most_common(),
        statuses: statuses.most_common(),
        auth_endpoints: auth_endpoints.into_iter().collect(),
        bearer_prefixes,
        activity_endpoints: endpoint_stats(&activity),
        workout_endpoints: endpoint_stats(&workout),
        query_params,
        body_fields,
        date_formats,
        suggestions,
    }
}

/// Counts in first-seen order, reported most frequent first
struct Counter<K> {
    counts: Vec<(K, usize)>,
}

impl<K> Default for Counter<K> {
    fn default() -> Self {
        Self { counts: Vec::new() }
    }
}

impl<K: PartialEq> Counter<K> {
    fn add(&mut self, key: K) {
        match self.counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((key, 1)),
        }
    }

    fn most_common(mut self) -> Vec<(K, usize)> {
        // Stable, so ties keep first-seen order
        self.counts.sort_by(|a, b| b.1.cmp(&a.1));
        self.counts
    }
}

fn endpoint_stats(requests: &[&CapturedRequest]) -> Vec<EndpointStats> {
    let mut stats: BTreeMap<EndpointKey, EndpointStats> = BTreeMap::new();
    for request in requests {
        let key = request.key();
        let entry = stats.entry(key.clone()).or_insert(EndpointStats {
            key,
            total: 0,
            successful: 0,
        });
        entry.total += 1;
        if request.is_success() {
            entry.successful += 1;
        }
    }
    stats.into_values().collect()
}

fn suggest_endpoints(
    activity: &[&CapturedRequest],
    workout: &[&CapturedRequest],
) -> SuggestedEndpoints {
    let mut suggestions = SuggestedEndpoints::default();

    for candidate in top_candidates(activity) {
        if candidate.method == HttpMethod::Get
            && !candidate.path.to_lowercase().contains("workout")
            && !has_path_placeholder(&candidate)
        {
            suggestions.find_strength_activities.push(candidate);
        }
    }

    for candidate in top_candidates(workout) {
        let lower = candidate.path.to_lowercase();
        match candidate.method {
            HttpMethod::Post if lower.contains("{activity_id}") || lower.contains("link") => {
                suggestions.link_workout.push(candidate)
            }
            HttpMethod::Put => suggestions.link_workout.push(candidate),
            // Listing and creating fill no record ids
            _ if has_path_placeholder(&candidate) => {}
            HttpMethod::Get => suggestions.list_workouts.push(candidate),
            HttpMethod::Post => suggestions.create_workout.push(candidate),
        }
    }

    suggestions
}

fn has_path_placeholder(candidate: &EndpointCandidate) -> bool {
    candidate.path.contains('{')
}

/// Most successful endpoints as candidates, best first
fn top_candidates(requests: &[&CapturedRequest]) -> Vec<EndpointCandidate> {
    struct Tally<'a> {
        count: usize,
        statuses: BTreeSet<u16>,
        sample: &'a CapturedRequest,
    }

    let mut order: Vec<EndpointKey> = Vec::new();
    let mut tallies: HashMap<EndpointKey, Tally<'_>> = HashMap::new();

    for request in requests.iter().filter(|r| r.is_success()) {
        let key = request.key();
        let tally = tallies.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Tally {
                count: 0,
                statuses: BTreeSet::new(),
                sample: *request,
            }
        });
        tally.count += 1;
        tally.statuses.insert(request.status());
    }

    order.sort_by(|a, b| {
        let count = |k: &EndpointKey| tallies.get(k).map_or(0, |t| t.count);
        count(b).cmp(&count(a))
    });

    order
        .into_iter()
        .filter_map(|key| {
            let tally = tallies.get(&key)?;
            let method = key.method.parse::<HttpMethod>().ok()?;
            let shape = infer_shape(tally.sample.response_body().as_ref());
            let statuses: Vec<u16> = tally.statuses.iter().copied().collect();

            let mut candidate = EndpointCandidate::new(
                format!("https://{}", key.host),
                templatize_path(&key.path),
                method,
                shape,
            )
            .accepting(&statuses);
            for (name, value) in query_pairs(tally.sample.query.as_deref().unwrap_or_default()) {
                let template = query_template(&name).unwrap_or(value.as_str()).to_string();
                candidate = candidate.with_query(&name, &template);
            }
            Some(candidate)
        })
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Response shape that would parse a body
pub fn infer_shape(body: Option<&Value>) -> ResponseShape {
    const ENVELOPES: [(&str, ResponseShape); 4] = [
        ("records", ResponseShape::Records),
        ("data", ResponseShape::Data),
        ("activities", ResponseShape::Activities),
        ("results", ResponseShape::Results),
    ];

    match body {
        Some(Value::Array(_)) => ResponseShape::BareList,
        Some(Value::Object(map)) => ENVELOPES
            .iter()
            .find(|(key, _)| map.get(*key).is_some_and(Value::is_array))
            .map(|(_, shape)| *shape)
            .unwrap_or(ResponseShape::SingleObject),
        _ => ResponseShape::Empty,
    }
}

/// Replace id-like path segments with placeholders
///
/// A segment following one that mentions activities becomes `{activity_id}`
/// and one following a workout segment becomes `{workout_id}`. Other ids, such
/// as a user id, are specific to the captured account and stay literal.
pub fn templatize_path(path: &str) -> String {
    let mut previous = "";
    path.split('/')
        .map(|segment| {
            let prev = previous.to_lowercase();
            let replaced = match looks_like_id(segment) {
                true if prev.contains("activit") => "{activity_id}".to_string(),
                true if prev.contains("workout") => "{workout_id}".to_string(),
                _ => segment.to_string(),
            };
            previous = segment;
            replaced
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_like_id(segment: &str) -> bool {
    let numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
    let uuid = segment.len() == 36
        && segment.chars().filter(|c| *c == '-').count() == 4
        && segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    numeric || uuid
}

fn query_template(name: &str) -> Option<&'static str> {
    match name {
        "start" | "startTime" | "from" => Some("{start}"),
        "end" | "endTime" | "to" => Some("{end}"),
        "limit" => Some("{limit}"),
        "sport_id" | "sportId" => Some("{sport_id}"),
        _ => None,
    }
}

fn query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() > max_chars {
        format!("{}...", value.chars().take(max_chars).collect::<String>())
    } else {
        value.to_string()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
