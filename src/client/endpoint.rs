//! Endpoint candidates and response shapes
//!
//! An undocumented API moves its endpoints and envelopes around. Each logical
//! [`Operation`] is therefore described by an ordered list of
//! [`EndpointCandidate`]s, each pairing a URL with the [`ResponseShape`] that
//! knows how to pull records out of its body.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder values substituted into candidate paths and query templates
pub type TemplateVars = BTreeMap<String, String>;

/// Logical operations the adapters perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Source session login
    SourceLogin,
    /// Source workout listing
    SourceWorkouts,
    /// Source per-workout performance detail
    SourcePerformance,
    /// Target strength activity listing
    FindStrengthActivities,
    /// Target workout listing
    ListWorkouts,
    /// Target workout creation
    CreateWorkout,
    /// Target workout-to-activity link
    LinkWorkout,
}

impl Operation {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SourceLogin => "source_login",
            Operation::SourceWorkouts => "source_workouts",
            Operation::SourcePerformance => "source_performance",
            Operation::FindStrengthActivities => "find_strength_activities",
            Operation::ListWorkouts => "list_workouts",
            Operation::CreateWorkout => "create_workout",
            Operation::LinkWorkout => "link_workout",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    #[default]
    Get,
    /// POST
    Post,
    /// PUT
    Put,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            other => Err(format!("unsupported method `{}`", other)),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// How records are laid out in a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// `{"records": [...]}`
    #[default]
    Records,
    /// `{"data": [...]}`
    Data,
    /// `{"activities": [...]}`
    Activities,
    /// `{"results": [...]}`
    Results,
    /// `[...]`
    BareList,
    /// A single object; an empty body yields no records
    SingleObject,
    /// Body is ignored
    Empty,
}

impl ResponseShape {
    fn envelope_key(&self) -> Option<&'static str> {
        match self {
            ResponseShape::Records => Some("records"),
            ResponseShape::Data => Some("data"),
            ResponseShape::Activities => Some("activities"),
            ResponseShape::Results => Some("results"),
            _ => None,
        }
    }

    /// Extract records from a response body
    ///
    /// An empty list is a valid result. A body that does not have this shape
    /// is an error carrying a short reason.
    pub fn extract(&self, body: &[u8]) -> Result<Vec<Value>, String> {
        match self {
            ResponseShape::Empty => Ok(Vec::new()),
            ResponseShape::SingleObject => {
                if body.iter().all(u8::is_ascii_whitespace) {
                    return Ok(Vec::new());
                }
                match parse_body(body)? {
                    value @ Value::Object(_) => Ok(vec![value]),
                    _ => Err("expected a JSON object".to_string()),
                }
            }
            ResponseShape::BareList => match parse_body(body)? {
                Value::Array(items) => Ok(items),
                _ => Err("expected a JSON array".to_string()),
            },
            envelope => {
                let key = envelope.envelope_key().unwrap_or("records");
                match parse_body(body)? {
                    Value::Object(mut map) => match map.remove(key) {
                        Some(Value::Array(items)) => Ok(items),
                        Some(Value::Null) | None => Err(format!("missing `{}` envelope", key)),
                        Some(_) => Err(format!("`{}` is not a list", key)),
                    },
                    _ => Err(format!("expected an object with `{}`", key)),
                }
            }
        }
    }
}

fn parse_body(body: &[u8]) -> Result<Value, String> {
    serde_json::from_slice(body).map_err(|e| format!("unparseable body: {}", e))
}

/// One way of reaching a logical operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCandidate {
    /// Scheme and host, e.g. `https://api.prod.whoop.com`
    pub base_url: String,

    /// Path template, e.g. `/activities-service/v1/activities/{activity_id}/workout`
    pub path: String,

    /// HTTP method
    #[serde(default)]
    pub method: HttpMethod,

    /// Response shape parser
    #[serde(default)]
    pub shape: ResponseShape,

    /// Query parameter templates
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,

    /// Statuses counted as success for this candidate
    #[serde(default = "default_accept_status")]
    pub accept_status: Vec<u16>,
}

fn default_accept_status() -> Vec<u16> {
    vec![200]
}

impl EndpointCandidate {
    /// Create a candidate accepting only 200
    pub fn new(
        base_url: impl Into<String>,
        path: impl Into<String>,
        method: HttpMethod,
        shape: ResponseShape,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            method,
            shape,
            query: BTreeMap::new(),
            accept_status: default_accept_status(),
        }
    }

    /// Add a query parameter template
    pub fn with_query(mut self, name: &str, template: &str) -> Self {
        self.query.insert(name.to_string(), template.to_string());
        self
    }

    /// Replace the accepted statuses
    pub fn accepting(mut self, statuses: &[u16]) -> Self {
        self.accept_status = statuses.to_vec();
        self
    }

    /// Whether a status counts as success
    pub fn accepts(&self, status: u16) -> bool {
        self.accept_status.contains(&status)
    }

    /// Fully substituted URL without the query string
    pub fn url(&self, vars: &TemplateVars) -> Result<String, String> {
        let path = fill_template(&self.path, vars)?;
        Ok(format!("{}{}", self.base_url.trim_end_matches('/'), path))
    }

    /// Substituted query parameters
    pub fn query_pairs(&self, vars: &TemplateVars) -> Result<Vec<(String, String)>, String> {
        self.query
            .iter()
            .map(|(name, template)| Ok((name.clone(), fill_template(template, vars)?)))
            .collect()
    }

    /// Short label used in logs and exhaustion reports
    pub fn label(&self) -> String {
        format!(
            "{} {}{}",
            self.method,
            self.base_url.trim_end_matches('/'),
            self.path
        )
    }
}

/// Replace `{name}` placeholders with values from `vars`
///
/// A placeholder without a value is an error.
pub fn fill_template(template: &str, vars: &TemplateVars) -> Result<String, String> {
    let re = regex_lite::Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .expect("Invalid regex pattern for template placeholders");

    let mut missing = None;
    let filled = re.replace_all(template, |caps: &regex_lite::Captures| {
        match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(format!("unfilled placeholder `{{{}}}`", name)),
        None => Ok(filled.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // Test 1: Envelope shapes extract their list
    #[test]
    fn test_envelope_shapes() {
        let body = br#"{"records": [{"id": 1}, {"id": 2}], "next_token": null}"#;
        assert_eq!(ResponseShape::Records.extract(body).unwrap().len(), 2);

        let body = br#"{"data": []}"#;
        assert!(ResponseShape::Data.extract(body).unwrap().is_empty());

        let body = br#"{"activities": [{"id": "a"}]}"#;
        assert_eq!(ResponseShape::Activities.extract(body).unwrap().len(), 1);
    }

    // Test 2: Wrong envelope is a parse failure, not an empty result
    #[test]
    fn test_wrong_envelope_rejected() {
        let body = br#"{"data": [{"id": 1}]}"#;
        let err = ResponseShape::Records.extract(body).unwrap_err();
        assert_eq!(err, "missing `records` envelope");

        let body = br#"{"records": {"id": 1}}"#;
        assert!(ResponseShape::Records.extract(body).is_err());

        assert!(ResponseShape::Results.extract(b"not json").is_err());
    }

    // Test 3: Bare list and single object shapes
    #[test]
    fn test_bare_list_and_single_object() {
        assert_eq!(
            ResponseShape::BareList.extract(br#"[{"id": 1}]"#).unwrap().len(),
            1
        );
        assert!(ResponseShape::BareList.extract(br#"{"id": 1}"#).is_err());

        let records = ResponseShape::SingleObject.extract(br#"{"id": 9}"#).unwrap();
        assert_eq!(records[0]["id"], 9);
        assert!(ResponseShape::SingleObject.extract(b"  ").unwrap().is_empty());
        assert!(ResponseShape::SingleObject.extract(b"[1]").is_err());
    }

    // Test 4: Empty shape ignores the body
    #[test]
    fn test_empty_shape() {
        assert!(ResponseShape::Empty.extract(b"<html>ok</html>").unwrap().is_empty());
    }

    // Test 5: URL and query templating
    #[test]
    fn test_url_and_query_templating() {
        let candidate = EndpointCandidate::new(
            "https://api.example.com/",
            "/v1/activities/{activity_id}/workout",
            HttpMethod::Post,
            ResponseShape::Empty,
        )
        .with_query("start", "{start}")
        .with_query("limit", "25");

        let vars = vars(&[("activity_id", "a-1"), ("start", "2025-04-01T00:00:00.000Z")]);

        assert_eq!(
            candidate.url(&vars).unwrap(),
            "https://api.example.com/v1/activities/a-1/workout"
        );
        assert_eq!(
            candidate.query_pairs(&vars).unwrap(),
            vec![
                ("limit".to_string(), "25".to_string()),
                ("start".to_string(), "2025-04-01T00:00:00.000Z".to_string()),
            ]
        );
        assert_eq!(
            candidate.label(),
            "POST https://api.example.com/v1/activities/{activity_id}/workout"
        );
    }

    // Test 6: Unfilled placeholders fail
    #[test]
    fn test_unfilled_placeholder() {
        let err = fill_template("/user/{user_id}/workouts", &TemplateVars::new()).unwrap_err();
        assert_eq!(err, "unfilled placeholder `{user_id}`");
    }

    // Test 7: Candidates deserialize with defaults
    #[test]
    fn test_candidate_deserialize_defaults() {
        let yaml = r#"
base_url: "https://api.example.com"
path: "/v0/workouts"
"#;
        let candidate: EndpointCandidate = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(candidate.method, HttpMethod::Get);
        assert_eq!(candidate.shape, ResponseShape::Records);
        assert_eq!(candidate.accept_status, vec![200]);
        assert!(candidate.accepts(200));
        assert!(!candidate.accepts(201));

        let yaml = r#"
base_url: "https://api.example.com"
path: "/v0/workouts"
method: POST
shape: single_object
accept_status: [200, 201, 409]
"#;
        let candidate: EndpointCandidate = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(candidate.method, HttpMethod::Post);
        assert_eq!(candidate.shape, ResponseShape::SingleObject);
        assert!(candidate.accepts(409));
    }

    // Test 8: Operation display names
    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::FindStrengthActivities.to_string(), "find_strength_activities");
        assert_eq!(
            serde_json::to_string(&Operation::CreateWorkout).unwrap(),
            "\"create_workout\""
        );
    }

    // Test 9: Method names parse case-insensitively
    #[test]
    fn test_method_from_str() {
        assert_eq!("get".parse::<HttpMethod>(), Ok(HttpMethod::Get));
        assert_eq!("POST".parse::<HttpMethod>(), Ok(HttpMethod::Post));
        assert!("DELETE".parse::<HttpMethod>().is_err());
    }
}
