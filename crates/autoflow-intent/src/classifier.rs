//! Intent classifier: turns an utterance plus recent history into an [`Intent`].
//!
//! Classification uses a two-tier approach:
//!
//! 1. **Model path**: when a [`CompletionModel`] is attached, it is asked for
//!    a strict JSON intent record.
//! 2. **Fallback path**: a deterministic [`KeywordRouter`] detects the
//!    category by keyword and pulls structured values (addresses, names,
//!    schedules) out with regexes.
//!
//! [`IntentClassifier::classify`] never fails.  A model error or malformed
//! answer degrades to the fallback path with lowered confidence and the
//! reason recorded on the intent.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use autoflow_agent::{CompletionModel, Message, strip_code_fences};
use autoflow_kernel::{KeywordRouter, RouteResult};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Automation category of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Email,
    Content,
    Data,
    Scheduling,
    Tasks,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Email,
        Category::Content,
        Category::Data,
        Category::Scheduling,
        Category::Tasks,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Content => "content",
            Self::Data => "data",
            Self::Scheduling => "scheduling",
            Self::Tasks => "tasks",
            Self::Other => "other",
        }
    }

    /// Lenient parse; anything unrecognised is `Other`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many chained actions an utterance asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// Ordinal used to measure how far apart two complexities are.
    pub fn rank(self) -> u8 {
        match self {
            Self::Simple => 0,
            Self::Medium => 1,
            Self::Complex => 2,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "medium" => Some(Self::Medium),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }
}

/// Which tier produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Llm,
    Fallback,
}

/// Structured classification of one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub is_automation: bool,
    pub category: Category,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
    pub extracted_parameters: BTreeMap<String, String>,
    pub missing_parameters: Vec<String>,
    /// The utterance the intent was built from.
    pub text: String,
    pub complexity: Complexity,
    pub source: IntentSource,
    /// Why the model path was abandoned, if it was.
    pub fallback_reason: Option<String>,
}

impl Intent {
    /// A non-automation intent for `text`.
    pub fn conversational(text: impl Into<String>) -> Self {
        Self {
            is_automation: false,
            category: Category::Other,
            confidence: 0.0,
            extracted_parameters: BTreeMap::new(),
            missing_parameters: Vec::new(),
            text: text.into(),
            complexity: Complexity::Simple,
            source: IntentSource::Fallback,
            fallback_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback tables
// ---------------------------------------------------------------------------

/// Keyword phrases per category.  Scheduling is registered last so that an
/// action keyword wins a tie against a cadence word.
const KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Email,
        &["email", "e-mail", "mail", "inbox", "newsletter"],
    ),
    (
        Category::Content,
        &[
            "write", "draft", "blog", "post", "article", "content", "summarize", "generate",
        ],
    ),
    (
        Category::Data,
        &[
            "report",
            "export",
            "csv",
            "spreadsheet",
            "data",
            "query",
            "analytics",
            "invoice",
        ],
    ),
    (
        Category::Tasks,
        &["task", "todo", "to-do", "ticket", "assign", "board", "project"],
    ),
    (
        Category::Scheduling,
        &["every", "daily", "weekly", "hourly", "schedule", "remind", "cron"],
    ),
];

/// Entity extractors, registered in order.  Earlier patterns win for a
/// shared entity name.
const EXTRACTORS: &[(&str, &str)] = &[
    (
        "recipient",
        r"(?P<value>[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})",
    ),
    ("url", r#"(?P<value>https?://[^\s"'<>]+)"#),
    ("name", r#""(?P<value>[^"]+)""#),
    (
        "name",
        r"(?i)\b(?:called|named|titled)\s+(?P<value>[A-Za-z0-9][\w\- ]*?)(?:\s+(?:in|for|to|on|by|every|at|about)\b|[.,!?]|$)",
    ),
    (
        "project",
        r"(?i)\bin\s+(?:the\s+)?(?P<value>[A-Za-z0-9][\w\-]*)\s+project\b",
    ),
    ("project", r"(?i)\bproject\s+(?P<value>[A-Za-z0-9][\w\-]*)"),
    (
        "schedule",
        r"(?i)\b(?P<value>every\s+(?:\d+\s+)?(?:minute|hour|day|week|morning|evening)s?|hourly|daily|weekly)\b",
    ),
    (
        "at_time",
        r"(?i)\bat\s+(?P<value>\d{1,2}(?::\d{2})?\s*(?:am|pm)?)(?:\s|$|[.,!?])",
    ),
    (
        "topic",
        r"(?i)\babout\s+(?P<value>.+?)(?:\s+(?:every|daily|weekly|hourly|to|for|then|and then)\b|[.!?\n]|$)",
    ),
    ("amount", r"\$\s?(?P<value>\d+(?:\.\d{1,2})?)"),
];

/// Words inside a `project` capture that are not project names.
const PROJECT_STOPWORDS: &[&str] = &["called", "named", "titled", "board", "the", "a"];

/// Phrases that chain actions together.
const CONNECTORS: &[&str] = &[" then ", " after that ", " afterwards "];

/// Parameters each category needs before its templates can compile.
fn expected_parameters(category: Category) -> &'static [&'static str] {
    match category {
        Category::Email => &["recipient"],
        Category::Tasks => &["name", "project"],
        Category::Content => &["topic"],
        _ => &[],
    }
}

/// The parameter whose presence raises fallback confidence.
fn key_entity(category: Category) -> Option<&'static str> {
    match category {
        Category::Email => Some("recipient"),
        Category::Tasks => Some("name"),
        Category::Content => Some("topic"),
        _ => None,
    }
}

const FALLBACK_BASE_CONFIDENCE: f64 = 0.7;
const FALLBACK_MAX_CONFIDENCE: f64 = 0.9;
const FALLBACK_OTHER_CONFIDENCE: f64 = 0.3;
const MODEL_FAILURE_PENALTY: f64 = 0.1;

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = r#"You classify user messages for a workflow automation assistant.

Respond ONLY with a JSON object:
{
  "is_automation": true | false,
  "category": "email" | "content" | "data" | "scheduling" | "tasks" | "other",
  "confidence": 0.0-1.0,
  "extracted_parameters": {"key": "value", ...},
  "missing_parameters": ["key", ...],
  "complexity": "simple" | "medium" | "complex"
}

Parameter keys to use when present:
- recipient (email address), subject, url
- name (task or document name), project
- topic (what content should be about)
- schedule ("every 5 minutes", "daily", ...), at_time
- amount, customer, source

Set is_automation to false for greetings, questions, and small talk.
Do not include explanations or markdown."#;

// ---------------------------------------------------------------------------
// IntentClassifier
// ---------------------------------------------------------------------------

/// Classifies utterances with an optional model and a keyword fallback.
pub struct IntentClassifier {
    router: KeywordRouter,
    model: Option<Arc<dyn CompletionModel>>,
}

impl IntentClassifier {
    /// Build a classifier with the fallback tables and no model.
    pub fn new() -> Result<Self> {
        let mut router = KeywordRouter::new();
        for (category, phrases) in KEYWORDS {
            router.add_keywords(category.as_str(), phrases)?;
        }
        for (entity, pattern) in EXTRACTORS {
            router.add_extractor(entity, pattern)?;
        }
        Ok(Self {
            router,
            model: None,
        })
    }

    /// Attach a completion model for the primary path.
    pub fn with_model(mut self, model: Arc<dyn CompletionModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Classify `utterance` given the owning instance's recent history.
    pub async fn classify(&self, utterance: &str, history: &[Message]) -> Intent {
        let text = utterance.trim();
        if text.is_empty() {
            return Intent::conversational(text);
        }

        let Some(model) = &self.model else {
            return self.fallback(text, None);
        };

        let mut messages = history.to_vec();
        messages.push(Message::user(text));

        match model.complete(SYSTEM_PROMPT, &messages).await {
            Ok(raw) => match self.parse_model_answer(text, &raw) {
                Some(intent) => {
                    debug!(
                        model = model.model_name(),
                        category = %intent.category,
                        confidence = intent.confidence,
                        "classified by model"
                    );
                    intent
                }
                None => {
                    warn!(model = model.model_name(), "malformed classifier output, using fallback");
                    self.fallback(text, Some("malformed model output".to_string()))
                }
            },
            Err(e) => {
                warn!(model = model.model_name(), error = %e, "classifier model failed, using fallback");
                self.fallback(text, Some(e.to_string()))
            }
        }
    }

    /// Deterministic extraction on its own, used to enrich model answers and
    /// to parse follow-up replies.
    pub fn extract(&self, text: &str) -> BTreeMap<String, String> {
        let mut params = self.router.extract(text);

        let recipients = self.router.find_all(text, "recipient");
        if recipients.len() > 1 {
            params.insert("recipient".to_string(), recipients.join(", "));
        }

        if let Some(project) = params.get("project")
            && PROJECT_STOPWORDS.contains(&project.to_ascii_lowercase().as_str())
        {
            params.remove("project");
        }

        if let Some(schedule) = params.get("schedule").cloned()
            && let Some((every, unit)) = normalize_schedule(&schedule)
        {
            params.insert("schedule_interval".to_string(), every.to_string());
            params.insert("schedule_unit".to_string(), unit.to_string());
        }

        params
    }

    // -- Private helpers ----------------------------------------------------

    fn fallback(&self, text: &str, reason: Option<String>) -> Intent {
        let extracted = self.extract(text);
        let complexity = infer_complexity(text);
        let penalty = if reason.is_some() {
            MODEL_FAILURE_PENALTY
        } else {
            0.0
        };

        let (category, hits) = match self.router.route(text) {
            RouteResult::KeywordMatch { handler, hits, .. } => (Category::parse(&handler), hits),
            RouteResult::Unrouted { .. } => (Category::Other, 0),
        };

        let (is_automation, confidence) = if category == Category::Other {
            (false, FALLBACK_OTHER_CONFIDENCE)
        } else {
            let mut confidence = FALLBACK_BASE_CONFIDENCE;
            confidence += (0.05 * hits.saturating_sub(1) as f64).min(0.1);
            if key_entity(category).is_some_and(|k| extracted.contains_key(k)) {
                confidence += 0.15;
            }
            (true, confidence.min(FALLBACK_MAX_CONFIDENCE))
        };

        let missing = missing_for(category, &extracted, &[]);

        debug!(
            category = %category,
            hits,
            confidence,
            missing = ?missing,
            "classified by fallback"
        );

        Intent {
            is_automation,
            category,
            confidence: (confidence - penalty).clamp(0.0, 1.0),
            extracted_parameters: extracted,
            missing_parameters: missing,
            text: text.to_string(),
            complexity,
            source: IntentSource::Fallback,
            fallback_reason: reason,
        }
    }

    fn parse_model_answer(&self, text: &str, raw: &str) -> Option<Intent> {
        let answer: ModelAnswer = serde_json::from_str(strip_code_fences(raw)).ok()?;
        let is_automation = answer.is_automation?;
        let category = Category::parse(&answer.category?);

        let mut extracted: BTreeMap<String, String> = answer
            .extracted_parameters
            .into_iter()
            .filter_map(|(k, v)| value_to_param(v).map(|v| (k, v)))
            .collect();
        for (key, value) in self.extract(text) {
            extracted.entry(key).or_insert(value);
        }

        let complexity = answer
            .complexity
            .as_deref()
            .and_then(Complexity::parse)
            .unwrap_or_else(|| infer_complexity(text));

        let missing = if is_automation {
            missing_for(category, &extracted, &answer.missing_parameters)
        } else {
            Vec::new()
        };

        Some(Intent {
            is_automation,
            category,
            confidence: answer.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            extracted_parameters: extracted,
            missing_parameters: missing,
            text: text.to_string(),
            complexity,
            source: IntentSource::Llm,
            fallback_reason: None,
        })
    }
}

impl fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("model", &self.model.as_ref().map(|m| m.model_name().to_string()))
            .finish_non_exhaustive()
    }
}

/// Raw model answer; every field optional so that partial output can be
/// detected rather than rejected by serde.
#[derive(Debug, Deserialize)]
struct ModelAnswer {
    is_automation: Option<bool>,
    category: Option<String>,
    confidence: Option<f64>,
    #[serde(default)]
    extracted_parameters: BTreeMap<String, Value>,
    #[serde(default)]
    missing_parameters: Vec<String>,
    complexity: Option<String>,
}

fn value_to_param(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// Expected-but-absent parameters plus any the model listed, minus what was
/// extracted, without duplicates.
fn missing_for(
    category: Category,
    extracted: &BTreeMap<String, String>,
    reported: &[String],
) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    let expected = expected_parameters(category).iter().map(|s| s.to_string());
    for key in expected.chain(reported.iter().cloned()) {
        if !extracted.contains_key(&key) && !missing.contains(&key) {
            missing.push(key);
        }
    }
    missing
}

/// Complexity from the number of chaining connectors in the text.
pub fn infer_complexity(text: &str) -> Complexity {
    let lower = format!(" {} ", text.to_lowercase());
    let connectors = CONNECTORS
        .iter()
        .map(|c| lower.matches(c).count())
        .sum::<usize>();
    match connectors {
        0 => Complexity::Simple,
        1 => Complexity::Medium,
        _ => Complexity::Complex,
    }
}

/// Normalise a schedule phrase into `(every, unit)` with unit one of
/// `minutes`, `hours`, `days`.
pub fn normalize_schedule(phrase: &str) -> Option<(u64, &'static str)> {
    let lower = phrase.trim().to_ascii_lowercase();
    match lower.as_str() {
        "hourly" => return Some((1, "hours")),
        "daily" => return Some((1, "days")),
        "weekly" => return Some((7, "days")),
        _ => {}
    }

    let rest = lower.strip_prefix("every")?.trim();
    let (count, unit_word) = match rest.split_once(char::is_whitespace) {
        Some((n, unit)) if n.chars().all(|c| c.is_ascii_digit()) => {
            (n.parse::<u64>().ok()?, unit.trim())
        }
        _ => (1, rest),
    };
    if count == 0 {
        return None;
    }

    let unit_word = unit_word.trim_end_matches('s');
    match unit_word {
        "minute" => Some((count, "minutes")),
        "hour" => Some((count, "hours")),
        "day" | "morning" | "evening" => Some((count, "days")),
        "week" => Some((count.checked_mul(7)?, "days")),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Scripted(std::result::Result<String, String>);

    #[async_trait]
    impl CompletionModel for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _system: &str,
            _messages: &[Message],
        ) -> autoflow_agent::Result<String> {
            self.0
                .clone()
                .map_err(|reason| autoflow_agent::AgentError::LlmRequestFailed { reason })
        }
    }

    fn classifier() -> IntentClassifier {
        IntentClassifier::new().unwrap()
    }

    #[tokio::test]
    async fn fallback_detects_email_and_recipient() {
        let intent = classifier()
            .classify("Send a welcome email to ops@example.com", &[])
            .await;
        assert!(intent.is_automation);
        assert_eq!(intent.category, Category::Email);
        assert_eq!(intent.extracted_parameters["recipient"], "ops@example.com");
        assert!((intent.confidence - 0.85).abs() < 1e-9);
        assert!(intent.missing_parameters.is_empty());
        assert_eq!(intent.source, IntentSource::Fallback);
        assert!(intent.fallback_reason.is_none());
    }

    #[tokio::test]
    async fn fallback_reports_missing_task_fields() {
        let intent = classifier().classify("Create a task", &[]).await;
        assert_eq!(intent.category, Category::Tasks);
        assert!((intent.confidence - 0.7).abs() < 1e-9);
        assert_eq!(intent.missing_parameters, vec!["name", "project"]);
    }

    #[tokio::test]
    async fn small_talk_is_not_automation() {
        let intent = classifier().classify("hello there, how are you?", &[]).await;
        assert!(!intent.is_automation);
        assert_eq!(intent.category, Category::Other);

        let empty = classifier().classify("   ", &[]).await;
        assert!(!empty.is_automation);
        assert_eq!(empty.confidence, 0.0);
    }

    #[tokio::test]
    async fn model_answer_is_used_and_enriched() {
        let answer = r#"```json
{"is_automation": true, "category": "tasks", "confidence": 0.92,
 "extracted_parameters": {"name": "Ship v2", "priority": 1},
 "missing_parameters": ["project", "name"], "complexity": "simple"}
```"#;
        let c = classifier().with_model(Arc::new(Scripted(Ok(answer.to_string()))));
        let intent = c
            .classify("Create a task \"Ship v2\" in the Apollo project", &[])
            .await;

        assert_eq!(intent.source, IntentSource::Llm);
        assert_eq!(intent.category, Category::Tasks);
        assert_eq!(intent.confidence, 0.92);
        assert_eq!(intent.extracted_parameters["name"], "Ship v2");
        assert_eq!(intent.extracted_parameters["priority"], "1");
        assert_eq!(intent.extracted_parameters["project"], "Apollo");
        assert!(intent.missing_parameters.is_empty());
    }

    #[tokio::test]
    async fn malformed_model_output_degrades() {
        let c = classifier().with_model(Arc::new(Scripted(Ok("I think it's email".into()))));
        let intent = c
            .classify("Send a welcome email to ops@example.com", &[])
            .await;
        assert_eq!(intent.source, IntentSource::Fallback);
        assert_eq!(intent.category, Category::Email);
        assert!((intent.confidence - 0.75).abs() < 1e-9);
        assert!(intent.fallback_reason.is_some());
    }

    #[tokio::test]
    async fn model_error_degrades() {
        let c = classifier().with_model(Arc::new(Scripted(Err("timeout".into()))));
        let intent = c.classify("Export the sales report as csv", &[]).await;
        assert_eq!(intent.category, Category::Data);
        assert!(intent.fallback_reason.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn partial_model_json_degrades() {
        let c = classifier().with_model(Arc::new(Scripted(Ok(r#"{"confidence": 0.9}"#.into()))));
        let intent = c.classify("Create a task", &[]).await;
        assert_eq!(intent.source, IntentSource::Fallback);
    }

    #[test]
    fn extracts_names_projects_and_schedules() {
        let c = classifier();
        let params =
            c.extract("Create a task called Quarterly review in the Apollo project every 2 hours");
        assert_eq!(params["name"], "Quarterly review");
        assert_eq!(params["project"], "Apollo");
        assert_eq!(params["schedule_interval"], "2");
        assert_eq!(params["schedule_unit"], "hours");

        let params = c.extract("write a post about rust async every day");
        assert_eq!(params["topic"], "rust async");
        assert_eq!(params["schedule_unit"], "days");
    }

    #[test]
    fn multiple_recipients_are_joined() {
        let params = classifier().extract("email a@x.io and b@y.io the notes");
        assert_eq!(params["recipient"], "a@x.io, b@y.io");
    }

    #[test]
    fn schedule_normalisation() {
        assert_eq!(normalize_schedule("every 15 minutes"), Some((15, "minutes")));
        assert_eq!(normalize_schedule("weekly"), Some((7, "days")));
        assert_eq!(normalize_schedule("every 2 weeks"), Some((14, "days")));
        assert_eq!(normalize_schedule("every morning"), Some((1, "days")));
        assert_eq!(normalize_schedule("every 0 hours"), None);
    }

    #[test]
    fn oversized_schedule_is_dropped() {
        assert_eq!(normalize_schedule("every 3000000000000000000 weeks"), None);
        assert_eq!(normalize_schedule("every 99999999999999999999 days"), None);

        let classifier = IntentClassifier::new().unwrap();
        let params = classifier.extract("remind me every 3000000000000000000 weeks");
        assert!(!params.contains_key("schedule_interval"));
    }

    #[test]
    fn complexity_counts_connectors() {
        assert_eq!(infer_complexity("send a mail"), Complexity::Simple);
        assert_eq!(
            infer_complexity("export data then email it"),
            Complexity::Medium
        );
        assert_eq!(
            infer_complexity("export data, then summarize it and then email it"),
            Complexity::Complex
        );
    }

    #[test]
    fn category_parse_is_lenient() {
        assert_eq!(Category::parse(" Email "), Category::Email);
        assert_eq!(Category::parse("finance"), Category::Other);
    }
}
