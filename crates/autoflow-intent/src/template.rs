//! Template catalog and matcher.
//!
//! The [`TemplateCatalog`] is loaded once from TOML (the built-in catalog is
//! embedded in the binary, a user catalog may be merged on top) and is never
//! mutated afterwards.  The [`TemplateMatcher`] ranks catalog entries
//! against an [`Intent`].
//!
//! # Scoring
//!
//! | Component | Weight |
//! |-----------|--------|
//! | Category equals the intent's category | 0.4 |
//! | Each template keyword present in the utterance | 0.1, capped at 0.3 |
//! | Complexity equal / one step away | 0.2 / 0.1 |
//!
//! The sum is multiplied by the intent's confidence.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use autoflow_kernel::ParamMap;

use crate::classifier::{Category, Complexity, Intent};
use crate::config::MatchingConfig;
use crate::error::{IntentError, Result};

const BUILTIN_CATALOG: &str = include_str!("../templates/builtin.toml");

const CATEGORY_WEIGHT: f64 = 0.4;
const KEYWORD_WEIGHT: f64 = 0.1;
const KEYWORD_CAP: f64 = 0.3;
const COMPLEXITY_EXACT: f64 = 0.2;
const COMPLEXITY_ADJACENT: f64 = 0.1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A step skeleton whose parameters may hold `{{placeholders}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(alias = "id")]
    pub step_id: String,
    pub driver: String,
    pub operation: String,
    #[serde(default)]
    pub parameters: ParamMap,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A reusable, parameterized workflow skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_complexity")]
    pub complexity: Complexity,
    /// Whether the template usually needs details the user must type in.
    #[serde(default)]
    pub required_user_input: bool,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub success_rate: f64,
}

fn default_complexity() -> Complexity {
    Complexity::Simple
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    templates: Vec<Template>,
}

// ---------------------------------------------------------------------------
// TemplateCatalog
// ---------------------------------------------------------------------------

/// Ordered, read-only set of templates.  Insertion order breaks score ties.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<Arc<Template>>,
}

impl TemplateCatalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Parse a catalog from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(text).map_err(|e| IntentError::CatalogLoad {
            reason: e.to_string(),
        })?;

        let mut catalog = Self::default();
        for mut template in file.templates {
            template.keywords = normalize_keywords(template.keywords);
            if catalog.get(&template.id).is_some() {
                return Err(IntentError::CatalogLoad {
                    reason: format!("duplicate template id `{}`", template.id),
                });
            }
            if template.steps.is_empty() {
                return Err(IntentError::CatalogLoad {
                    reason: format!("template `{}` has no steps", template.id),
                });
            }
            catalog.templates.push(Arc::new(template));
        }
        Ok(catalog)
    }

    /// Load a catalog file from disk.
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| IntentError::CatalogLoad {
            reason: format!("{}: {e}", path.display()),
        })?;
        let catalog = Self::from_toml_str(&text)?;
        info!(path = %path.display(), count = catalog.len(), "template catalog loaded");
        Ok(catalog)
    }

    /// Add `other`'s templates; an id already present is replaced in place.
    pub fn merge(mut self, other: TemplateCatalog) -> Self {
        for template in other.templates {
            match self.templates.iter().position(|t| t.id == template.id) {
                Some(idx) => self.templates[idx] = template,
                None => self.templates.push(template),
            }
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<Template>> {
        self.templates.iter().find(|t| t.id == id).cloned()
    }

    /// Look up by id or, case-insensitively, by display name.
    pub fn find(&self, id_or_name: &str) -> Option<Arc<Template>> {
        let needle = id_or_name.trim();
        self.get(needle).or_else(|| {
            self.templates
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(needle))
                .cloned()
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Template>> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Lowercase and trim keywords, dropping blanks and repeats.
fn normalize_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !seen.contains(&keyword) {
            seen.push(keyword);
        }
    }
    seen
}

// ---------------------------------------------------------------------------
// TemplateMatcher
// ---------------------------------------------------------------------------

/// A scored candidate.
#[derive(Debug, Clone)]
pub struct TemplateMatch {
    pub template: Arc<Template>,
    pub score: f64,
}

/// Ranks catalog templates against intents.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    catalog: Arc<TemplateCatalog>,
    config: MatchingConfig,
}

impl TemplateMatcher {
    pub fn new(catalog: Arc<TemplateCatalog>, config: MatchingConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Up to the configured number of candidates.
    pub fn candidates(&self, intent: &Intent) -> Vec<TemplateMatch> {
        self.match_intent(intent, self.config.candidate_limit)
    }

    /// Up to `limit` candidates above the minimum score, best first.
    ///
    /// Ties fall back to usage count, then success rate, then catalog order.
    pub fn match_intent(&self, intent: &Intent, limit: usize) -> Vec<TemplateMatch> {
        if !intent.is_automation {
            return Vec::new();
        }

        let text = intent.text.to_lowercase();
        let tokens: Vec<&str> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '-'))
            .filter(|t| !t.is_empty())
            .collect();

        let mut scored: Vec<TemplateMatch> = self
            .catalog
            .iter()
            .map(|template| TemplateMatch {
                score: score(template, intent, &text, &tokens),
                template: Arc::clone(template),
            })
            .filter(|m| m.score >= self.config.min_candidate_score)
            .collect();

        // Stable sort keeps catalog order for full ties.
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.template.usage_count.cmp(&a.template.usage_count))
                .then(b.template.success_rate.total_cmp(&a.template.success_rate))
        });
        scored.truncate(limit);

        debug!(
            category = %intent.category,
            candidates = scored.len(),
            top = scored.first().map(|m| m.template.id.as_str()).unwrap_or("-"),
            "templates matched"
        );
        scored
    }

    /// Whether the top candidate may be compiled without asking the user.
    pub fn should_auto_select(&self, intent: &Intent, matches: &[TemplateMatch]) -> bool {
        matches.first().is_some_and(|top| {
            top.score > self.config.auto_select_score
                && intent.confidence > self.config.auto_select_confidence
                && intent.missing_parameters.is_empty()
        })
    }
}

/// Raw score of one template before thresholding.
pub fn score(template: &Template, intent: &Intent, text: &str, tokens: &[&str]) -> f64 {
    let mut total = 0.0;

    if template.category == intent.category {
        total += CATEGORY_WEIGHT;
    }

    let hits = template
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| {
            if k.contains(' ') {
                text.contains(k.as_str())
            } else {
                tokens.contains(&k.as_str())
            }
        })
        .count();
    total += (KEYWORD_WEIGHT * hits as f64).min(KEYWORD_CAP);

    total += match template.complexity.rank().abs_diff(intent.complexity.rank()) {
        0 => COMPLEXITY_EXACT,
        1 => COMPLEXITY_ADJACENT,
        _ => 0.0,
    };

    total * intent.confidence
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentSource;
    use std::collections::BTreeMap;

    fn intent(category: Category, confidence: f64, text: &str) -> Intent {
        Intent {
            is_automation: true,
            category,
            confidence,
            extracted_parameters: BTreeMap::new(),
            missing_parameters: Vec::new(),
            text: text.to_string(),
            complexity: Complexity::Simple,
            source: IntentSource::Fallback,
            fallback_reason: None,
        }
    }

    fn matcher() -> TemplateMatcher {
        TemplateMatcher::new(
            Arc::new(TemplateCatalog::builtin().unwrap()),
            MatchingConfig::default(),
        )
    }

    #[test]
    fn builtin_catalog_loads() {
        let catalog = TemplateCatalog::builtin().unwrap();
        assert!(catalog.len() >= 8);
        assert!(catalog.get("welcome-email").is_some());
        assert_eq!(catalog.find("Create Task").unwrap().id, "create-task");
    }

    #[test]
    fn repeated_keywords_count_once() {
        let catalog = TemplateCatalog::from_toml_str(
            r#"
            [[templates]]
            id = "chore"
            name = "Chore"
            category = "tasks"
            keywords = ["chore", "Chore", " chore ", "", "errand"]

            [[templates.steps]]
            step_id = "create"
            driver = "tasks"
            operation = "create_task"
            "#,
        )
        .unwrap();
        let tpl = catalog.get("chore").unwrap();
        assert_eq!(tpl.keywords, vec!["chore", "errand"]);

        let i = intent(Category::Other, 1.0, "do the chore");
        let once = score(&tpl, &i, "do the chore", &["do", "the", "chore"]);
        let both = score(&tpl, &i, "do the chore errand", &["do", "the", "chore", "errand"]);
        assert!((both - once - KEYWORD_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn welcome_email_is_auto_selected() {
        let m = matcher();
        let i = intent(Category::Email, 0.85, "Send a welcome email to ops@example.com");
        let matches = m.candidates(&i);
        assert_eq!(matches[0].template.id, "welcome-email");
        assert!((matches[0].score - 0.765).abs() < 1e-9);
        assert!(m.should_auto_select(&i, &matches));
    }

    #[test]
    fn low_confidence_is_not_auto_selected() {
        let m = matcher();
        let i = intent(Category::Tasks, 0.7, "Create a task");
        let matches = m.candidates(&i);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].template.id, "create-task");
        assert!(!m.should_auto_select(&i, &matches));
    }

    #[test]
    fn score_grows_with_keywords() {
        let catalog = TemplateCatalog::builtin().unwrap();
        let tpl = catalog.get("blog-post").unwrap();
        let texts = [
            "hello",
            "write something",
            "write a blog",
            "write a blog post",
            "write a blog post article draft",
        ];
        let mut last = -1.0;
        for text in texts {
            let i = intent(Category::Content, 0.9, text);
            let lower = text.to_lowercase();
            let tokens: Vec<&str> = lower.split(' ').collect();
            let s = score(&tpl, &i, &lower, &tokens);
            assert!(s >= last, "{text}: {s} < {last}");
            last = s;
        }
    }

    #[test]
    fn non_automation_has_no_candidates() {
        let mut i = intent(Category::Email, 0.9, "email");
        i.is_automation = false;
        assert!(matcher().candidates(&i).is_empty());
    }

    #[test]
    fn ties_use_usage_then_catalog_order() {
        let toml = r#"
[[templates]]
id = "a"
name = "A"
category = "data"
usage_count = 1
[[templates.steps]]
step_id = "s"
driver = "data"
operation = "query"

[[templates]]
id = "b"
name = "B"
category = "data"
usage_count = 5
[[templates.steps]]
step_id = "s"
driver = "data"
operation = "query"

[[templates]]
id = "c"
name = "C"
category = "data"
usage_count = 5
[[templates.steps]]
step_id = "s"
driver = "data"
operation = "query"
"#;
        let m = TemplateMatcher::new(
            Arc::new(TemplateCatalog::from_toml_str(toml).unwrap()),
            MatchingConfig::default(),
        );
        let ids: Vec<String> = m
            .match_intent(&intent(Category::Data, 1.0, "x"), 10)
            .into_iter()
            .map(|m| m.template.id.clone())
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn merge_replaces_by_id() {
        let extra = r#"
[[templates]]
id = "create-task"
name = "Create ticket"
category = "tasks"
[[templates.steps]]
step_id = "t"
driver = "tasks"
operation = "create_task"
"#;
        let base = TemplateCatalog::builtin().unwrap();
        let len = base.len();
        let merged = base.merge(TemplateCatalog::from_toml_str(extra).unwrap());
        assert_eq!(merged.len(), len);
        assert_eq!(merged.get("create-task").unwrap().name, "Create ticket");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let toml = r#"
[[templates]]
id = "x"
name = "X"
category = "data"
[[templates.steps]]
step_id = "s"
driver = "data"
operation = "query"
[[templates]]
id = "x"
name = "X2"
category = "data"
[[templates.steps]]
step_id = "s"
driver = "data"
operation = "query"
"#;
        assert!(matches!(
            TemplateCatalog::from_toml_str(toml),
            Err(IntentError::CatalogLoad { .. })
        ));
    }
}
