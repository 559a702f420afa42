//! Event type selection and hint-based relevance ranking.

use glob::Pattern as GlobPattern;
use tracing::warn;

use super::types::{DiscoveryFilter, DiscoveryHints};
use crate::analysis::name_tokens;
use crate::schema::Schema;

/// Event types and name fragments typical of each known domain.
const DOMAINS: &[(&str, &[&str])] = &[
    (
        "apm",
        &["transaction", "span", "transactionerror", "error", "trace", "service", "apdex"],
    ),
    (
        "browser",
        &["pageview", "pageaction", "browserinteraction", "javascripterror", "ajaxrequest", "session"],
    ),
    (
        "infrastructure",
        &["systemsample", "processsample", "networksample", "storagesample", "host", "cpu", "memory", "disk"],
    ),
    ("logs", &["log", "logevent", "message", "level"]),
    ("mobile", &["mobile", "mobilesession", "mobilecrash", "mobilerequest", "device"]),
    ("synthetics", &["syntheticcheck", "syntheticrequest", "monitor", "synthetic"]),
    ("kubernetes", &["k8s", "pod", "container", "node", "cluster", "namespace"]),
    ("business", &["order", "payment", "checkout", "cart", "revenue", "customer", "purchase"]),
];

/// Words in a purpose statement that carry no signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "for", "from", "how", "i", "in", "is", "of", "on", "or", "the", "to",
    "want", "what", "which", "why", "with",
];

/// Glob-based event type selection.
#[derive(Debug, Clone)]
pub struct EventTypeMatcher {
    include: Vec<GlobPattern>,
    exclude: Vec<GlobPattern>,
}

impl EventTypeMatcher {
    /// Compiles the filter's patterns. Invalid patterns are logged and
    /// matched literally.
    pub fn new(filter: &DiscoveryFilter) -> Self {
        let compile = |raw: &String| match GlobPattern::new(raw) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(pattern = %raw, error = %e, "Invalid event type pattern, matching literally");
                GlobPattern::new(&GlobPattern::escape(raw)).unwrap_or_default()
            }
        };
        Self {
            include: filter.include.iter().map(compile).collect(),
            exclude: filter.exclude.iter().map(compile).collect(),
        }
    }

    pub fn matches(&self, event_type: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(event_type));
        included && !self.exclude.iter().any(|p| p.matches(event_type))
    }

    /// Matching names, sorted and deduplicated, capped at `max`.
    pub fn select(&self, event_types: Vec<String>, max: Option<usize>) -> Vec<String> {
        let mut selected: Vec<String> = event_types.into_iter().filter(|e| self.matches(e)).collect();
        selected.sort();
        selected.dedup();
        if let Some(max) = max {
            selected.truncate(max);
        }
        selected
    }
}

/// Lowercased search terms derived from hints.
#[derive(Debug, Clone, Default)]
pub struct RelevanceTerms {
    keywords: Vec<String>,
    domain: Vec<String>,
    purpose: Vec<String>,
}

impl RelevanceTerms {
    pub fn from_hints(hints: &DiscoveryHints) -> Self {
        let keywords = hints
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let domain = hints
            .domain
            .as_deref()
            .map(|d| d.trim().to_lowercase())
            .map(|d| {
                DOMAINS
                    .iter()
                    .find(|(name, _)| *name == d)
                    .map(|(_, terms)| terms.iter().map(|t| t.to_string()).collect())
                    .unwrap_or_else(|| vec![d])
            })
            .unwrap_or_default();
        let purpose = hints
            .purpose
            .as_deref()
            .map(|p| {
                p.split(|c: char| !c.is_alphanumeric())
                    .map(str::to_lowercase)
                    .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            keywords,
            domain,
            purpose,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.domain.is_empty() && self.purpose.is_empty()
    }

    /// Relevance of `schema` in [0, 1].
    ///
    /// A term hitting the event type name counts fully, a term hitting an
    /// attribute name counts half. Keywords weigh 0.5, domain terms 0.35 and
    /// purpose words 0.15.
    pub fn relevance(&self, schema: &Schema) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let name = schema.name.to_lowercase();
        let name_parts: Vec<String> = name_tokens(&schema.name);
        let attribute_parts: Vec<String> = schema
            .attributes
            .iter()
            .flat_map(|a| name_tokens(&a.name))
            .chain(schema.attributes.iter().map(|a| a.name.to_lowercase()))
            .collect();

        let score_terms = |terms: &[String]| -> f64 {
            if terms.is_empty() {
                return 0.0;
            }
            terms
                .iter()
                .map(|term| {
                    if name == *term || name.contains(term.as_str()) || name_parts.contains(term) {
                        1.0
                    } else if attribute_parts.iter().any(|a| a == term) {
                        0.5
                    } else {
                        0.0
                    }
                })
                .fold(0.0, f64::max)
        };

        let weights = [
            (0.5, score_terms(&self.keywords), !self.keywords.is_empty()),
            (0.35, score_terms(&self.domain), !self.domain.is_empty()),
            (0.15, score_terms(&self.purpose), !self.purpose.is_empty()),
        ];
        let total: f64 = weights.iter().filter(|w| w.2).map(|w| w.0).sum();
        let score: f64 = weights.iter().filter(|w| w.2).map(|w| w.0 * w.1).sum();
        if total > 0.0 {
            (score / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Ranking score combining relevance, log-scaled daily volume and quality.
pub fn rank_score(relevance: f64, schema: &Schema) -> f64 {
    // 10^9 events per day saturates the volume term.
    let volume = ((schema.data_volume.estimated_daily_volume as f64 + 1.0).log10() / 9.0).min(1.0);
    0.6 * relevance + 0.2 * volume + 0.2 * schema.quality.overall_score
}

/// Orders schemas by [`rank_score`], dropping irrelevant ones when terms are
/// given. Returns `(schema, relevance)` pairs, best first.
pub fn rank(schemas: Vec<Schema>, terms: &RelevanceTerms) -> Vec<(Schema, f64)> {
    let filtering = !terms.is_empty();
    let mut ranked: Vec<(Schema, f64, f64)> = schemas
        .into_iter()
        .map(|schema| {
            let relevance = terms.relevance(&schema);
            let score = rank_score(relevance, &schema);
            (schema, relevance, score)
        })
        .filter(|(_, relevance, _)| !filtering || *relevance > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.name.cmp(&b.0.name)));
    ranked.into_iter().map(|(s, r, _)| (s, r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        Attribute, AttributeQuality, CardinalityProfile, DataType, DataVolumeProfile, SemanticType,
        Statistics,
    };

    fn schema(name: &str, attributes: &[&str], daily: u64) -> Schema {
        let attributes = attributes
            .iter()
            .map(|a| Attribute {
                name: a.to_string(),
                data_type: DataType::String,
                semantic_type: SemanticType::Category,
                cardinality: CardinalityProfile::default(),
                statistics: Statistics::None,
                null_ratio: 0.0,
                patterns: Vec::new(),
                quality: AttributeQuality::default(),
                sample_values: Vec::new(),
            })
            .collect();
        let mut schema = Schema::new(name, attributes);
        schema.data_volume = DataVolumeProfile::new(daily, 24 * 60);
        schema
    }

    #[test]
    fn test_glob_filter() {
        let matcher = EventTypeMatcher::new(
            &DiscoveryFilter::new()
                .include("Transaction*")
                .include("*Sample")
                .exclude("ProcessSample"),
        );
        let selected = matcher.select(
            vec![
                "TransactionError".into(),
                "Transaction".into(),
                "SystemSample".into(),
                "ProcessSample".into(),
                "PageView".into(),
            ],
            None,
        );
        assert_eq!(selected, vec!["SystemSample", "Transaction", "TransactionError"]);
        assert_eq!(matcher.select(selected, Some(1)), vec!["SystemSample"]);
    }

    #[test]
    fn test_keyword_and_domain_relevance() {
        let terms = RelevanceTerms::from_hints(&DiscoveryHints::new().keyword("checkout").domain("browser"));
        let checkout = schema("CheckoutEvent", &["orderId"], 1000);
        let page_view = schema("PageView", &["pageUrl", "session"], 1000);
        let log = schema("Log", &["message"], 1000);

        assert!(terms.relevance(&checkout) > terms.relevance(&page_view));
        assert!(terms.relevance(&page_view) > 0.0);
        assert_eq!(terms.relevance(&log), 0.0);

        let ranked = rank(vec![log, page_view, checkout], &terms);
        let names: Vec<&str> = ranked.iter().map(|(s, _)| s.name.as_str()).collect();
        assert_eq!(names, vec!["CheckoutEvent", "PageView"]);
    }

    #[test]
    fn test_without_terms_volume_decides() {
        let ranked = rank(
            vec![schema("Small", &[], 10), schema("Large", &[], 10_000_000)],
            &RelevanceTerms::default(),
        );
        assert_eq!(ranked[0].0.name, "Large");
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_purpose_words_count() {
        let terms = RelevanceTerms::from_hints(
            &DiscoveryHints::new().purpose("Why is the payment latency high?"),
        );
        assert!(terms.relevance(&schema("PaymentEvent", &[], 1)) > 0.0);
        assert_eq!(terms.relevance(&schema("Log", &[], 1)), 0.0);
    }
}
