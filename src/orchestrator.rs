use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::digest::ArticleDigest;
use crate::error::{NliError, Result};
use crate::models::{FilterField, FilterSet};
use crate::render::MarkdownRenderer;
use crate::service::NliService;

/// Phrases that mean the user wants a narrative answer on top of the raw
/// result list.
const SUMMARY_INTENTS: &[&str] = &["summarize", "summary", "overview", "explain", "tell me about"];

pub fn wants_summary(query: &str) -> bool {
    let lower = query.to_lowercase();
    SUMMARY_INTENTS.iter().any(|k| lower.contains(k))
}

/// Outcome of one search execution, reported by the collaborator when the
/// search has actually finished.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub count: usize,
    pub articles: Vec<ArticleDigest>,
}

/// The pre-existing search engine the NLI drives. `apply_filter` returns
/// false when the engine has no matching option for the value, and `execute`
/// resolves only once results are ready.
#[async_trait]
pub trait SearchBackend: Send {
    fn clear_filters(&mut self);
    fn apply_filter(&mut self, field: FilterField, value: &str) -> bool;
    async fn execute(&mut self) -> Result<SearchResults>;
}

/// Everything one query produced, in the order it happened. `messages` is
/// what the user sees in the status area; errors land there too, so a failed
/// step ends the run cleanly instead of wedging it mid-flight.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    pub filters: FilterSet,
    pub applied: Vec<(FilterField, String)>,
    pub skipped: Vec<(FilterField, String)>,
    pub result_count: Option<usize>,
    pub summary_html: Option<String>,
    pub messages: Vec<String>,
}

impl QueryOutcome {
    fn say(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

/// Drives the full pipeline for one natural-language question: extraction,
/// filter application, search execution, and the optional summary. Every run
/// terminates with a populated `QueryOutcome`; failures are reported inside
/// it rather than bubbling out.
pub struct QueryOrchestrator {
    service: Arc<NliService>,
    renderer: MarkdownRenderer,
}

impl QueryOrchestrator {
    pub fn new(service: Arc<NliService>) -> Self {
        Self {
            service,
            renderer: MarkdownRenderer::new(),
        }
    }

    fn failure_message(&self, context: &str, err: &NliError) -> String {
        let mut message = format!("{context}: {err}");
        if err.is_transport() && !self.service.session().proxy_enabled() {
            message.push_str(" Try enabling the proxy option and asking again.");
        }
        message
    }

    pub async fn run_query(&self, backend: &mut dyn SearchBackend, query: &str) -> QueryOutcome {
        let mut outcome = QueryOutcome::default();
        let query = query.trim();
        if query.is_empty() {
            outcome.say("Please enter a question.");
            return outcome;
        }

        tracing::info!(provider = self.service.current_provider().as_str(), "Running query");
        outcome.say(format!(
            "Interpreting your question with {}...",
            self.service.current_provider().display_name()
        ));

        let filters = match self.service.extract_filters(query).await {
            Ok(filters) => filters,
            Err(err) => {
                outcome.say(self.failure_message("Could not interpret the question", &err));
                return outcome;
            }
        };

        if filters.is_empty() {
            outcome.say(
                "No search filters could be derived from that question. \
                 Try naming an acupoint, meridian, condition, or region.",
            );
            return outcome;
        }
        outcome.filters = filters.clone();

        backend.clear_filters();
        for (field, value) in filters.iter() {
            if backend.apply_filter(field, value) {
                outcome.applied.push((field, value.to_string()));
            } else {
                tracing::debug!(field = field.key(), value, "Search engine has no option for value");
                outcome.skipped.push((field, value.to_string()));
            }
        }

        if outcome.applied.is_empty() {
            outcome.say(
                "The extracted filters did not match any search options. \
                 Try different wording.",
            );
            return outcome;
        }

        let summary = outcome
            .applied
            .iter()
            .map(|(f, v)| format!("{}={}", f.key(), v))
            .collect::<Vec<_>>()
            .join(", ");
        outcome.say(format!("Searching with {summary}"));

        let results = match backend.execute().await {
            Ok(results) => results,
            Err(err) => {
                outcome.say(self.failure_message("Search failed", &err));
                return outcome;
            }
        };
        outcome.result_count = Some(results.count);

        if results.count == 0 {
            // Diagnostic only: an empty result set is a legitimate answer.
            tracing::warn!(filters = %summary, "Query produced zero results");
            outcome.say("No matching studies were found for those filters.");
            return outcome;
        }
        outcome.say(format!("Found {} matching studies.", results.count));

        if !wants_summary(query) {
            return outcome;
        }

        outcome.say("Generating a summary of the results...");
        let data = json!(results.articles);
        match self.service.summarize(query, &data).await {
            Ok(summary) => {
                let provider = self.service.current_provider();
                let mut html = self.renderer.render(provider, &summary.markdown);
                if let Some(note) = summary.fallback_note {
                    html.push_str(&format!("\n<p><em>{note}</em></p>"));
                }
                outcome.summary_html = Some(html);
            }
            Err(err) => {
                outcome.say(self.failure_message("Could not generate a summary", &err));
            }
        }
        outcome
    }
}
