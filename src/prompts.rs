use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{NliError, Result};
use crate::models::ProviderId;

/// Prompt pair for a summarization call.
#[derive(Debug, Clone)]
pub struct SummaryPrompts {
    pub system: String,
    pub user: String,
}

/// Loads prompt text resources from the prompts directory and assembles the
/// per-provider prompts. Resources are immutable for the life of a session,
/// so each file is read once and cached.
///
/// Layout convention:
///   shared/extraction-system-prompt.txt
///   shared/summarization-user-prompt.txt      ({query} and {data} tokens)
///   <provider>/extraction-modifications.txt   (optional overlay)
///   <provider>/summarization-system-instruction.txt
pub struct PromptLoader {
    dir: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

const SHARED_EXTRACTION: &str = "shared/extraction-system-prompt.txt";
const SHARED_SUMMARY_USER: &str = "shared/summarization-user-prompt.txt";

impl PromptLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Read one prompt resource. A missing file is a hard failure: a wrong
    /// or absent prompt silently degrades extraction quality downstream, so
    /// there is no fallback text.
    fn load(&self, rel: &str) -> Result<String> {
        if let Some(cached) = self.cache.read().expect("prompt cache poisoned").get(rel) {
            return Ok(cached.clone());
        }
        let path = self.dir.join(rel);
        let text = std::fs::read_to_string(&path).map_err(|e| NliError::Prompt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.cache
            .write()
            .expect("prompt cache poisoned")
            .insert(rel.to_string(), text.clone());
        Ok(text)
    }

    fn load_optional(&self, rel: &str) -> Option<String> {
        self.load(rel).ok()
    }

    /// Extraction system prompt: the shared base plus an optional
    /// provider-specific overlay appended after a blank line.
    pub fn extraction_prompt(&self, provider: ProviderId) -> Result<String> {
        let shared = self.load(SHARED_EXTRACTION)?;
        let overlay = format!("{}/extraction-modifications.txt", provider.as_str());
        match self.load_optional(&overlay) {
            Some(specific) => Ok(format!("{shared}\n\n{specific}")),
            None => Ok(shared),
        }
    }

    /// Summarization prompts: the shared user template with `{query}` and
    /// `{data}` substituted, and the provider's own system instruction.
    pub fn summarization_prompts(
        &self,
        provider: ProviderId,
        query: &str,
        data: &Value,
    ) -> Result<SummaryPrompts> {
        let template = self.load(SHARED_SUMMARY_USER)?;
        let serialized = serde_json::to_string_pretty(data)
            .map_err(|e| NliError::Internal(format!("Failed to serialize summary data: {e}")))?;
        let user = template
            .replacen("{query}", query, 1)
            .replacen("{data}", &serialized, 1);

        let system_path = format!(
            "{}/summarization-system-instruction.txt",
            provider.as_str()
        );
        let system = self.load(&system_path)?;

        Ok(SummaryPrompts { system, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write_prompt(dir: &std::path::Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn temp_prompt_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tara-nli-prompts-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn extraction_prompt_concatenates_overlay_when_present() {
        let dir = temp_prompt_dir("overlay");
        write_prompt(&dir, SHARED_EXTRACTION, "SHARED BASE");
        write_prompt(&dir, "gemini/extraction-modifications.txt", "GEMINI EXTRA");

        let loader = PromptLoader::new(&dir);
        let gemini = loader.extraction_prompt(ProviderId::Gemini).unwrap();
        assert_eq!(gemini, "SHARED BASE\n\nGEMINI EXTRA");

        // Claude has no overlay in this layout; shared prompt alone.
        let claude = loader.extraction_prompt(ProviderId::Claude).unwrap();
        assert_eq!(claude, "SHARED BASE");
    }

    #[test]
    fn missing_shared_prompt_is_a_hard_failure() {
        let dir = temp_prompt_dir("missing");
        let loader = PromptLoader::new(&dir);
        let err = loader.extraction_prompt(ProviderId::Claude).unwrap_err();
        assert!(matches!(err, NliError::Prompt { .. }));
    }

    #[test]
    fn summarization_substitutes_query_and_data() {
        let dir = temp_prompt_dir("summary");
        write_prompt(
            &dir,
            SHARED_SUMMARY_USER,
            "User query: \"{query}\"\n\nResults:\n{data}\n",
        );
        write_prompt(
            &dir,
            "claude/summarization-system-instruction.txt",
            "You are a research summarizer.",
        );

        let loader = PromptLoader::new(&dir);
        let prompts = loader
            .summarization_prompts(
                ProviderId::Claude,
                "summarize LI4 research",
                &json!([{"title": "Study A"}]),
            )
            .unwrap();

        assert!(prompts.user.contains("summarize LI4 research"));
        assert!(prompts.user.contains("\"title\": \"Study A\""));
        assert_eq!(prompts.system, "You are a research summarizer.");
    }

    #[test]
    fn prompts_are_cached_after_first_read() {
        let dir = temp_prompt_dir("cache");
        write_prompt(&dir, SHARED_EXTRACTION, "v1");

        let loader = PromptLoader::new(&dir);
        assert_eq!(loader.extraction_prompt(ProviderId::Claude).unwrap(), "v1");

        // Mutating the file after first load must not change what callers see.
        write_prompt(&dir, SHARED_EXTRACTION, "v2");
        assert_eq!(loader.extraction_prompt(ProviderId::Claude).unwrap(), "v1");
    }
}
