//! Context management for the shared prompt file
//!
//! Tracks a character-count token estimate against the context window,
//! carries small rings of recent output and errors back into the prompt,
//! and produces summarization prompts when the file outgrows the window.

use crate::errors::{LoopError, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// Rough estimate: 1 token per 4 characters
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

const DYNAMIC_CONTEXT_KEEP: usize = 5;
const ERROR_HISTORY_KEEP: usize = 5;
const SUCCESS_PATTERNS_KEEP: usize = 3;

/// Manages the prompt file and its derived context
pub struct ContextManager {
    prompt_file: PathBuf,
    window_size: usize,
    threshold: f64,
    cache_dir: PathBuf,
    summary_dir: PathBuf,

    stable_prefix: Option<String>,
    dynamic_context: Vec<String>,
    error_history: Vec<String>,
    success_patterns: Vec<String>,
}

impl ContextManager {
    pub fn new(
        prompt_file: PathBuf,
        window_size: usize,
        threshold: f64,
        cache_dir: PathBuf,
        summary_dir: PathBuf,
    ) -> Result<Self> {
        fs::create_dir_all(&cache_dir)?;
        fs::create_dir_all(&summary_dir)?;

        let mut manager = Self {
            prompt_file,
            window_size,
            threshold,
            cache_dir,
            summary_dir,
            stable_prefix: None,
            dynamic_context: Vec::new(),
            error_history: Vec::new(),
            success_patterns: Vec::new(),
        };
        manager.load_stable_prefix();
        Ok(manager)
    }

    /// Token budget above which summarization kicks in
    fn threshold_tokens(&self) -> usize {
        (self.window_size as f64 * self.threshold) as usize
    }

    /// Character budget equivalent of the token threshold
    fn threshold_chars(&self) -> usize {
        self.threshold_tokens() * 4
    }

    pub fn needs_summarization(&self, content: &str) -> bool {
        estimate_tokens(content) > self.threshold_tokens()
    }

    /// Extract the leading header block that does not change between
    /// iterations. Used as a cache key so the prefix is not re-shipped.
    fn load_stable_prefix(&mut self) {
        let content = match fs::read_to_string(&self.prompt_file) {
            Ok(c) => c,
            Err(_) => return,
        };

        let mut stable_lines: Vec<&str> = Vec::new();
        for line in content.lines() {
            if line.starts_with('#') {
                stable_lines.push(line);
            } else if line.contains("TASK_COMPLETE") {
                break;
            } else if !stable_lines.is_empty() && line.trim().is_empty() {
                stable_lines.push(line);
            } else if !stable_lines.is_empty() {
                break;
            }
        }

        if !stable_lines.is_empty() {
            self.stable_prefix = Some(stable_lines.join("\n"));
        }
    }

    /// Read the raw prompt file, enforcing the size cap
    pub fn read_prompt(&self, max_size: u64) -> Result<String> {
        let meta = fs::metadata(&self.prompt_file)
            .map_err(|_| LoopError::PromptMissing(self.prompt_file.display().to_string()))?;

        if meta.len() > max_size {
            return Err(LoopError::PromptTooLarge {
                size: meta.len(),
                limit: max_size,
            });
        }

        Ok(fs::read_to_string(&self.prompt_file)?)
    }

    /// Current prompt with dynamic context and recent errors appended when
    /// they fit; falls back to optimization when the file is over budget.
    pub fn get_prompt(&self, max_size: u64) -> Result<String> {
        let mut content = self.read_prompt(max_size)?;

        if self.needs_summarization(&content) {
            return Ok(self.optimize_prompt(&content));
        }

        if !self.dynamic_context.is_empty() {
            let tail_start = self.dynamic_context.len().saturating_sub(3);
            let addition = format!(
                "\n\n## Previous Context\n{}",
                self.dynamic_context[tail_start..].join("\n")
            );
            if content.len() + addition.len() < self.threshold_chars() {
                content.push_str(&addition);
            }
        }

        if !self.error_history.is_empty() {
            let tail_start = self.error_history.len().saturating_sub(2);
            let addition = format!(
                "\n\n## Recent Errors to Avoid\n{}",
                self.error_history[tail_start..].join("\n")
            );
            if content.len() + addition.len() < self.threshold_chars() {
                content.push_str(&addition);
            }
        }

        Ok(content)
    }

    /// Shrink an over-budget prompt: reference the cached stable prefix and
    /// summarize the dynamic remainder if needed.
    fn optimize_prompt(&self, content: &str) -> String {
        if let Some(prefix) = &self.stable_prefix {
            if content.starts_with(prefix.as_str()) {
                let hash = blake3::hash(prefix.as_bytes()).to_hex();
                let short = &hash.as_str()[..8];
                let cache_file = self.cache_dir.join(format!("prefix_{}.txt", short));

                if !cache_file.exists() {
                    // Failure to cache only costs the optimization
                    let _ = fs::write(&cache_file, prefix);
                }

                let mut optimized = format!("<!-- Using cached prefix {} -->\n", short);
                let mut dynamic_part = content[prefix.len()..].to_string();

                if dynamic_part.len() > self.threshold_chars().saturating_sub(100) {
                    dynamic_part = self.summarize_content(&dynamic_part);
                }

                optimized.push_str(&dynamic_part);
                return optimized;
            }
        }

        self.summarize_content(content)
    }

    /// Keep headers, sentinel lines, open checkboxes, and flagged lines
    fn summarize_content(&self, content: &str) -> String {
        let important: Vec<&str> = content
            .lines()
            .filter(|line| {
                line.starts_with('#')
                    || line.contains("TASK_COMPLETE")
                    || line.contains("TODO")
                    || line.contains("IMPORTANT")
                    || line.contains("ERROR")
                    || line.trim_start().starts_with("- [ ]")
            })
            .collect();

        let mut summary = important.join("\n");

        let cap = self.threshold_chars();
        if summary.len() > cap {
            let cut = summary
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|i| *i <= cap.saturating_sub(100))
                .last()
                .unwrap_or(0);
            summary.truncate(cut);
            summary.push_str("\n<!-- Content truncated -->");
        }

        summary
    }

    /// When the prompt file is over the window budget, write a summarization
    /// prompt next to the archives and return its path for this iteration.
    pub fn maybe_summarize(&self, max_size: u64) -> Result<Option<PathBuf>> {
        let content = self.read_prompt(max_size)?;

        if !self.needs_summarization(&content) {
            return Ok(None);
        }

        let summary_prompt = format!(
            "CONTEXT OVERFLOW DETECTED\n\n\
             The following prompt has grown too large. Please create a concise summary that preserves:\n\
             1. The original task/goal\n\
             2. Key completed steps\n\
             3. Current state and next actions\n\
             4. Critical context and constraints\n\n\
             ORIGINAL PROMPT:\n{}\n\n\
             Please write a new, shorter prompt that continues the task.\n\
             Mark the end with: TASK_COMPLETE if done, or continue normally.\n",
            content
        );

        let path = self
            .summary_dir
            .join(format!("summary_{}.md", Utc::now().format("%Y%m%d_%H%M%S")));
        fs::write(&path, summary_prompt)?;

        Ok(Some(path))
    }

    /// Fold agent output back into the dynamic context rings
    pub fn update_context(&mut self, output: &str) {
        let lower = output.to_lowercase();

        if lower.contains("error") {
            let error_lines: Vec<String> = output
                .lines()
                .filter(|l| l.to_lowercase().contains("error"))
                .take(2)
                .map(String::from)
                .collect();
            self.error_history.extend(error_lines);
            trim_front(&mut self.error_history, ERROR_HISTORY_KEEP);
        }

        if lower.contains("success") || lower.contains("complete") {
            if let Some(line) = output.lines().find(|l| {
                let ll = l.to_lowercase();
                ll.contains("success") || ll.contains("complete") || ll.contains("done")
            }) {
                self.success_patterns.push(line.to_string());
                trim_front(&mut self.success_patterns, SUCCESS_PATTERNS_KEEP);
            }
        }

        // Long outputs are elided to head and tail
        let entry = if output.len() > 500 {
            let head: String = output.chars().take(200).collect();
            let tail: String = {
                let chars: Vec<char> = output.chars().collect();
                chars[chars.len().saturating_sub(200)..].iter().collect()
            };
            format!("{}...{}", head, tail)
        } else {
            output.to_string()
        };
        self.dynamic_context.push(entry);
        trim_front(&mut self.dynamic_context, DYNAMIC_CONTEXT_KEEP);
    }

    pub fn add_error_feedback(&mut self, error: &str) {
        self.error_history.push(format!("Error: {}", error));
        trim_front(&mut self.error_history, ERROR_HISTORY_KEEP);
    }

    /// Drop volatile context, keeping the stable prefix
    pub fn reset(&mut self) {
        self.dynamic_context.clear();
        self.error_history.clear();
        self.success_patterns.clear();
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            stable_prefix_size: self.stable_prefix.as_ref().map_or(0, String::len),
            dynamic_context_items: self.dynamic_context.len(),
            error_history_items: self.error_history.len(),
            success_patterns: self.success_patterns.len(),
        }
    }
}

/// Snapshot of context ring sizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStats {
    pub stable_prefix_size: usize,
    pub dynamic_context_items: usize,
    pub error_history_items: usize,
    pub success_patterns: usize,
}

fn trim_front(items: &mut Vec<String>, keep: usize) {
    if items.len() > keep {
        let drop = items.len() - keep;
        items.drain(..drop);
    }
}
