use regex::{Captures, Regex};

use crate::error::{RefineError, Result};

/// Compiled filler-word rules
#[derive(Debug, Clone)]
pub struct FillerRules {
    leading: Vec<Regex>,
    inline: Vec<Regex>,
}

impl FillerRules {
    /// Compile rules for the given filler words.
    ///
    /// ASCII words only match on word boundaries; CJK fillers match anywhere
    /// a line starts or punctuation surrounds them.
    pub fn new(words: &[String]) -> Result<Self> {
        let mut leading = Vec::with_capacity(words.len());
        let mut inline = Vec::with_capacity(words.len());

        for word in words.iter().map(|w| w.trim()).filter(|w| !w.is_empty()) {
            let escaped = regex::escape(word);
            let boundary = if word.is_ascii() { r"\b" } else { "" };
            let leading_pattern = format!(r"(?mi)^([ \t]*){}{}[,，、。. \t]*", escaped, boundary);
            let inline_pattern = format!(r"(?i)([,，、])[ \t]*{}{}[ \t]*[,，、]([ \t]*)", escaped, boundary);
            leading.push(compile(&leading_pattern)?);
            inline.push(compile(&inline_pattern)?);
        }

        Ok(Self { leading, inline })
    }

    /// Remove fillers at line starts and between commas.
    ///
    /// A line-start filler followed by a colon is a speaker label
    /// (`Er: ...`) and stays.
    pub fn apply(&self, text: &str) -> FillerResult {
        let mut text = text.to_string();
        let mut removed = 0;

        for re in &self.leading {
            let replaced = re
                .replace_all(&text, |caps: &Captures| {
                    let (Some(whole), Some(indent)) = (caps.get(0), caps.get(1)) else {
                        return String::new();
                    };
                    if text[whole.end()..].starts_with(&[':', '：'][..]) {
                        return whole.as_str().to_string();
                    }
                    removed += 1;
                    indent.as_str().to_string()
                })
                .into_owned();
            text = replaced;
        }

        for re in &self.inline {
            removed += re.find_iter(&text).count();
            text = re.replace_all(&text, "$1$2").into_owned();
        }

        FillerResult {
            text,
            fillers_removed: removed,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| RefineError::Config(format!("invalid filler pattern: {}", e)))
}

/// Result of filler-word removal
#[derive(Debug, Clone)]
pub struct FillerResult {
    pub text: String,
    pub fillers_removed: usize,
}

/// Default fillers for English and Mandarin transcripts
pub fn default_filler_words() -> Vec<String> {
    ["um", "uh", "erm", "er", "hmm", "mm", "嗯", "呃", "那个那个"]
        .iter()
        .map(|w| w.to_string())
        .collect()
}
