use crate::models::Chunk;

/// System prompt for chunk rewriting (non-negotiable constraints)
pub const REWRITE_SYSTEM_PROMPT: &str = r#"You are turning a speech-recognition transcript into a polished written document. You MUST follow these rules:

1. Correct misrecognized words, typos and grammar errors.
2. Complete fragmentary sentences so each one reads as a whole.
3. Fix technical terms, names of people, places and organizations.
4. Convert spoken filler and hesitation into formal written language.
5. Keep every speaker's meaning and positions unchanged. Do not add facts.
6. Never omit, merge or truncate content. Every segment must be output in full.
7. Text marked READ-ONLY is context only. NEVER rewrite, repeat or output it.

OUTPUT FORMAT:
- Output every editable segment, in the given order, as its marker line
  (for example `<<<SEG 0>>>`) followed by the rewritten text.
- Do not output speaker names; they are re-inserted automatically.
- Output nothing before the first marker and no commentary after the last segment."#;

/// System prompt for summaries
pub const SUMMARY_SYSTEM_PROMPT: &str = r#"You are an expert minute-taker. You extract the key points, decisions and action items from meeting transcripts and write clear, accurate, formal minutes.

RULES:
1. Keep only what the source says. Never invent decisions, owners or dates.
2. Attribute positions to speakers when the source makes them clear.
3. Be concise: drop repetition and small talk.
4. Output the result directly, without preamble or closing remarks."#;

/// Marker line introducing editable segment `id`
pub fn segment_marker(id: usize) -> String {
    format!("<<<SEG {}>>>", id)
}

/// Build the user prompt for one chunk.
///
/// The overlap and the tail of the previous chunk's output are context
/// only; the backend must answer with exactly the editable segments.
pub fn build_rewrite_prompt(chunk: &Chunk, previous_tail: Option<&str>) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# Part {} of {}\n",
        chunk.index + 1,
        chunk.total_chunks
    ));
    let speakers = chunk.speakers();
    if !speakers.is_empty() {
        prompt.push_str(&format!("Speakers: {}\n", speakers.join(", ")));
    }
    prompt.push('\n');

    if chunk.has_overlap() {
        prompt.push_str("## Preceding Transcript (READ-ONLY)\n");
        for span in &chunk.overlap {
            let text = chunk.overlap_body(span).trim();
            if text.is_empty() {
                continue;
            }
            match &span.speaker {
                Some(speaker) => prompt.push_str(&format!("[{}] {}\n", speaker, text)),
                None => prompt.push_str(&format!("{}\n", text)),
            }
        }
        prompt.push('\n');
    }

    if let Some(tail) = previous_tail.map(str::trim).filter(|t| !t.is_empty()) {
        prompt.push_str("## Previous Rewritten Output (READ-ONLY)\n");
        prompt.push_str(tail);
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Segments (EDITABLE)\n");
    for id in chunk.editable_ids() {
        let fragment = &chunk.fragments[id];
        let speaker = fragment.speaker.as_deref().unwrap_or("unlabeled");
        let continued = if fragment.is_continuation() {
            " (continued)"
        } else {
            ""
        };
        prompt.push_str(&format!(
            "{} speaker: {}{}\n",
            segment_marker(id),
            speaker,
            continued
        ));
        prompt.push_str(chunk.fragment_body(fragment).trim());
        prompt.push('\n');
    }

    prompt.push_str("\n## Instructions\n");
    prompt.push_str("Rewrite every editable segment following the rules.\n");
    prompt.push_str("Start each segment with its marker line exactly as given, then the rewritten text.\n");
    if chunk.total_chunks > 1 {
        prompt.push_str("This is one part of a longer transcript; keep wording consistent with the preceding context.\n");
    }

    prompt
}

/// Prompt for summarizing one part of a long input
pub fn build_map_prompt(part: usize, total: usize, content: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("# Part {} of {}\n\n", part + 1, total));
    prompt.push_str("## Content\n");
    prompt.push_str(content.trim());
    prompt.push_str("\n\n## Instructions\n");
    prompt.push_str("Summarize this part of the meeting. Keep every key point, decision, action item and open question with the speaker who raised it.\n");
    prompt.push_str("Other parts are summarized separately; do not speculate about them.\n");
    prompt
}

/// Prompt for merging several partial summaries into one
pub fn build_reduce_prompt(partials: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str("## Content\n");
    for (i, partial) in partials.iter().enumerate() {
        prompt.push_str(&format!("### Partial summary {}\n{}\n\n", i + 1, partial.trim()));
    }
    prompt.push_str("## Instructions\n");
    prompt.push_str("Merge these partial summaries of consecutive parts into one summary.\n");
    prompt.push_str("Remove duplicates, keep chronological order, and keep every decision and action item.\n");
    prompt
}

/// Prompt for the final fixed-structure summary
pub fn build_final_prompt(content: &str, structure: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str("## Content\n");
    prompt.push_str(content.trim());
    prompt.push_str("\n\n## Instructions\n");
    prompt.push_str("Write structured meeting minutes from the content above.\n");
    if !structure.is_empty() {
        prompt.push_str("Use exactly these sections, in this order, each as a heading:\n");
        for (i, section) in structure.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, section));
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlanConfig, SpeakerTurn};
    use crate::stages::plan_chunks;

    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    #[test]
    fn test_rewrite_prompt_sections() {
        let first = SpeakerTurn::labeled("Host", 0, 6, "Host: welcome to the show everyone.\n");
        let second = SpeakerTurn::labeled(
            "Alice",
            first.end_offset,
            7,
            "Alice: thanks for having me here today.\n",
        );
        let chunks = plan_chunks(
            &[first, second],
            &PlanConfig {
                max_tokens: 8,
                overlap_tokens: 6,
            },
            &words,
        )
        .unwrap();
        assert_eq!(chunks.len(), 2);

        let prompt = build_rewrite_prompt(&chunks[1], Some("Welcome to the show, everyone."));
        assert!(prompt.starts_with("# Part 2 of 2\nSpeakers: Alice\n"));
        assert!(prompt.contains("## Preceding Transcript (READ-ONLY)\n[Host] welcome to the show everyone.\n"));
        assert!(prompt.contains("## Previous Rewritten Output (READ-ONLY)\nWelcome to the show, everyone.\n"));
        assert!(prompt.contains("<<<SEG 0>>> speaker: Alice\nthanks for having me here today.\n"));
        assert!(!prompt.contains("Alice: thanks"));
    }

    #[test]
    fn test_final_prompt_lists_structure() {
        let structure = vec!["Overview".to_string(), "Decisions".to_string()];
        let prompt = build_final_prompt("notes", &structure);
        assert!(prompt.contains("1. Overview\n2. Decisions\n"));
    }
}
