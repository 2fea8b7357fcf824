use serde::Serialize;

use super::SpeakerTurn;

/// One speaker turn of the final document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentTurn {
    /// Index of the source turn
    pub turn_index: usize,
    pub speaker: Option<String>,
    /// Literal marker from the transcript, re-emitted before the text
    pub marker: String,
    /// Rewritten text of the turn
    pub text: String,
    /// Some of this turn's text is unrewritten fallback
    pub degraded: bool,
}

/// Final ordered document assembled from chunk results
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub turns: Vec<DocumentTurn>,
    /// Chunks whose original text was substituted
    pub degraded_chunks: Vec<usize>,
    /// Chunks that exceeded the token budget
    pub over_budget_chunks: Vec<usize>,
}

impl Document {
    /// Whether any part of the document is unrewritten fallback
    pub fn is_degraded(&self) -> bool {
        !self.degraded_chunks.is_empty()
    }

    /// Distinct speakers in order of first appearance
    pub fn speakers(&self) -> Vec<&str> {
        let mut speakers: Vec<&str> = Vec::new();
        for speaker in self.turns.iter().filter_map(|t| t.speaker.as_deref()) {
            if !speakers.contains(&speaker) {
                speakers.push(speaker);
            }
        }
        speakers
    }

    /// Render as text, with each turn's marker on its own line
    pub fn render(&self) -> String {
        let pieces = self.rendered_pieces();
        let mut output: String = pieces.into_iter().map(|(_, _, text)| text).collect();
        let trimmed = output.trim_end().len();
        output.truncate(trimmed);
        if !output.is_empty() {
            output.push('\n');
        }
        output
    }

    /// The rendered document as speaker turns, for a second pass
    /// such as summarization
    pub fn to_turns(&self) -> Vec<SpeakerTurn> {
        let mut turns = Vec::new();
        let mut offset = 0;
        for (speaker, marker_len, text) in self.rendered_pieces() {
            let len = text.len();
            let turn = match speaker {
                Some(speaker) => SpeakerTurn::labeled(speaker, offset, marker_len, text),
                None => SpeakerTurn::unlabeled(offset, text),
            };
            turns.push(turn);
            offset += len;
        }
        turns
    }

    fn rendered_pieces(&self) -> Vec<(Option<String>, usize, String)> {
        self.turns
            .iter()
            .filter(|t| !t.marker.trim().is_empty() || !t.text.trim().is_empty())
            .map(|t| {
                let marker = t.marker.trim();
                let body = t.text.trim();
                let header = if marker.is_empty() {
                    String::new()
                } else {
                    format!("{}\n", marker)
                };
                let marker_len = header.len();
                (t.speaker.clone(), marker_len, format!("{}{}\n\n", header, body))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(turn_index: usize, speaker: Option<&str>, marker: &str, text: &str) -> DocumentTurn {
        DocumentTurn {
            turn_index,
            speaker: speaker.map(String::from),
            marker: marker.to_string(),
            text: text.to_string(),
            degraded: false,
        }
    }

    #[test]
    fn test_render_keeps_markers() {
        let document = Document {
            turns: vec![
                turn(0, None, "", "Opening remarks."),
                turn(1, Some("Host"), "【Host】", "Welcome, everyone."),
                turn(2, Some("Alice"), "Alice: ", "Thank you."),
            ],
            degraded_chunks: vec![],
            over_budget_chunks: vec![],
        };

        assert_eq!(
            document.render(),
            "Opening remarks.\n\n【Host】\nWelcome, everyone.\n\nAlice:\nThank you.\n"
        );
        assert_eq!(document.speakers(), vec!["Host", "Alice"]);
        assert!(!document.is_degraded());
    }

    #[test]
    fn test_to_turns_covers_rendered_text() {
        let document = Document {
            turns: vec![
                turn(0, Some("Host"), "【Host】", "Welcome."),
                turn(1, None, "", "   "),
                turn(2, Some("Bob"), "Bob:", "Hi."),
            ],
            degraded_chunks: vec![1],
            over_budget_chunks: vec![],
        };

        let turns = document.to_turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].marker(), "【Host】\n");
        assert_eq!(turns[1].start_offset, turns[0].end_offset);
        let joined: String = turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(joined.trim_end(), document.render().trim_end());
        assert!(document.is_degraded());
    }
}
