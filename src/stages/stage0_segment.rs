use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RefineError, Result};
use crate::models::SpeakerTurn;

/// Configuration for speaker segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Marker patterns tried in order against the start of each line; the
    /// first match wins. Each must capture the label as `name`.
    pub patterns: Vec<String>,
    /// Labels longer than this (in characters) are treated as prose
    pub max_label_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            patterns: default_speaker_patterns(),
            max_label_chars: 50,
        }
    }
}

/// Bracketed labels, capitalized names with an ASCII colon, and CJK names
/// with a full-width colon
pub fn default_speaker_patterns() -> Vec<String> {
    vec![
        r"^【(?P<name>[^】\n]+)】".to_string(),
        r"^(?P<name>\p{Lu}[\w.'-]*(?:[ \t]+(?:\p{Lu}[\w.'-]*|\d+)){0,3})[ \t]*(?:：|:(?:[ \t]|\s*$))"
            .to_string(),
        r"^(?P<name>\p{Han}[\p{Han}\d]{0,9})[ \t]*[：:]".to_string(),
    ]
}

/// Splits a transcript into speaker turns
#[derive(Debug, Clone)]
pub struct SpeakerSegmenter {
    patterns: Vec<Regex>,
    max_label_chars: usize,
}

impl SpeakerSegmenter {
    pub fn new(config: &SegmenterConfig) -> Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                let re = Regex::new(p).map_err(|e| {
                    RefineError::Config(format!("invalid speaker pattern {:?}: {}", p, e))
                })?;
                if !re.capture_names().any(|n| n == Some("name")) {
                    return Err(RefineError::Config(format!(
                        "speaker pattern {:?} has no `name` group",
                        p
                    )));
                }
                Ok(re)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            max_label_chars: config.max_label_chars,
        })
    }

    /// Segment text into ordered, contiguous turns.
    ///
    /// Text before the first marker becomes an unlabeled turn. Text with no
    /// markers at all is one unlabeled turn; empty text yields no turns.
    pub fn segment(&self, text: &str) -> Result<Vec<SpeakerTurn>> {
        let mut turns = Vec::new();
        let mut start = 0;
        let mut speaker: Option<String> = None;
        let mut marker_len = 0;
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            if let Some((label, len)) = self.detect_marker(line) {
                if offset > start {
                    turns.push(make_turn(speaker.take(), start, marker_len, &text[start..offset]));
                }
                start = offset;
                speaker = Some(label);
                marker_len = len;
            }
            offset += line.len();
        }

        if text.len() > start {
            turns.push(make_turn(speaker, start, marker_len, &text[start..]));
        }

        verify_coverage(text, &turns)?;

        let labeled = turns.iter().filter(|t| t.is_labeled()).count();
        info!(
            "Segmented {} bytes into {} turns ({} labeled)",
            text.len(),
            turns.len(),
            labeled
        );

        Ok(turns)
    }

    /// Find a speaker marker at the start of a line.
    ///
    /// Returns the cleaned label and the marker length in bytes, measured
    /// from the line start and including indentation and trailing blanks.
    fn detect_marker(&self, line: &str) -> Option<(String, usize)> {
        let content = line.trim_start_matches([' ', '\t', '\u{3000}']);
        let indent = line.len() - content.len();

        for re in &self.patterns {
            let Some(caps) = re.captures(content) else {
                continue;
            };
            let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) else {
                continue;
            };
            if whole.start() != 0 {
                continue;
            }

            let label = clean_label(name.as_str());
            if label.is_empty() || label.chars().count() > self.max_label_chars {
                debug!("Ignoring marker candidate {:?}", name.as_str());
                continue;
            }

            let rest = &content[whole.end()..];
            let blanks = rest.len() - rest.trim_start_matches([' ', '\t']).len();
            return Some((label, indent + whole.end() + blanks));
        }

        None
    }
}

fn make_turn(speaker: Option<String>, start: usize, marker_len: usize, text: &str) -> SpeakerTurn {
    match speaker {
        Some(speaker) => SpeakerTurn::labeled(speaker, start, marker_len, text),
        None => SpeakerTurn::unlabeled(start, text),
    }
}

fn clean_label(raw: &str) -> String {
    raw.trim()
        .trim_matches(['【', '】', ':', '：'])
        .trim()
        .to_string()
}

/// Concatenated turns must reproduce the transcript byte for byte
pub fn verify_coverage(text: &str, turns: &[SpeakerTurn]) -> Result<()> {
    let mut expected_start = 0;
    for turn in turns {
        if turn.start_offset != expected_start || turn.end_offset != turn.start_offset + turn.text.len()
        {
            return Err(RefineError::SegmentationInvariant {
                expected: text.len(),
                actual: expected_start,
            });
        }
        expected_start = turn.end_offset;
    }

    let covered: String = turns.iter().map(|t| t.text.as_str()).collect();
    if covered != text {
        return Err(RefineError::SegmentationInvariant {
            expected: text.len(),
            actual: covered.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> SpeakerSegmenter {
        SpeakerSegmenter::new(&SegmenterConfig::default()).unwrap()
    }

    fn concat(turns: &[SpeakerTurn]) -> String {
        turns.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_segment_mixed_markers() {
        let text = "Recording starts.\nHost: Welcome to the show.\nIt is a long one.\n【Alice】Thanks for having me.\n主持人：我们开始吧。\n";
        let turns = segmenter().segment(text).unwrap();

        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].speaker, None);
        assert_eq!(turns[0].text, "Recording starts.\n");
        assert_eq!(turns[1].speaker.as_deref(), Some("Host"));
        assert_eq!(turns[1].marker(), "Host: ");
        assert_eq!(turns[1].body(), "Welcome to the show.\nIt is a long one.\n");
        assert_eq!(turns[2].speaker.as_deref(), Some("Alice"));
        assert_eq!(turns[2].marker(), "【Alice】");
        assert_eq!(turns[3].speaker.as_deref(), Some("主持人"));
        assert_eq!(concat(&turns), text);
    }

    #[test]
    fn test_no_markers_is_one_unlabeled_turn() {
        let text = "just some words\nwith no speakers at all";
        let turns = segmenter().segment(text).unwrap();
        assert_eq!(turns.len(), 1);
        assert!(!turns[0].is_labeled());
        assert_eq!(turns[0].text, text);
    }

    #[test]
    fn test_empty_text_has_no_turns() {
        assert!(segmenter().segment("").unwrap().is_empty());
    }

    #[test]
    fn test_multi_word_and_numbered_labels() {
        let text = "Speaker 1: hi\nDr. Smith: hello\n  Bob Jones:\nindented marker\n";
        let turns = segmenter().segment(text).unwrap();
        let speakers: Vec<_> = turns.iter().map(|t| t.speaker.as_deref()).collect();
        assert_eq!(speakers, vec![Some("Speaker 1"), Some("Dr. Smith"), Some("Bob Jones")]);
        assert_eq!(turns[2].marker(), "  Bob Jones:\n");
        assert_eq!(concat(&turns), text);
    }

    #[test]
    fn test_prose_colons_are_not_markers() {
        let text = "Alice: the ratio was 3:1 and\nsee http://example.com for details\n";
        let turns = segmenter().segment(text).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_overlong_label_ignored() {
        let config = SegmenterConfig {
            max_label_chars: 5,
            ..Default::default()
        };
        let segmenter = SpeakerSegmenter::new(&config).unwrap();
        let turns = segmenter.segment("Bartholomew: hi\nBob: yo\n").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, None);
        assert_eq!(turns[1].speaker.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let bad = SegmenterConfig {
            patterns: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(matches!(SpeakerSegmenter::new(&bad), Err(RefineError::Config(_))));

        let unnamed = SegmenterConfig {
            patterns: vec!["^[A-Z]+:".to_string()],
            ..Default::default()
        };
        assert!(matches!(SpeakerSegmenter::new(&unnamed), Err(RefineError::Config(_))));
    }

    #[test]
    fn test_coverage_violation_detected() {
        let turns = vec![SpeakerTurn::unlabeled(0, "abc")];
        let err = verify_coverage("abcd", &turns).unwrap_err();
        assert!(matches!(err, RefineError::SegmentationInvariant { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_coverage_property_on_varied_inputs() {
        let inputs = [
            "\n\nHost: a\n\n\nGuest: b",
            "  \n【A】\n【B】x",
            "no newline Host: inline marker",
            "Alice:\r\nbody\r\nBob: end",
        ];
        for text in inputs {
            let turns = segmenter().segment(text).unwrap();
            assert_eq!(concat(&turns), text);
        }
    }
}
