use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// File extensions picked up when an input is a directory
const TRANSCRIPT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Read a UTF-8 transcript file
pub fn read_transcript(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("Transcript is not valid UTF-8: {:?}", path))?;
    Ok(text)
}

/// Expand inputs into transcript files, sorted within each directory
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to list directory: {:?}", input))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && has_transcript_extension(path))
                .collect();
            found.sort();
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            bail!("Input not found: {:?}", input);
        }
    }

    if files.is_empty() {
        bail!("No transcript files found");
    }
    Ok(files)
}

fn has_transcript_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TRANSCRIPT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting.txt");
        std::fs::write(&path, "Host: hello\n").unwrap();
        assert_eq!(read_transcript(&path).unwrap(), "Host: hello\n");

        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(read_transcript(&path).is_err());
        assert!(read_transcript(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_collect_inputs_expands_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.MD"), "a").unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let files = collect_inputs(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.MD", "b.txt"]);

        assert!(collect_inputs(&[dir.path().join("nope.txt")]).is_err());
        let empty = tempfile::tempdir().unwrap();
        assert!(collect_inputs(&[empty.path().to_path_buf()]).is_err());
    }
}
