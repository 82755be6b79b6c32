//! Trace path expansion
//!
//! Directories given on the command line are expanded to the trace files they
//! contain (sorted); plain paths are kept as given, missing ones included, so
//! that the trace source reports them.

use dltlyse_engine::formats::jsonl::TRACE_FILE_EXTENSION;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Expand trace arguments to trace files, in argument order
pub fn expand_traces(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut traces = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut dir_traces = traces_in_dir(path, recursive);
            dir_traces.sort();
            log::debug!("Found {} trace(s) in {:?}", dir_traces.len(), path);
            traces.extend(dir_traces);
        } else {
            traces.push(path.clone());
        }
    }
    traces
}

fn is_trace_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(TRACE_FILE_EXTENSION)
}

fn traces_in_dir(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_trace_file(e.path()))
        .map(|e| e.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_directory_expansion() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.jsonl"));
        touch(&dir.path().join("a.jsonl"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("nested/c.jsonl"));

        let flat = expand_traces(&[dir.path().to_path_buf()], false);
        assert_eq!(flat, vec![dir.path().join("a.jsonl"), dir.path().join("b.jsonl")]);

        let deep = expand_traces(&[dir.path().to_path_buf()], true);
        assert_eq!(
            deep,
            vec![
                dir.path().join("a.jsonl"),
                dir.path().join("b.jsonl"),
                dir.path().join("nested/c.jsonl"),
            ]
        );
    }

    #[test]
    fn test_files_keep_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let second = dir.path().join("z.jsonl");
        touch(&second);
        let missing = PathBuf::from("missing.jsonl");

        let traces = expand_traces(&[second.clone(), missing.clone()], false);
        assert_eq!(traces, vec![second, missing]);
    }
}
