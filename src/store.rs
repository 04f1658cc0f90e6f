use ignore::WalkBuilder;
use serde_yaml::Value as YamlValue;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::LoadError;

const DOCUMENT_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

pub fn collect_document_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .add_custom_ignore_filename(".svqignore")
        .build();

    for entry in walker.flatten() {
        let path = entry.path();
        if path.is_file() && is_document_file(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    debug!(dir = %dir.display(), count = files.len(), "collected document files");
    files
}

fn is_document_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| DOCUMENT_EXTENSIONS.contains(&ext))
}

pub fn read_paths_from_stdin() -> Vec<PathBuf> {
    let stdin = io::stdin();
    stdin
        .lock()
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .map(|line| PathBuf::from(line.trim()))
        .collect()
}

/// A document file holds either one document or a list of them.
pub fn parse_documents(content: &str) -> Result<Vec<Document>, serde_yaml::Error> {
    let value: YamlValue = serde_yaml::from_str(content)?;
    match value {
        YamlValue::Null => Ok(Vec::new()),
        YamlValue::Sequence(_) => serde_yaml::from_value(value),
        _ => Ok(vec![serde_yaml::from_value(value)?]),
    }
}

pub fn load_file(path: &Path) -> Result<Vec<Document>, LoadError> {
    let content = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    let docs = parse_documents(&content).map_err(|e| LoadError::parse(path, e))?;
    debug!(path = %path.display(), count = docs.len(), "loaded documents");
    Ok(docs)
}

/// Loads every file, skipping the ones that cannot be read or parsed.
pub fn load_files(paths: &[PathBuf]) -> Vec<Document> {
    paths
        .iter()
        .filter_map(|path| match load_file(path) {
            Ok(docs) => Some(docs),
            Err(e) => {
                warn!("skipping {}", e);
                None
            }
        })
        .flatten()
        .collect()
}

/// A single file must load cleanly; a directory loads whatever it can.
pub fn load_documents(path: &Path) -> Result<Vec<Document>, LoadError> {
    if path.is_dir() {
        return Ok(load_files(&collect_document_files(path)));
    }
    load_file(path)
}
