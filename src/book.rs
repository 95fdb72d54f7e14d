use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

const PAGE_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// One documentation page: a title plus its raw text lines.
#[derive(Debug, Clone)]
pub struct Page {
    pub title: String,
    pub lines: Vec<String>,
}

/// The pages loaded from a docs directory, ordered by file name.
pub struct Book {
    pages: Vec<Page>,
}

impl Book {
    pub fn load(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("could not read docs directory {}", dir.display()))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| {
                            PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                        })
            })
            .collect();
        paths.sort();

        let mut pages = Vec::new();
        for path in paths {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("could not read page {}", path.display()))?;
            pages.push(Page {
                title: page_title(&path, &content),
                lines: content.lines().map(str::to_string).collect(),
            });
        }

        tracing::info!(pages = pages.len(), "loaded docs directory");
        Ok(Self { pages })
    }

    #[cfg(test)]
    pub(crate) fn from_pages(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, idx: usize) -> Option<&Page> {
        self.pages.get(idx)
    }
}

/// First `#` heading if the page has one, otherwise the file stem.
fn page_title(path: &Path, content: &str) -> String {
    let heading = content.lines().find_map(|line| {
        let line = line.trim();
        line.strip_prefix('#')
            .map(|rest| rest.trim_start_matches('#').trim())
            .filter(|title| !title.is_empty())
    });
    match heading {
        Some(title) => title.to_string(),
        None => path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("untitled")
            .to_string(),
    }
}
