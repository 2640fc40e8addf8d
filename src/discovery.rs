//! Discovery Module
//!
//! Recursively scans a directory for `<name>.component.html` templates and
//! parses them in parallel. `home.component.html` becomes `quake-home`.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::node::Template;
use crate::parse::ParseOptions;

const TEMPLATE_SUFFIX: &str = ".component.html";
const TAG_PREFIX: &str = "quake-";

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredTemplate {
    pub tag: String,
    pub path: PathBuf,
    pub template: Template,
}

/// Component tag for a template file name, if it is one.
pub fn template_tag(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let name = file_name.strip_suffix(TEMPLATE_SUFFIX)?;
    if name.is_empty() {
        return None;
    }
    Some(format!("{}{}", TAG_PREFIX, name.to_lowercase()))
}

pub fn discover_templates(dir: &Path) -> Vec<DiscoveredTemplate> {
    discover_templates_with(dir, &ParseOptions::default())
}

/// Finds and parses every template below `dir`, sorted by tag. Files that
/// cannot be read or parsed are logged and skipped. When two files map to the
/// same tag, the one with the smaller path wins.
pub fn discover_templates_with(dir: &Path, options: &ParseOptions) -> Vec<DiscoveredTemplate> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "template directory does not exist");
        return Vec::new();
    }

    let files = find_template_files(dir);

    let mut discovered: Vec<DiscoveredTemplate> = files
        .par_iter()
        .filter_map(|(tag, path)| match load_template(path, options) {
            Ok(template) => Some(DiscoveredTemplate {
                tag: tag.clone(),
                path: path.clone(),
                template,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping component template");
                None
            }
        })
        .collect();

    discovered.sort_by(|a, b| a.tag.cmp(&b.tag).then_with(|| a.path.cmp(&b.path)));
    discovered.dedup_by(|later, earlier| {
        let duplicate = later.tag == earlier.tag;
        if duplicate {
            warn!(
                tag = %later.tag,
                kept = %earlier.path.display(),
                ignored = %later.path.display(),
                "duplicate component template"
            );
        }
        duplicate
    });

    debug!(dir = %dir.display(), count = discovered.len(), "discovered templates");
    discovered
}

fn find_template_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(tag) = template_tag(path) {
            files.push((tag, path.to_path_buf()));
        }
    }

    files
}

fn load_template(path: &Path, options: &ParseOptions) -> Result<Template> {
    let source = fs::read_to_string(path)?;
    Template::parse_with(&source, options)
}
