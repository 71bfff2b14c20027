//! Unit enumeration: a sorted walk of a directory tree, or a single-level
//! fan-out from a documentation site's seed page.

use std::collections::HashSet;
use std::path::Path;

use colored::*;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;
use walkdir::WalkDir;

use crate::error::ConsolidationError;
use crate::unit::{slash_path, Unit};

/// A page as the browser left it once scripts settled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSnapshot {
    pub title: String,
    pub html: String,
}

/// Navigates to a URL and reports the final DOM.
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    async fn fetch(&mut self, url: &Url) -> anyhow::Result<PageSnapshot>;
}

/// Collects every file under `root` whose extension is `extension`, sorted by
/// its slash-joined relative path so the order never depends on the
/// filesystem. Dot-files and dot-directories below the root are skipped.
pub fn enumerate_files(root: &Path, extension: &str) -> Result<Vec<Unit>, ConsolidationError> {
    if !root.exists() {
        return Err(ConsolidationError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ConsolidationError::NotADirectory(root.to_path_buf()));
    }

    info!("Scanning directory: {}", root.display().to_string().green());

    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        found.push((slash_path(relative), relative.to_path_buf()));
    }

    if found.is_empty() {
        return Err(ConsolidationError::NoContentFound(format!(
            "{} (no .{} files)",
            root.display(),
            extension
        )));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));

    let units: Vec<Unit> = found
        .into_iter()
        .enumerate()
        .map(|(ordinal, (key, relative))| {
            let label = strip_extension(&key, extension).to_string();
            Unit::file(ordinal, &relative, label)
        })
        .collect();

    info!("Found {} .{} files", units.len(), extension);
    Ok(units)
}

/// Fetches the seed page and enumerates it plus every in-scope page it links
/// to. Links on the linked pages are not followed.
pub async fn enumerate_site<F: PageFetcher>(
    seed: &Url,
    fetcher: &mut F,
) -> Result<(Vec<Unit>, PageSnapshot), ConsolidationError> {
    info!("Visiting \"{}\"", seed.as_str().green());

    let snapshot = fetcher
        .fetch(seed)
        .await
        .map_err(|e| ConsolidationError::Browser(format!("failed to load {}: {}", seed, e)))?;

    let hrefs = extract_links(&snapshot.html);
    debug!("Links collected on seed page: {:?}", hrefs);

    let mut seed_url = seed.clone();
    seed_url.set_fragment(None);

    let mut units = vec![Unit::page(0, seed_url.clone(), label_for_url(&seed_url))];
    for url in select_site_links(seed, hrefs.iter().map(String::as_str)) {
        let label = label_for_url(&url);
        units.push(Unit::page(units.len(), url, label));
    }

    info!("Found {} documentation pages", units.len());
    Ok((units, snapshot))
}

/// Keeps links that share the seed's origin and sit under its path, in
/// first-seen order. Fragments are dropped before deduplication and the seed
/// itself is never repeated.
pub fn select_site_links<'a>(seed: &Url, hrefs: impl IntoIterator<Item = &'a str>) -> Vec<Url> {
    let prefix = seed.path();
    let origin = seed.origin();

    let mut seed_key = seed.clone();
    seed_key.set_fragment(None);

    let mut seen = HashSet::new();
    seen.insert(seed_key.to_string());

    let mut selected = Vec::new();
    for href in hrefs {
        let Ok(mut url) = seed.join(href.trim()) else {
            debug!("Ignoring unparseable link \"{}\"", href);
            continue;
        };

        if url.origin() != origin || !url.path().starts_with(prefix) {
            continue;
        }

        url.set_fragment(None);
        if seen.insert(url.to_string()) {
            selected.push(url);
        }
    }

    selected
}

/// Every `href` on anchor elements, in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}

fn label_for_url(url: &Url) -> String {
    let cleaned = url
        .path()
        .trim_start_matches('/')
        .trim_end_matches('/')
        .trim_end_matches(".html")
        .trim_end_matches(".htm");

    if cleaned.is_empty() {
        "index".to_string()
    } else {
        cleaned.to_string()
    }
}

fn strip_extension<'a>(path: &'a str, extension: &str) -> &'a str {
    path.strip_suffix(extension)
        .and_then(|p| p.strip_suffix('.'))
        .unwrap_or(path)
}
