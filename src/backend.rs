use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use scraper::{ElementRef, Html, Selector};
use tokio::fs;
use tracing::debug;

use crate::assembler::escape_html;
use crate::consolidation::UnitBackend;
use crate::enumerate::{PageFetcher, PageSnapshot};
use crate::markup::{MarkupParser, MdxParser};
use crate::unit::{Unit, UnitSource};

/// Reads units from disk and renders them through a markup parser.
pub struct FileBackend<P = MdxParser> {
    root: PathBuf,
    parser: P,
}

impl FileBackend<MdxParser> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_parser(root, MdxParser)
    }
}

impl<P: MarkupParser> FileBackend<P> {
    pub fn with_parser(root: impl Into<PathBuf>, parser: P) -> Self {
        Self {
            root: root.into(),
            parser,
        }
    }
}

impl<P: MarkupParser> UnitBackend for FileBackend<P> {
    async fn load(&mut self, unit: &Unit) -> Result<String> {
        let UnitSource::File(relative) = &unit.source else {
            return Err(anyhow!("{} is not a file unit", unit.identity));
        };
        let path = self.root.join(relative);
        fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn render(&mut self, unit: &Unit, resolved: &str) -> Result<String> {
        self.parser
            .parse(resolved)
            .await
            .with_context(|| format!("Failed to parse {}", unit.identity))
    }
}

/// Navigates to each crawled page with one shared fetcher. The seed page
/// snapshot taken during enumeration is reused instead of fetched again.
pub struct SiteBackend<'a, F> {
    fetcher: &'a mut F,
    seed: Option<PageSnapshot>,
}

impl<'a, F: PageFetcher> SiteBackend<'a, F> {
    pub fn new(fetcher: &'a mut F, seed: Option<PageSnapshot>) -> Self {
        Self { fetcher, seed }
    }
}

impl<F: PageFetcher> UnitBackend for SiteBackend<'_, F> {
    async fn load(&mut self, unit: &Unit) -> Result<String> {
        let UnitSource::Page(url) = &unit.source else {
            return Err(anyhow!("{} is not a page unit", unit.identity));
        };

        if unit.ordinal == 0 {
            if let Some(seed) = self.seed.take() {
                debug!("Reusing seed snapshot for {}", url);
                return Ok(seed.html);
            }
        }

        Ok(self.fetcher.fetch(url).await?.html)
    }

    async fn render(&mut self, _unit: &Unit, resolved: &str) -> Result<String> {
        extract_body(resolved)
    }
}

const DROPPED_ELEMENTS: [&str; 3] = ["script", "noscript", "template"];

/// The `<body>` children of a page snapshot, minus scripts.
pub fn extract_body(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("body").map_err(|e| anyhow!("invalid selector: {:?}", e))?;
    let body = document
        .select(&selector)
        .next()
        .ok_or_else(|| anyhow!("page snapshot has no <body>"))?;

    let mut out = String::new();
    for child in body.children() {
        if let Some(element) = ElementRef::wrap(child) {
            if DROPPED_ELEMENTS.contains(&element.value().name()) {
                continue;
            }
            out.push_str(&element.html());
        } else if let Some(text) = child.value().as_text() {
            out.push_str(&escape_html(text));
        }
    }

    Ok(out)
}
