//! Rewrites references inside one unit so they stay valid once every unit is
//! merged into a single document.
//!
//! Links to other units become `#<section anchor>[-<fragment>]`, local images
//! are inlined as `data:` URIs, and everything else is left alone. Nothing in
//! here is fatal: a reference that cannot be resolved is reported as a warning
//! and kept verbatim.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use base64::Engine as _;
use percent_encoding::percent_decode_str;
use regex::Regex;
use scraper::{Html, Selector};
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use crate::assembler::escape_html;
use crate::unit::{section_anchor, Unit, UnitSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    CrossUnitLink,
    FragmentLink,
    Image,
    ExternalLink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Replaced by an in-document anchor or an absolute URL.
    Rewritten(String),
    /// Replaced by a `data:` URI carrying the resource bytes.
    Inlined(String),
    Unchanged,
    /// Left verbatim and reported.
    Warned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub raw_target: String,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct ResolvedContent {
    pub content: String,
    pub references: Vec<Reference>,
    pub warnings: Vec<String>,
}

/// A reference target located in raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    pub is_image: bool,
    /// Target with HTML entities decoded for attribute values.
    pub target: String,
    /// Byte range of the target inside the scanned content.
    pub span: (usize, usize),
    /// Markdown `<...>` destination.
    pub bracketed: bool,
    /// Value of an HTML attribute rather than a markdown destination.
    pub in_attribute: bool,
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"(?P<bang>!)?\[[^\[\]\n]*\]\(\s*(?P<md><[^>\n]*>|[^)\s]+)(?:\s+"[^"\n]*")?\s*\)"#,
            r#"|<img\b[^>]*?\ssrc\s*=\s*(?:"(?P<img_dq>[^"]*)"|'(?P<img_sq>[^']*)')"#,
            r#"|<a\b[^>]*?\shref\s*=\s*(?:"(?P<a_dq>[^"]*)"|'(?P<a_sq>[^']*)')"#,
        ))
        .expect("reference pattern is valid")
    })
}

/// Finds markdown links/images and HTML `<a href>`/`<img src>` attributes in
/// order of first occurrence.
pub fn scan_references(content: &str) -> Vec<RawReference> {
    let mut found = Vec::new();

    for caps in reference_pattern().captures_iter(content) {
        if let Some(md) = caps.name("md") {
            let text = md.as_str();
            let bracketed = text.starts_with('<') && text.ends_with('>') && text.len() >= 2;
            let target = if bracketed { &text[1..text.len() - 1] } else { text };

            found.push(RawReference {
                is_image: caps.name("bang").is_some(),
                target: target.to_string(),
                span: (md.start(), md.end()),
                bracketed,
                in_attribute: false,
            });
            continue;
        }

        let (is_image, element, attr, value) =
            if let Some(img) = caps.name("img_dq").or_else(|| caps.name("img_sq")) {
                (true, "img", "src", img)
            } else if let Some(a) = caps.name("a_dq").or_else(|| caps.name("a_sq")) {
                (false, "a", "href", a)
            } else {
                continue;
            };

        found.push(RawReference {
            is_image,
            target: decode_attribute(&caps[0], element, attr, value.as_str()),
            span: (value.start(), value.end()),
            bracketed: false,
            in_attribute: true,
        });
    }

    found
}

/// Maps reference targets onto the enumerated units.
pub struct Resolver {
    lookup: HashMap<String, usize>,
    root: Option<PathBuf>,
    extension: Option<String>,
}

impl Resolver {
    /// For units enumerated from `root`. Both `dir/page.ext` and `dir/page`
    /// address the same unit.
    pub fn for_files(units: &[Unit], root: &Path, extension: &str) -> Self {
        let mut lookup = HashMap::new();
        for unit in units {
            lookup.insert(unit.identity.clone(), unit.ordinal);
            if let Some(stem) = unit
                .identity
                .strip_suffix(extension)
                .and_then(|s| s.strip_suffix('.'))
            {
                lookup.entry(stem.to_string()).or_insert(unit.ordinal);
            }
        }

        Self {
            lookup,
            root: Some(root.to_path_buf()),
            extension: Some(extension.to_string()),
        }
    }

    /// For crawled pages, keyed by URL without fragment.
    pub fn for_site(units: &[Unit]) -> Self {
        let mut lookup = HashMap::new();
        for unit in units {
            if let UnitSource::Page(url) = &unit.source {
                lookup.insert(page_key(url), unit.ordinal);
            }
        }

        Self {
            lookup,
            root: None,
            extension: None,
        }
    }

    pub async fn resolve(&self, unit: &Unit, raw: &str) -> ResolvedContent {
        let mut resolved = ResolvedContent {
            content: String::with_capacity(raw.len()),
            ..Default::default()
        };

        let mut cursor = 0;
        for found in scan_references(raw) {
            let (kind, outcome) = match &unit.source {
                UnitSource::File(relative) => {
                    self.resolve_in_file(unit, relative, &found, &mut resolved.warnings)
                        .await
                }
                UnitSource::Page(url) => self.resolve_in_page(url, &found),
            };

            let (start, end) = found.span;
            resolved.content.push_str(&raw[cursor..start]);
            match &outcome {
                Outcome::Rewritten(target) | Outcome::Inlined(target) => {
                    push_target(&mut resolved.content, target, &found)
                }
                Outcome::Unchanged | Outcome::Warned => resolved.content.push_str(&raw[start..end]),
            }
            cursor = end;

            debug!("{:?} \"{}\" -> {}", kind, found.target, outcome.describe());
            resolved.references.push(Reference {
                kind,
                raw_target: found.target,
                outcome,
            });
        }
        resolved.content.push_str(&raw[cursor..]);

        resolved
    }

    async fn resolve_in_file(
        &self,
        unit: &Unit,
        relative: &Path,
        found: &RawReference,
        warnings: &mut Vec<String>,
    ) -> (ReferenceKind, Outcome) {
        let target = found.target.trim();

        if found.is_image {
            if target.is_empty() || is_external(target) {
                return (ReferenceKind::Image, Outcome::Unchanged);
            }
            return self.inline_image(unit, relative, target, warnings).await;
        }

        if target.starts_with('#') {
            return (ReferenceKind::FragmentLink, Outcome::Unchanged);
        }
        if target.is_empty() || is_external(target) {
            return (ReferenceKind::ExternalLink, Outcome::Unchanged);
        }

        let (path_part, fragment) = split_fragment(target);
        let path_part = decode_path(strip_query(path_part));
        let Some(key) = normalize_reference(relative, &path_part) else {
            return (ReferenceKind::ExternalLink, Outcome::Unchanged);
        };

        if let Some(&ordinal) = self.lookup.get(&key) {
            return (
                ReferenceKind::CrossUnitLink,
                Outcome::Rewritten(anchor_target(ordinal, fragment)),
            );
        }

        let looks_internal = self
            .extension
            .as_deref()
            .is_some_and(|ext| key.ends_with(&format!(".{}", ext)));
        if looks_internal {
            let message = format!("Unresolved link \"{}\" in {}", target, unit.identity);
            warn!("{}", message);
            warnings.push(message);
            return (ReferenceKind::CrossUnitLink, Outcome::Warned);
        }

        (ReferenceKind::ExternalLink, Outcome::Unchanged)
    }

    async fn inline_image(
        &self,
        unit: &Unit,
        relative: &Path,
        target: &str,
        warnings: &mut Vec<String>,
    ) -> (ReferenceKind, Outcome) {
        let (path_part, _) = split_fragment(target);
        let path_part = decode_path(strip_query(path_part));

        let location = match (&self.root, normalize_reference(relative, &path_part)) {
            (Some(root), Some(key)) => root.join(key),
            _ => {
                let message = format!("Image outside of root: {} (in {})", target, unit.identity);
                warn!("{}", message);
                warnings.push(message);
                return (ReferenceKind::Image, Outcome::Warned);
            }
        };

        match fs::read(&location).await {
            Ok(bytes) => {
                let data = base64::engine::general_purpose::STANDARD.encode(bytes);
                let uri = format!("data:{};base64,{}", image_mime_type(&location), data);
                (ReferenceKind::Image, Outcome::Inlined(uri))
            }
            Err(e) => {
                let message = if e.kind() == ErrorKind::NotFound {
                    format!("Image not found: {} (in {})", target, unit.identity)
                } else {
                    format!("Failed to read image {} (in {}): {}", target, unit.identity, e)
                };
                warn!("{}", message);
                warnings.push(message);
                (ReferenceKind::Image, Outcome::Warned)
            }
        }
    }

    fn resolve_in_page(&self, page: &Url, found: &RawReference) -> (ReferenceKind, Outcome) {
        let target = found.target.trim();

        if found.is_image {
            // The merged document is loaded from about:blank, so relative
            // sources have to carry the page's base URL.
            if target.is_empty() || Url::parse(target).is_ok() {
                return (ReferenceKind::Image, Outcome::Unchanged);
            }
            return match page.join(target) {
                Ok(absolute) => (ReferenceKind::Image, Outcome::Rewritten(absolute.to_string())),
                Err(_) => (ReferenceKind::Image, Outcome::Unchanged),
            };
        }

        if target.starts_with('#') {
            return (ReferenceKind::FragmentLink, Outcome::Unchanged);
        }

        let Ok(absolute) = page.join(target) else {
            return (ReferenceKind::ExternalLink, Outcome::Unchanged);
        };

        match self.lookup.get(&page_key(&absolute)) {
            Some(&ordinal) => (
                ReferenceKind::CrossUnitLink,
                Outcome::Rewritten(anchor_target(ordinal, absolute.fragment())),
            ),
            None => (ReferenceKind::ExternalLink, Outcome::Unchanged),
        }
    }
}

impl Outcome {
    fn describe(&self) -> &str {
        match self {
            Outcome::Rewritten(target) => target,
            Outcome::Inlined(_) => "inlined",
            Outcome::Unchanged => "unchanged",
            Outcome::Warned => "warned",
        }
    }
}

fn push_target(out: &mut String, target: &str, found: &RawReference) {
    if found.in_attribute {
        out.push_str(&escape_html(target));
    } else if found.bracketed {
        out.push('<');
        out.push_str(target);
        out.push('>');
    } else {
        out.push_str(target);
    }
}

/// Attribute value as a DOM would report it, entities decoded. `tag` is the
/// start tag up to and including the attribute.
fn decode_attribute(tag: &str, element: &str, attr: &str, raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let fragment = Html::parse_fragment(&format!("{}>", tag));
    Selector::parse(element)
        .ok()
        .and_then(|selector| {
            fragment
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr(attr))
                .map(str::to_string)
        })
        .unwrap_or_else(|| raw.to_string())
}

/// `my%20pic.png` names the file `my pic.png`.
fn decode_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

fn anchor_target(ordinal: usize, fragment: Option<&str>) -> String {
    match fragment.filter(|f| !f.is_empty()) {
        Some(fragment) => format!("#{}-{}", section_anchor(ordinal), fragment),
        None => format!("#{}", section_anchor(ordinal)),
    }
}

fn page_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.to_string()
}

/// Schemes (`https:`, `mailto:`, `data:`) and protocol-relative URLs.
fn is_external(target: &str) -> bool {
    target.starts_with("//") || Url::parse(target).is_ok()
}

fn split_fragment(target: &str) -> (&str, Option<&str>) {
    match target.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (target, None),
    }
}

fn strip_query(path: &str) -> &str {
    path.split_once('?').map_or(path, |(p, _)| p)
}

/// Resolves `target` against the directory of `unit_path` (or against the
/// root when it starts with `/`), returning a slash-joined path relative to
/// the root. `None` when the path climbs above the root.
fn normalize_reference(unit_path: &Path, target: &str) -> Option<String> {
    let joined = if let Some(rooted) = target.strip_prefix('/') {
        PathBuf::from(rooted)
    } else {
        unit_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(target)
    };

    let mut stack: Vec<String> = Vec::new();
    for component in joined.components() {
        match component {
            Component::Normal(part) => stack.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                stack.pop()?;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if stack.is_empty() {
        return None;
    }
    Some(stack.join("/"))
}

/// `.svg` and `.png` are recognised, anything else is sent as JPEG.
pub fn image_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}
