//! Merges rendered units into one HTML document with a table of contents.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::consolidation::ConsolidationResult;
use crate::unit::Unit;

/// How the emitter is told to start each unit on a fresh page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionBreak {
    /// A `page-break-before` rule on every section (directory mode).
    HeadingRule,
    /// Explicit break markers between sections (crawled page snapshots).
    Marker,
}

const FILE_STYLESHEET: &str = r#"
body {
  font-family: 'SF Mono', Menlo, monospace;
  line-height: 1.6;
  padding: 20px;
  font-size: 14px;
}
#toc ul { list-style: none; padding-left: 0; }
#toc li { margin: 4px 0; }
section.unit { page-break-before: always; break-before: page; }
.unit-title { font-size: 24px; margin-bottom: 20px; }
.file-path { color: #666; font-size: 0.9em; margin-bottom: 10px; }
code { background: #f0f0f0; padding: 2px 4px; border-radius: 3px; }
pre { background: #f4f4f4; padding: 15px; border-radius: 5px; white-space: pre-wrap; }
img { max-width: 100%; height: auto; }
"#;

const SITE_STYLESHEET: &str = r#"
body { font-family: Arial, sans-serif; }
#toc ul { list-style: none; padding-left: 0; }
#toc li { margin: 4px 0; }
.page-break { page-break-after: always; break-after: page; }
.unit-title { font-size: 24px; }
img { max-width: 100%; height: auto; }
"#;

/// The merged body plus the stylesheet the emitter should apply.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub title: String,
    pub body: String,
    pub stylesheet: String,
    pub section_count: usize,
}

impl AssembledDocument {
    pub fn to_html(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            escape_html(&self.title),
            self.stylesheet,
            self.body
        )
    }
}

pub fn assemble(
    units: &[Unit],
    result: &ConsolidationResult,
    layout: SectionBreak,
    title: &str,
) -> AssembledDocument {
    let rendered: Vec<(&Unit, &str)> = units
        .iter()
        .filter_map(|unit| result.rendered(unit.ordinal).map(|markup| (unit, markup)))
        .collect();

    let mut body = String::from("<div id=\"content\">\n");
    body.push_str(&table_of_contents(&rendered));

    if layout == SectionBreak::Marker && !rendered.is_empty() {
        body.push_str(PAGE_BREAK);
    }

    for (i, (unit, markup)) in rendered.iter().enumerate() {
        let anchor = unit.section_anchor();
        body.push_str(&format!(
            "<section class=\"unit\" id=\"{}\">\n<h1 class=\"unit-title\">{}</h1>\n",
            anchor,
            escape_html(&unit.display_label)
        ));
        if layout == SectionBreak::HeadingRule {
            body.push_str(&format!(
                "<div class=\"file-path\">Path: {}</div>\n",
                escape_html(&unit.identity)
            ));
        }
        body.push_str(&alias_element_ids(markup, &anchor));
        body.push_str("\n</section>\n");

        if layout == SectionBreak::Marker && i + 1 < rendered.len() {
            body.push_str(PAGE_BREAK);
        }
    }
    body.push_str("</div>");

    debug!("Assembled {} sections", rendered.len());

    AssembledDocument {
        title: title.to_string(),
        body,
        stylesheet: match layout {
            SectionBreak::HeadingRule => FILE_STYLESHEET,
            SectionBreak::Marker => SITE_STYLESHEET,
        }
        .to_string(),
        section_count: rendered.len(),
    }
}

const PAGE_BREAK: &str = "<div class=\"page-break\"></div>\n";

fn table_of_contents(rendered: &[(&Unit, &str)]) -> String {
    let mut toc = String::from("<nav id=\"toc\">\n<h1>Table of Contents</h1>\n<ul>\n");
    for (unit, _) in rendered {
        toc.push_str(&format!(
            "<li class=\"toc-depth-{depth}\" style=\"margin-left: {indent}em\"><a href=\"#{anchor}\">{label}</a></li>\n",
            depth = unit.depth(),
            indent = unit.depth() as f32 * 1.5,
            anchor = unit.section_anchor(),
            label = escape_html(&unit.display_label),
        ));
    }
    toc.push_str("</ul>\n</nav>\n");
    toc
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<[a-zA-Z][a-zA-Z0-9-]*\b[^>]*?\sid\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
            .expect("id pattern is valid")
    })
}

/// Places an empty `<span id="<anchor>-<id>">` in front of every element that
/// carries an id, so `#<anchor>-<fragment>` deep links land while the
/// original ids stay untouched. A span keeps enclosing links intact.
fn alias_element_ids(markup: &str, anchor: &str) -> String {
    id_pattern()
        .replace_all(markup, |caps: &Captures| {
            let id = caps
                .name("dq")
                .or_else(|| caps.name("sq"))
                .map_or("", |m| m.as_str());
            if id.is_empty() {
                return caps[0].to_string();
            }
            format!("<span id=\"{}-{}\"></span>{}", anchor, id, &caps[0])
        })
        .into_owned()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn units() -> Vec<Unit> {
        ["a.mdx", "b/c.mdx", "b/d/e.mdx"]
            .iter()
            .enumerate()
            .map(|(i, name)| Unit::file(i, Path::new(name), name.trim_end_matches(".mdx").to_string()))
            .collect()
    }

    fn result_with(rendered: &[(usize, &str)], failed: &[usize], units: &[Unit]) -> ConsolidationResult {
        let mut result = ConsolidationResult::new(units.len());
        for (ordinal, markup) in rendered {
            result.record_rendered(*ordinal, markup.to_string());
        }
        for ordinal in failed {
            result.record_failed(&units[*ordinal], "boom");
        }
        result
    }

    #[test]
    fn toc_is_indented_by_depth() {
        let units = units();
        let result = result_with(&[(0, "<p>a</p>"), (1, "<p>c</p>"), (2, "<p>e</p>")], &[], &units);
        let doc = assemble(&units, &result, SectionBreak::HeadingRule, "Docs");

        assert!(doc.body.contains(r##"style="margin-left: 0em"><a href="#section-0">a</a>"##));
        assert!(doc.body.contains(r##"style="margin-left: 1.5em"><a href="#section-1">b/c</a>"##));
        assert!(doc.body.contains(r##"style="margin-left: 3em"><a href="#section-2">b/d/e</a>"##));
        assert_eq!(doc.section_count, 3);
        assert!(doc.stylesheet.contains("page-break-before: always"));
        assert!(!doc.body.contains("page-break\""));
    }

    #[test]
    fn failed_sections_are_skipped_in_order() {
        let units = units();
        let result = result_with(&[(0, "<p>a</p>"), (2, "<p>e</p>")], &[1], &units);
        let doc = assemble(&units, &result, SectionBreak::HeadingRule, "Docs");

        assert_eq!(doc.section_count, 2);
        assert!(!doc.body.contains("section-1"));
        let first = doc.body.find("id=\"section-0\"").unwrap();
        let third = doc.body.find("id=\"section-2\"").unwrap();
        assert!(first < third);
    }

    #[test]
    fn markers_go_between_sections_only() {
        let units = units();
        let result = result_with(&[(0, "<p>a</p>"), (1, "<p>c</p>"), (2, "<p>e</p>")], &[], &units);
        let doc = assemble(&units, &result, SectionBreak::Marker, "Site");

        // One after the TOC, then one between each pair of sections.
        assert_eq!(doc.body.matches(PAGE_BREAK).count(), 3);
        assert!(doc.body.trim_end().ends_with("</section>\n</div>"));
        assert!(!doc.body.contains("file-path"));
    }

    #[test]
    fn element_ids_get_section_aliases() {
        let aliased = alias_element_ids(r#"<h2 id="install">Install</h2><p>x</p><div id=''>"#, "section-4");
        assert_eq!(
            aliased,
            r#"<span id="section-4-install"></span><h2 id="install">Install</h2><p>x</p><div id=''>"#
        );
    }

    #[test]
    fn aliases_inside_links_keep_the_link_whole() {
        let units = units();
        let markup = r#"<a href="/docs/x"><span id="card">Card title</span></a>"#;
        let result = result_with(&[(0, markup)], &[], &units);
        let doc = assemble(&units, &result, SectionBreak::Marker, "Site");

        let fragment = scraper::Html::parse_fragment(&doc.body);
        let link = scraper::Selector::parse(r#"a[href="/docs/x"]"#).unwrap();
        let alias = scraper::Selector::parse("#section-0-card").unwrap();

        let inner = fragment.select(&link).next().unwrap().inner_html();
        assert!(inner.contains("Card title"));
        assert!(inner.contains(r#"<span id="section-0-card"></span>"#));
        assert_eq!(fragment.select(&alias).count(), 1);
    }

    #[test]
    fn labels_are_escaped() {
        let units = vec![Unit::file(0, Path::new("a<b>.mdx"), "a<b>".to_string())];
        let result = result_with(&[(0, "")], &[], &units);
        let doc = assemble(&units, &result, SectionBreak::HeadingRule, "T & C");

        assert!(doc.body.contains("a&lt;b&gt;"));
        assert!(doc.to_html().contains("<title>T &amp; C</title>"));
    }
}
