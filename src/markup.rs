//! MDX to HTML for directory units.

use std::collections::HashSet;

use anyhow::Result;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use slug::slugify;

/// Turns structured text into mergeable HTML.
#[allow(async_fn_in_trait)]
pub trait MarkupParser {
    async fn parse(&self, text: &str) -> Result<String>;
}

/// CommonMark with the usual GitHub extensions. Frontmatter and ESM
/// `import`/`export` lines are dropped, JSX tags pass through as raw HTML,
/// and every heading gets a slug id.
#[derive(Debug, Clone, Default)]
pub struct MdxParser;

impl MarkupParser for MdxParser {
    async fn parse(&self, text: &str) -> Result<String> {
        render_mdx(text)
    }
}

pub fn render_mdx(source: &str) -> Result<String> {
    let body = strip_frontmatter(source);
    let body = strip_module_lines(body);

    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES;

    let mut events: Vec<Event> = Parser::new_ext(&body, options).collect();
    assign_heading_ids(&mut events);

    let mut out = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    Ok(out)
}

/// Removes a leading `---` block. Without a closing delimiter the opening
/// line is an ordinary thematic break and the source is kept whole.
fn strip_frontmatter(source: &str) -> &str {
    let trimmed = source.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return source;
    };
    if !after_open.starts_with(['\n', '\r']) {
        return source;
    }

    let Some(close) = after_open.find("\n---") else {
        return source;
    };
    let rest = &after_open[close + 4..];
    rest.trim_start_matches(['-', '\r']).trim_start_matches('\n')
}

fn strip_module_lines(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence && (line.starts_with("import ") || line.starts_with("export ")) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }

    out
}

fn assign_heading_ids(events: &mut [Event<'_>]) {
    let mut used: HashSet<String> = events
        .iter()
        .filter_map(|e| match e {
            Event::Start(Tag::Heading { id: Some(id), .. }) => Some(id.to_string()),
            _ => None,
        })
        .collect();

    for i in 0..events.len() {
        if !matches!(&events[i], Event::Start(Tag::Heading { id: None, .. })) {
            continue;
        }

        let text = heading_text(&events[i + 1..]);
        let base = match slugify(&text) {
            s if s.is_empty() => "section".to_string(),
            s => s,
        };

        let mut candidate = base.clone();
        let mut n = 1;
        while !used.insert(candidate.clone()) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }

        if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
            *id = Some(CowStr::from(candidate));
        }
    }
}

fn heading_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_get_slug_ids() {
        let html = render_mdx("# Getting Started\n\n## Install `cargo`\n\n## Install `cargo`\n").unwrap();
        assert!(html.contains(r#"<h1 id="getting-started">Getting Started</h1>"#));
        assert!(html.contains(r#"<h2 id="install-cargo">"#));
        assert!(html.contains(r#"<h2 id="install-cargo-1">"#));
    }

    #[test]
    fn explicit_heading_ids_are_kept() {
        let html = render_mdx("## Setup {#custom}\n").unwrap();
        assert!(html.contains(r#"<h2 id="custom">Setup</h2>"#));
    }

    #[test]
    fn frontmatter_and_module_lines_are_dropped() {
        let source = "---\ntitle: Button\n---\nimport { Button } from './button'\n\n# Button\n\n```js\nimport x from 'y'\n```\n";
        let html = render_mdx(source).unwrap();

        assert!(!html.contains("title: Button"));
        assert!(!html.contains("./button"));
        assert!(html.contains("import x from 'y'"));
        assert!(html.contains(r#"<h1 id="button">Button</h1>"#));
    }

    #[test]
    fn leading_rule_without_closing_delimiter_is_content() {
        let html = render_mdx("---\n\nIntro paragraph after a rule.\n").unwrap();
        assert!(html.contains("<hr />"));
        assert!(html.contains("<p>Intro paragraph after a rule.</p>"));
    }

    #[test]
    fn jsx_passes_through() {
        let html = render_mdx("<Callout type=\"info\">\nHello\n</Callout>\n").unwrap();
        assert!(html.contains("<Callout type=\"info\">"));
    }

    #[tokio::test]
    async fn parser_trait_renders() {
        let html = MdxParser.parse("Some *text*").await.unwrap();
        assert_eq!(html.trim(), "<p>Some <em>text</em></p>");
    }
}
