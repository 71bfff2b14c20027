use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use colored::*;
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use url::Url;

use crate::artifact::ArtifactEmitter;
use crate::assembler::AssembledDocument;
use crate::config::PageOptions;
use crate::enumerate::{PageFetcher, PageSnapshot};
use crate::error::ConsolidationError;

const SNAPSHOT_JS: &str = r#"
    (() => ({
        title: (document.title || '').trim(),
        html: '<!DOCTYPE html>' + document.documentElement.outerHTML
    }))()
"#;

const PREPARE_JS: &str = r#"
    (() => {
        // Expand collapsed content so it ends up in the snapshot
        for (const details of document.querySelectorAll('details:not([open])')) {
            details.setAttribute('open', '');
        }

        const sectionsToExpand = document
            .querySelectorAll('div[aria-controls^="expandable-body-"]');

        for (let section of sectionsToExpand) {
            section.click();
        }

        // Remove interactive chrome that makes no sense on paper
        const itemSelectorsToRemove = [
            'div[aria-label^="Search"]',
            'div[aria-label="Page actions"]',
            '.DocSearch-Button',
            '[role="search"]',
        ];

        for (let item of document.querySelectorAll(itemSelectorsToRemove.join(', '))) {
            item.remove();
        }
    })()
"#;

/// One browser with one page, owned by a run from start to finish. The same
/// page navigates to every crawled unit and prints the final document.
pub struct BrowserSession {
    browser: Browser,
    handle: JoinHandle<()>,
    page: Page,
    settle: Duration,
}

impl BrowserSession {
    pub async fn launch(headless: bool, settle: Duration) -> Result<Self, ConsolidationError> {
        let mut builder = BrowserConfig::builder().window_size(1200, 800);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| ConsolidationError::browser(format!("failed to create browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ConsolidationError::browser(format!("failed to launch browser: {}", e)))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(err) = h {
                    // Chrome emits messages chromiumoxide cannot decode; those are noise
                    let err_str = err.to_string();
                    if !err_str.contains("data did not match any variant")
                        && !err_str.contains("untagged enum Message")
                    {
                        error!("Browser handler error: {}", err);
                    } else {
                        debug!("Chrome protocol message ignored: {}", err);
                    }
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handle.abort();
                return Err(ConsolidationError::browser(format!(
                    "failed to create new page: {}",
                    e
                )));
            }
        };

        Ok(Self {
            browser,
            handle,
            page,
            settle,
        })
    }

    pub async fn close(mut self) {
        self.browser.close().await.ok();
        self.handle.abort();
    }
}

impl PageFetcher for BrowserSession {
    async fn fetch(&mut self, url: &Url) -> Result<PageSnapshot> {
        info!("Loading \"{}\"", url.as_str().green());

        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;

        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| anyhow!("Failed to wait for navigation: {}", e))?;

        tokio::time::sleep(self.settle).await;

        self.page
            .evaluate(PREPARE_JS)
            .await
            .map_err(|e| anyhow!("Failed to prepare page: {}", e))?;

        let snapshot = self
            .page
            .evaluate(SNAPSHOT_JS)
            .await
            .map_err(|e| anyhow!("Failed to snapshot {}: {}", url, e))?
            .into_value::<PageSnapshot>()
            .map_err(|e| anyhow!("Failed to decode snapshot of {}: {}", url, e))?;

        debug!("Snapshot of {} is {} bytes", url, snapshot.html.len());
        Ok(snapshot)
    }
}

impl ArtifactEmitter for BrowserSession {
    async fn emit(
        &mut self,
        document: &AssembledDocument,
        output: &Path,
        options: &PageOptions,
    ) -> Result<()> {
        info!("Rendering {} sections into PDF...", document.section_count);

        self.page
            .set_content(document.to_html())
            .await
            .map_err(|e| anyhow!("Failed to set document content: {}", e))?;

        // Give inlined images and fonts a moment to lay out
        tokio::time::sleep(self.settle).await;

        let pdf_data = self
            .page
            .pdf(print_params(options))
            .await
            .map_err(|e| anyhow!("Failed to generate PDF: {}", e))?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow!("Failed to create directory: {}", e))?;
        }

        fs::write(output, pdf_data)
            .await
            .map_err(|e| anyhow!("Failed to write PDF to {}: {}", output.display(), e))?;

        info!("PDF written to {}", output.display().to_string().blue());
        Ok(())
    }
}

pub fn print_params(options: &PageOptions) -> PrintToPdfParams {
    let (paper_width, paper_height) = options.format.size_inches();
    let (margin_top, margin_right, margin_bottom, margin_left) = options.margins.inches();

    PrintToPdfParams {
        print_background: Some(options.print_background),
        paper_width: Some(paper_width),
        paper_height: Some(paper_height),
        margin_top: Some(margin_top),
        margin_right: Some(margin_right),
        margin_bottom: Some(margin_bottom),
        margin_left: Some(margin_left),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Margins, PaperFormat};

    #[test]
    fn print_params_follow_page_options() {
        let params = print_params(&PageOptions {
            format: PaperFormat::Letter,
            margins: Margins::uniform(25.4),
            print_background: false,
        });

        assert_eq!(params.print_background, Some(false));
        assert!((params.paper_width.unwrap() - 8.5).abs() < 1e-9);
        assert!((params.paper_height.unwrap() - 11.0).abs() < 1e-9);
        assert!((params.margin_left.unwrap() - 1.0).abs() < 1e-9);
    }
}
