use std::path::{Path, PathBuf};

use colored::*;
use tracing::{info, warn};
use url::Url;

use crate::artifact::{finalize_artifact, ArtifactEmitter};
use crate::assembler::{assemble, AssembledDocument, SectionBreak};
use crate::backend::{FileBackend, SiteBackend};
use crate::browser::BrowserSession;
use crate::config::{PageOptions, RunConfig};
use crate::consolidation::{consolidate, ConsolidationResult, UnitBackend};
use crate::enumerate::{enumerate_files, enumerate_site, PageFetcher};
use crate::error::ConsolidationError;
use crate::resolver::Resolver;
use crate::unit::{Target, Unit};

/// How the assembled document is laid out and where it goes.
#[derive(Debug, Clone)]
pub struct EmitPlan {
    pub layout: SectionBreak,
    pub title: String,
    pub output: PathBuf,
    pub options: PageOptions,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output: PathBuf,
    pub title: String,
    pub units: usize,
    pub sections: usize,
    pub pages: Option<usize>,
    pub warnings: Vec<String>,
    pub failed_units: Vec<String>,
}

pub struct Consolidator {
    config: RunConfig,
}

impl Consolidator {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, target: &Target) -> Result<RunReport, ConsolidationError> {
        let mut report = match target {
            Target::Directory(root) => self.bind_directory(root).await?,
            Target::Site(seed) => {
                let mut session =
                    BrowserSession::launch(self.config.headless, self.config.settle).await?;
                let result = self.bind_site(&mut session, seed).await;
                session.close().await;
                result?
            }
        };

        match finalize_artifact(&report.output, &report.title).await {
            Ok(pages) => report.pages = Some(pages),
            Err(e) => warn!("Could not update document info: {:#}", e),
        }

        Ok(report)
    }

    async fn bind_directory(&self, root: &Path) -> Result<RunReport, ConsolidationError> {
        let units = enumerate_files(root, &self.config.extension)?;
        let resolver = Resolver::for_files(&units, root, &self.config.extension);
        let mut backend = FileBackend::new(root);
        let title = self.document_title(&Target::Directory(root.to_path_buf()), None);
        let plan = self.plan(SectionBreak::HeadingRule, title);

        // Directory units never touch the browser, so it starts only when
        // there is something to print.
        let mut session: Option<BrowserSession> = None;
        let mut emitter = LazyBrowser {
            session: &mut session,
            headless: self.config.headless,
            settle: self.config.settle,
        };
        let result = bind(&units, &resolver, &mut backend, &mut emitter, &plan).await;

        if let Some(session) = session {
            session.close().await;
        }
        result
    }

    async fn bind_site<F: PageFetcher + ArtifactEmitter>(
        &self,
        session: &mut F,
        seed: &Url,
    ) -> Result<RunReport, ConsolidationError> {
        let (units, snapshot) = enumerate_site(seed, session).await?;
        let title = self.document_title(&Target::Site(seed.clone()), Some(&snapshot.title));
        let resolver = Resolver::for_site(&units);
        let plan = self.plan(SectionBreak::Marker, title);

        let mut backend = SiteBackend::new(&mut *session, Some(snapshot));
        let result = consolidate(&units, &resolver, &mut backend).await;

        finish(&units, result, session, &plan).await
    }

    fn plan(&self, layout: SectionBreak, title: String) -> EmitPlan {
        EmitPlan {
            layout,
            title,
            output: self.config.output.clone(),
            options: match layout {
                SectionBreak::HeadingRule => PageOptions::for_files(),
                SectionBreak::Marker => PageOptions::for_site(),
            },
        }
    }

    fn document_title(&self, target: &Target, page_title: Option<&str>) -> String {
        if let Some(title) = &self.config.title {
            return title.clone();
        }
        if let Some(title) = page_title.filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        match target {
            Target::Directory(root) => root
                .canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "Documentation".to_string()),
            Target::Site(url) => url.host_str().unwrap_or("Documentation").to_string(),
        }
    }
}

/// Resolves, renders, assembles and emits already-enumerated units.
pub async fn bind<B: UnitBackend, E: ArtifactEmitter>(
    units: &[Unit],
    resolver: &Resolver,
    backend: &mut B,
    emitter: &mut E,
    plan: &EmitPlan,
) -> Result<RunReport, ConsolidationError> {
    let result = consolidate(units, resolver, backend).await;
    finish(units, result, emitter, plan).await
}

async fn finish<E: ArtifactEmitter>(
    units: &[Unit],
    result: ConsolidationResult,
    emitter: &mut E,
    plan: &EmitPlan,
) -> Result<RunReport, ConsolidationError> {
    result.log_summary();
    result.ensure_renderable()?;

    let document = assemble(units, &result, plan.layout, &plan.title);

    emitter
        .emit(&document, &plan.output, &plan.options)
        .await
        .map_err(|e| ConsolidationError::Emit {
            path: plan.output.clone(),
            message: format!("{:#}", e),
        })?;

    info!(
        "Bound {} of {} units into {}",
        document.section_count,
        units.len(),
        plan.output.display().to_string().blue()
    );

    Ok(RunReport {
        output: plan.output.clone(),
        title: plan.title.clone(),
        units: units.len(),
        sections: document.section_count,
        pages: None,
        warnings: result.warnings().to_vec(),
        failed_units: result.failed_units().to_vec(),
    })
}

/// Launches the browser the first time something needs printing.
struct LazyBrowser<'a> {
    session: &'a mut Option<BrowserSession>,
    headless: bool,
    settle: std::time::Duration,
}

impl ArtifactEmitter for LazyBrowser<'_> {
    async fn emit(
        &mut self,
        document: &AssembledDocument,
        output: &Path,
        options: &PageOptions,
    ) -> anyhow::Result<()> {
        if self.session.is_none() {
            let session = BrowserSession::launch(self.headless, self.settle).await?;
            *self.session = Some(session);
        }
        match self.session.as_mut() {
            Some(session) => session.emit(document, output, options).await,
            None => Err(anyhow::anyhow!("browser session unavailable")),
        }
    }
}
