//! # docbind
//!
//! Binds a directory of MDX files, or a documentation website, into one PDF.
//!
//! Units are enumerated in a deterministic order, references between them are
//! rewritten to in-document anchors, each unit is rendered on its own so one
//! failure cannot sink the run, and the survivors are merged behind a table
//! of contents with every unit starting on a fresh page.
//!
//! ## Usage
//!
//! ```bash
//! docbind ./docs
//! docbind https://example.com/docs/
//! ```

mod artifact;
mod assembler;
mod backend;
mod browser;
mod config;
mod consolidation;
mod enumerate;
mod error;
mod markup;
mod pipeline;
mod resolver;
mod unit;

pub use artifact::{finalize_artifact, ArtifactEmitter};
pub use assembler::{assemble, AssembledDocument, SectionBreak};
pub use backend::{extract_body, FileBackend, SiteBackend};
pub use browser::BrowserSession;
pub use config::{Margins, PageOptions, PaperFormat, RunConfig};
pub use consolidation::{consolidate, ConsolidationResult, SectionSlot, UnitBackend};
pub use enumerate::{enumerate_files, enumerate_site, select_site_links, PageFetcher, PageSnapshot};
pub use error::ConsolidationError;
pub use markup::{MarkupParser, MdxParser};
pub use pipeline::{bind, Consolidator, EmitPlan, RunReport};
pub use resolver::{scan_references, Outcome, Reference, ReferenceKind, ResolvedContent, Resolver};
pub use unit::{Target, Unit, UnitSource};
