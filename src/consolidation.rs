//! Per-run bookkeeping and the sequential resolve/render stage.

use colored::*;
use tracing::{error, info, warn};

use crate::error::ConsolidationError;
use crate::resolver::Resolver;
use crate::unit::Unit;

/// Loads a unit's raw content and renders resolved content into markup.
///
/// Both calls may fail; the failure only affects the unit being processed.
#[allow(async_fn_in_trait)]
pub trait UnitBackend {
    async fn load(&mut self, unit: &Unit) -> anyhow::Result<String>;
    async fn render(&mut self, unit: &Unit, resolved: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionSlot {
    Pending,
    Rendered(String),
    Failed,
}

/// Everything a run accumulates before assembly. One slot per ordinal.
#[derive(Debug)]
pub struct ConsolidationResult {
    sections: Vec<SectionSlot>,
    warnings: Vec<String>,
    failed_units: Vec<String>,
}

impl ConsolidationResult {
    pub fn new(unit_count: usize) -> Self {
        Self {
            sections: vec![SectionSlot::Pending; unit_count],
            warnings: Vec::new(),
            failed_units: Vec::new(),
        }
    }

    pub fn record_rendered(&mut self, ordinal: usize, markup: String) {
        self.sections[ordinal] = SectionSlot::Rendered(markup);
    }

    pub fn record_failed(&mut self, unit: &Unit, reason: impl std::fmt::Display) {
        self.sections[unit.ordinal] = SectionSlot::Failed;
        if !self.failed_units.contains(&unit.identity) {
            self.failed_units.push(unit.identity.clone());
        }
        self.warnings
            .push(format!("Failed to render {}: {}", unit.identity, reason));
    }

    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = String>) {
        self.warnings.extend(warnings);
    }

    pub fn sections(&self) -> &[SectionSlot] {
        &self.sections
    }

    /// Markup of a successfully rendered ordinal.
    pub fn rendered(&self, ordinal: usize) -> Option<&str> {
        match self.sections.get(ordinal) {
            Some(SectionSlot::Rendered(markup)) => Some(markup),
            _ => None,
        }
    }

    pub fn rendered_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s, SectionSlot::Rendered(_)))
            .count()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn failed_units(&self) -> &[String] {
        &self.failed_units
    }

    /// Prints every warning and the failed units. Runs before the overall
    /// verdict so degraded output is always visible.
    pub fn log_summary(&self) {
        if !self.warnings.is_empty() {
            warn!("{} warning(s):", self.warnings.len());
            for message in &self.warnings {
                warn!("  {}", message.yellow());
            }
        }

        if !self.failed_units.is_empty() {
            error!("{} unit(s) failed:", self.failed_units.len());
            for identity in &self.failed_units {
                error!("  {}", identity.red());
            }
        }
    }

    pub fn ensure_renderable(&self) -> Result<(), ConsolidationError> {
        let total = self.sections.len();
        if total > 0 && self.failed_units.len() == total {
            return Err(ConsolidationError::AllUnitsFailed { total });
        }
        Ok(())
    }
}

/// Loads, resolves and renders every unit one at a time, in ordinal order.
pub async fn consolidate<B: UnitBackend>(
    units: &[Unit],
    resolver: &Resolver,
    backend: &mut B,
) -> ConsolidationResult {
    let mut result = ConsolidationResult::new(units.len());

    for unit in units {
        info!(
            "Processing {} ({}/{})",
            unit.display_label.green(),
            unit.ordinal + 1,
            units.len()
        );

        let raw = match backend.load(unit).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to load {}: {:#}", unit.identity, e);
                result.record_failed(unit, format!("{:#}", e));
                continue;
            }
        };

        let resolved = resolver.resolve(unit, &raw).await;
        result.extend_warnings(resolved.warnings);

        match backend.render(unit, &resolved.content).await {
            Ok(markup) => result.record_rendered(unit.ordinal, markup),
            Err(e) => {
                warn!("Failed to render {}: {:#}", unit.identity, e);
                result.record_failed(unit, format!("{:#}", e));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::path::Path;

    struct Scripted {
        fail_render: Vec<usize>,
        fail_load: Vec<usize>,
    }

    impl UnitBackend for Scripted {
        async fn load(&mut self, unit: &Unit) -> anyhow::Result<String> {
            if self.fail_load.contains(&unit.ordinal) {
                bail!("disk on fire");
            }
            Ok(format!("body of {}", unit.identity))
        }

        async fn render(&mut self, unit: &Unit, resolved: &str) -> anyhow::Result<String> {
            if self.fail_render.contains(&unit.ordinal) {
                bail!("renderer crashed");
            }
            Ok(format!("<p>{}</p>", resolved))
        }
    }

    fn units(n: usize) -> Vec<Unit> {
        (0..n)
            .map(|i| {
                let name = format!("u{}.mdx", i);
                Unit::file(i, Path::new(&name), format!("u{}", i))
            })
            .collect()
    }

    #[tokio::test]
    async fn failed_unit_leaves_a_gap() {
        let dir = tempfile::tempdir().unwrap();
        let units = units(4);
        let resolver = Resolver::for_files(&units, dir.path(), "mdx");
        let mut backend = Scripted {
            fail_render: vec![1],
            fail_load: vec![3],
        };

        let result = consolidate(&units, &resolver, &mut backend).await;

        assert_eq!(result.sections().len(), 4);
        assert_eq!(result.rendered(0), Some("<p>body of u0.mdx</p>"));
        assert_eq!(result.sections()[1], SectionSlot::Failed);
        assert_eq!(result.rendered(2), Some("<p>body of u2.mdx</p>"));
        assert_eq!(result.sections()[3], SectionSlot::Failed);
        assert_eq!(result.failed_units(), ["u1.mdx", "u3.mdx"]);
        assert_eq!(result.warnings().len(), 2);
        assert!(result.ensure_renderable().is_ok());
    }

    #[tokio::test]
    async fn all_failed_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let units = units(2);
        let resolver = Resolver::for_files(&units, dir.path(), "mdx");
        let mut backend = Scripted {
            fail_render: vec![0, 1],
            fail_load: vec![],
        };

        let result = consolidate(&units, &resolver, &mut backend).await;
        let err = result.ensure_renderable().unwrap_err();
        assert!(matches!(err, ConsolidationError::AllUnitsFailed { total: 2 }));
    }
}
