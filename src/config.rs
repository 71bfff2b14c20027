use std::path::PathBuf;
use std::time::Duration;

const MM_PER_INCH: f64 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFormat {
    A4,
    Letter,
}

impl PaperFormat {
    /// Paper size as (width, height) in millimetres.
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            PaperFormat::A4 => (210.0, 297.0),
            PaperFormat::Letter => (215.9, 279.4),
        }
    }

    /// Paper size in inches, the unit Chrome's print API expects.
    pub fn size_inches(self) -> (f64, f64) {
        let (w, h) = self.size_mm();
        (w / MM_PER_INCH, h / MM_PER_INCH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top_mm: f64,
    pub right_mm: f64,
    pub bottom_mm: f64,
    pub left_mm: f64,
}

impl Margins {
    pub fn uniform(mm: f64) -> Self {
        Self {
            top_mm: mm,
            right_mm: mm,
            bottom_mm: mm,
            left_mm: mm,
        }
    }

    /// Margins in inches as (top, right, bottom, left).
    pub fn inches(&self) -> (f64, f64, f64, f64) {
        (
            self.top_mm / MM_PER_INCH,
            self.right_mm / MM_PER_INCH,
            self.bottom_mm / MM_PER_INCH,
            self.left_mm / MM_PER_INCH,
        )
    }
}

/// Page setup handed to the artifact emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOptions {
    pub format: PaperFormat,
    pub margins: Margins,
    pub print_background: bool,
}

impl PageOptions {
    /// A4 with 20mm margins, used when binding a directory of files.
    pub fn for_files() -> Self {
        Self {
            format: PaperFormat::A4,
            margins: Margins::uniform(20.0),
            print_background: true,
        }
    }

    /// A4 with 2cm margins, used when binding a crawled site.
    pub fn for_site() -> Self {
        Self {
            format: PaperFormat::A4,
            margins: Margins::uniform(20.0),
            print_background: true,
        }
    }
}

impl Default for PageOptions {
    fn default() -> Self {
        Self::for_files()
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Where the finished PDF is written.
    pub output: PathBuf,
    /// Extension (without the dot) selecting units in directory mode.
    pub extension: String,
    pub headless: bool,
    /// Pause after each navigation so client-side rendering can finish.
    pub settle: Duration,
    /// Overrides the document title derived from the target.
    pub title: Option<String>,
}

impl RunConfig {
    pub fn with_settle_ms(mut self, millis: u64) -> Self {
        self.settle = Duration::from_millis(millis);
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output.pdf"),
            extension: "mdx".to_string(),
            headless: true,
            settle: Duration::from_millis(1000),
            title: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_in_inches() {
        let (w, h) = PaperFormat::A4.size_inches();
        assert!((w - 8.267).abs() < 0.01);
        assert!((h - 11.693).abs() < 0.01);
    }

    #[test]
    fn twenty_mm_margins() {
        let (top, right, bottom, left) = PageOptions::for_files().margins.inches();
        for m in [top, right, bottom, left] {
            assert!((m - 0.787).abs() < 0.001);
        }
        assert_eq!(PageOptions::for_site().margins, Margins::uniform(20.0));
    }

    #[test]
    fn run_config_defaults() {
        let config = RunConfig::default().with_settle_ms(250);
        assert_eq!(config.output, PathBuf::from("output.pdf"));
        assert_eq!(config.extension, "mdx");
        assert!(config.headless);
        assert_eq!(config.settle, Duration::from_millis(250));
    }
}
