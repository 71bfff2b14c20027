use clap::Parser;
use colored::*;
use docbind::{Consolidator, RunConfig, Target};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docbind")]
#[command(about = "Bind a folder of MDX files or a documentation website into a single PDF")]
#[command(version)]
struct Args {
    /// Directory to scan, or URL of the documentation start page
    target: String,

    /// Output file for the combined PDF
    #[arg(short = 'o', long = "output", default_value = "output.pdf")]
    output: PathBuf,

    /// File extension selecting units in directory mode
    #[arg(short = 'e', long = "ext", default_value = "mdx")]
    extension: String,

    /// Milliseconds to wait after each navigation for the page to settle
    #[arg(long = "settle-ms", default_value_t = 1000)]
    settle_ms: u64,

    /// Show the browser window while working
    #[arg(long = "headful")]
    headful: bool,

    /// Document title written into the PDF metadata
    #[arg(short = 't', long = "title")]
    title: Option<String>,

    /// Log per-reference decisions
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.verbose { "docbind=debug" } else { "docbind=info" };
    let filter = EnvFilter::from_default_env()
        .add_directive("chromiumoxide::conn=off".parse().unwrap())
        .add_directive("chromiumoxide::handler=off".parse().unwrap())
        .add_directive(level.parse().unwrap());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = RunConfig {
        output: args.output,
        extension: args.extension.trim_start_matches('.').to_string(),
        headless: !args.headful,
        title: args.title,
        ..RunConfig::default()
    }
    .with_settle_ms(args.settle_ms);

    let result = match Target::parse(&args.target) {
        Ok(target) => Consolidator::new(config).run(&target).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => {
            let pages = report
                .pages
                .map(|p| format!(", {} pages", p))
                .unwrap_or_default();
            info!(
                "Generated {} ({} of {} units{})",
                report.output.display().to_string().green(),
                report.sections,
                report.units,
                pages
            );
        }
        Err(e) => {
            error!("{}", format!("Error: {}", e).red());
            process::exit(1);
        }
    }
}
