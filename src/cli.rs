use crate::config::load_config;
use crate::fetch::{FetcherChain, FileFetcher};
use crate::layout_dump::write_layout_dump;
use crate::render::{write_output_png, write_output_svg};
use crate::session::Session;
use crate::source_map::Span;
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "calmv", version, about = "FINOS CALM architecture visualizer")]
pub struct Args {
    /// Input CALM document (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout for SVG and layout output.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,

    /// Follow a node's detailed architecture before rendering; repeat to go deeper
    #[arg(long = "drill")]
    pub drill: Vec<String>,

    /// Print where a node or relationship is defined instead of rendering
    #[arg(long = "locate")]
    pub locate: Vec<String>,

    /// Report records that were dropped while reading the document
    #[arg(long = "diagnostics")]
    pub diagnostics: bool,

    /// Write a pretty-printed copy of the document into this directory
    #[arg(long = "export")]
    pub export: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
    Layout,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(width) = args.width {
        config.render.width = width;
    }
    if let Some(height) = args.height {
        config.render.height = height;
    }

    let input = read_input(args.input.as_deref())?;
    let mut session = Session::new(config);
    session
        .load(&input, None)
        .context("failed to parse CALM document")?;

    let fetcher = drill_fetcher(base_dir(args.input.as_deref()));
    for node in &args.drill {
        session.drill_down(node, &fetcher)?;
    }

    if args.diagnostics {
        for diagnostic in session.current().diagnostics() {
            eprintln!("dropped: {diagnostic}");
        }
    }

    if let Some(dir) = args.export.as_deref() {
        let exported = session.export(chrono::Utc::now());
        let path = exported
            .write_into(dir)
            .with_context(|| format!("failed to export into {}", dir.display()))?;
        eprintln!("exported {}", path.display());
    }

    if !args.locate.is_empty() {
        for id in &args.locate {
            match session.locate(id) {
                Some(span) => println!("{id}\t{}", format_span(&span)),
                None => println!("{id}\tnot found"),
            }
        }
        return Ok(());
    }

    let state = session.current();
    match args.output_format {
        OutputFormat::Svg => {
            write_output_svg(&session.render_svg(), args.output.as_deref())?;
        }
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            let config = session.config();
            write_output_png(&session.render_svg(), &output, &config.render, &config.theme)?;
        }
        OutputFormat::Layout => {
            write_layout_dump(args.output.as_deref(), &state.layout, &state.graph)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    // A second init (tests, embedding) keeps the existing subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path.filter(|path| *path != Path::new("-")) {
        return std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn base_dir(path: Option<&Path>) -> PathBuf {
    path.filter(|path| *path != Path::new("-"))
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Local files next to the input, plus HTTP(S) links when built with `remote`.
fn drill_fetcher(base_dir: PathBuf) -> FetcherChain {
    let chain = FetcherChain::new().with(FileFetcher::new(base_dir));
    #[cfg(feature = "remote")]
    let chain = chain.with(crate::fetch::HttpFetcher::new());
    chain
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

/// 1-based `line:column-line:column` for people reading terminal output.
fn format_span(span: &Span) -> String {
    format!(
        "{}:{}-{}:{}",
        span.value.line + 1,
        span.value.column + 1,
        span.value_end.line + 1,
        span.value_end.column + 1
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_map::SourcePosition;

    #[test]
    fn spans_print_one_based() {
        let span = Span {
            value: SourcePosition { line: 0, column: 4, pos: 4 },
            value_end: SourcePosition { line: 2, column: 1, pos: 30 },
        };
        assert_eq!(format_span(&span), "1:5-3:2");
    }

    #[test]
    fn drill_down_resolves_next_to_the_input() {
        assert_eq!(base_dir(Some(Path::new("docs/arch.json"))), PathBuf::from("docs"));
        assert_eq!(base_dir(Some(Path::new("-"))), PathBuf::from("."));
        assert_eq!(base_dir(None), PathBuf::from("."));
    }

    #[test]
    fn drill_fetcher_follows_nested_relative_references() {
        let root = std::env::temp_dir().join(format!("calmv-cli-drill-{}", std::process::id()));
        std::fs::create_dir_all(root.join("sub")).expect("temp dir");
        let input = root.join("root.json");
        std::fs::write(
            &input,
            r#"{"nodes": [{"unique-id": "svc", "details": {"detailed-architecture": "sub/child.json"}}]}"#,
        )
        .expect("write root");
        std::fs::write(
            root.join("sub").join("child.json"),
            r#"{"nodes": [{"unique-id": "worker", "details": {"detailed-architecture": "grand.json"}}]}"#,
        )
        .expect("write child");
        std::fs::write(root.join("sub").join("grand.json"), r#"{"nodes": [{"unique-id": "step"}]}"#)
            .expect("write grand");

        let mut session = Session::default();
        session
            .load(&read_input(Some(&input)).expect("read root"), None)
            .expect("root parses");
        let fetcher = drill_fetcher(base_dir(Some(&input)));
        session.drill_down("svc", &fetcher).expect("first level");
        session.drill_down("worker", &fetcher).expect("second level");
        assert!(session.current().layout.nodes.contains_key("step"));
        std::fs::remove_dir_all(&root).ok();
    }

    #[cfg(not(feature = "remote"))]
    #[test]
    fn drill_fetcher_without_remote_rejects_links() {
        use crate::fetch::{DocumentFetcher, FetchError};
        let fetcher = drill_fetcher(PathBuf::from("."));
        assert!(matches!(
            fetcher.fetch("https://example.com/arch.json"),
            Err(FetchError::Unsupported(_))
        ));
    }

    #[cfg(feature = "remote")]
    #[test]
    fn drill_fetcher_with_remote_sends_links_over_http() {
        use crate::fetch::{DocumentFetcher, FetchError};
        let fetcher = drill_fetcher(PathBuf::from("."));
        // Nothing listens on the discard port, so the request itself fails.
        let result = fetcher.fetch("http://127.0.0.1:9/arch.json");
        assert!(result.is_err());
        assert!(!matches!(result, Err(FetchError::Unsupported(_))));
    }

    #[test]
    fn args_parse_repeated_flags() {
        let args = Args::try_parse_from([
            "calmv", "-i", "a.json", "-e", "layout", "--locate", "api", "--locate", "db", "-vv",
        ])
        .expect("valid args");
        assert_eq!(args.output_format, OutputFormat::Layout);
        assert_eq!(args.locate, vec!["api", "db"]);
        assert_eq!(args.verbose, 2);
    }
}
