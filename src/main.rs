use chrono::{DateTime, Local, TimeZone, Utc};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use svq::query::date::parse_timestamp_str;
use svq::{store, values, view, Document, SmartView};

#[derive(Parser)]
#[command(name = "svq", about = "Filter note documents with smart view queries")]
struct Cli {
    #[arg(long, env = "SVQ_DOCS", help = "Document file or directory")]
    docs: Option<PathBuf>,

    #[arg(long, env = "SVQ_VIEW", help = "Smart view file (YAML or JSON)")]
    view: Option<PathBuf>,

    #[arg(long, help = "List unique values for a property")]
    values: Option<String>,

    #[arg(long, help = "Show count for each value (use with --values)")]
    count: bool,

    #[arg(long, help = "Read document file paths from stdin")]
    stdin: bool,

    #[arg(long, help = "Print the view as stored, without placeholder conditions")]
    persist: bool,

    #[arg(long, help = "Reference time for relative dates (RFC 3339 or YYYY-MM-DD)")]
    now: Option<String>,

    #[arg(long, help = "Compare calendar days in UTC instead of the local time zone")]
    utc: bool,

    #[arg(short, long, action = ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.persist {
        return run_persist_mode(cli.view.as_deref());
    }

    let documents = if cli.stdin {
        store::load_files(&store::read_paths_from_stdin())
    } else {
        let Some(docs_path) = cli.docs.as_deref() else {
            eprintln!("Error: No documents specified. Use --docs, --stdin or set SVQ_DOCS");
            return ExitCode::from(2);
        };
        match store::load_documents(docs_path) {
            Ok(docs) => docs,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(2);
            }
        }
    };
    debug!(count = documents.len(), "documents ready");

    if let Some(property) = cli.values {
        return run_values_mode(&documents, &property, cli.count);
    }

    let Some(view_path) = cli.view.as_deref() else {
        eprintln!("Error: No smart view provided. Use --view or set SVQ_VIEW");
        return ExitCode::from(2);
    };
    let view = match view::load_view(view_path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("View error: {}", e);
            return ExitCode::from(2);
        }
    };

    let now = match cli.now.as_deref() {
        None => Utc::now(),
        Some(s) => match parse_timestamp_str(s) {
            Some(t) => t,
            None => {
                eprintln!("Error: Invalid --now value: {}", s);
                return ExitCode::from(2);
            }
        },
    };

    if cli.utc {
        run_query_mode(&documents, &view, now)
    } else {
        run_query_mode(&documents, &view, now.with_timezone(&Local))
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "svq=warn",
        1 => "svq=debug",
        _ => "svq=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_persist_mode(view_path: Option<&std::path::Path>) -> ExitCode {
    let Some(view_path) = view_path else {
        eprintln!("Error: --persist needs a smart view. Use --view or set SVQ_VIEW");
        return ExitCode::from(2);
    };

    let persisted = match view::load_view(view_path) {
        Ok(v) => v.persisted(),
        Err(e) => {
            eprintln!("View error: {}", e);
            return ExitCode::from(2);
        }
    };

    match serde_json::to_string_pretty(&persisted) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run_values_mode(documents: &[Document], property: &str, show_count: bool) -> ExitCode {
    let counts = values::collect_values(documents, property);
    debug!(property, distinct = counts.len(), "collected property values");

    let lines = values::format_values(counts, show_count);
    if lines.is_empty() {
        return ExitCode::from(1);
    }
    println!("{}", lines.join("\n"));
    ExitCode::SUCCESS
}

fn run_query_mode<Tz: TimeZone>(
    documents: &[Document],
    view: &SmartView,
    now: DateTime<Tz>,
) -> ExitCode {
    let matcher = view.matcher(now);

    let mut found = false;

    for doc in documents {
        if matcher.matches(doc) {
            found = true;
            println!("{}", doc.id);
        }
    }

    if found {
        ExitCode::from(0)
    } else {
        ExitCode::from(1)
    }
}
