//! search-chat: CLI for the streaming search backend.
//! Reads config, sends one query (argument or stdin), prints the streamed
//! answer to stdout followed by sources and timing. `--list-sessions` prints
//! the stored session list instead.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use search_chat_client::config;
use search_chat_client::{Client, SourceItem, StreamCallbacks};

struct Args {
    config_path: Option<PathBuf>,
    session_id: Option<String>,
    list_sessions: bool,
    question: Option<String>,
}

fn parse_args() -> Args {
    let mut args = Args {
        config_path: None,
        session_id: None,
        list_sessions: false,
        question: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config_path = iter.next().map(PathBuf::from),
            "--session" => args.session_id = iter.next(),
            "--list-sessions" => args.list_sessions = true,
            _ => {
                if args.question.is_none() {
                    args.question = Some(arg);
                }
            }
        }
    }
    args
}

fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    // 1. --config <path> flag
    if let Some(path) = flag {
        return path;
    }
    // 2. SEARCH_CHAT_CONFIG env var
    if let Ok(val) = std::env::var("SEARCH_CHAT_CONFIG") {
        return PathBuf::from(val);
    }
    // 3. Default path (~/.search-chat/config.yaml)
    config::default_config_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine config path (set --config or SEARCH_CHAT_CONFIG)");
        process::exit(1);
    })
}

fn load_config(path: &PathBuf) -> config::Config {
    if !path.exists() {
        return config::Config::default();
    }
    match config::load(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!(
                "Error: failed to load config from {}: {}",
                path.display(),
                e
            );
            process::exit(1);
        }
    }
}

fn read_question_from_stdin() -> String {
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).unwrap_or(0);
    line.trim().to_string()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = parse_args();
    let config_path = resolve_config_path(args.config_path.clone());
    let cfg = load_config(&config_path);

    let mut http = reqwest::Client::builder();
    if let Some(secs) = cfg.backend.timeout_secs {
        http = http.connect_timeout(Duration::from_secs(secs));
    }
    let http = http.build().unwrap_or_else(|e| {
        eprintln!("Error: failed to build HTTP client: {}", e);
        process::exit(1);
    });
    let client = Client::with_http(cfg.base_url(), http);

    let session_id = args.session_id.clone().or(cfg.chat.session_id.clone());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    if args.list_sessions {
        rt.block_on(async {
            match client.list_sessions().await {
                Ok(sessions) => {
                    for session in sessions {
                        println!("{}  {}  ({})", session.id, session.title, session.updated_at);
                    }
                }
                Err(e) => {
                    eprintln!("Error: failed to list sessions: {}", e);
                    process::exit(1);
                }
            }
        });
        return;
    }

    let question = args
        .question
        .clone()
        .unwrap_or_else(read_question_from_stdin);
    if question.is_empty() {
        eprintln!("Error: no question provided");
        process::exit(1);
    }

    rt.block_on(run_query(&client, &question, session_id.as_deref()));
}

async fn run_query(client: &Client, question: &str, session_id: Option<&str>) {
    let sources: Arc<Mutex<Vec<SourceItem>>> = Arc::new(Mutex::new(Vec::new()));
    let search_time_ms = Arc::new(AtomicU64::new(0));
    let total_time_ms = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicBool::new(false));
    let resuming = session_id.is_some();

    let sources_slot = sources.clone();
    let search_time_slot = search_time_ms.clone();
    let total_time_slot = total_time_ms.clone();
    let failed_slot = failed.clone();

    let mut callbacks = StreamCallbacks {
        on_status: Some(Box::new(|status: &str| {
            eprintln!("[{}]", status);
        })),
        on_session: Some(Box::new(move |id: &str| {
            if !resuming {
                eprintln!("session: {}", id);
            }
        })),
        on_sources: Some(Box::new(move |payload| {
            search_time_slot.store(payload.search_time_ms, Ordering::SeqCst);
            if let Ok(mut slot) = sources_slot.lock() {
                *slot = payload.items;
            }
        })),
        on_token: Some(Box::new(|token: &str| {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let _ = write!(out, "{}", token);
            let _ = out.flush();
        })),
        on_done: Some(Box::new(move |payload| {
            total_time_slot.store(payload.total_time_ms, Ordering::SeqCst);
        })),
        on_error: Some(Box::new(move |error: &str| {
            failed_slot.store(true, Ordering::SeqCst);
            eprintln!("Server error: {}", error);
        })),
    };

    let cancel = CancellationToken::new();
    if let Err(e) = client
        .search_stream(question, session_id, &cancel, &mut callbacks)
        .await
    {
        eprintln!("Error: query failed: {}", e);
        process::exit(1);
    }

    if failed.load(Ordering::SeqCst) {
        process::exit(1);
    }

    // Newline after the answer text.
    println!();
    let sources = sources.lock().map(|s| s.clone()).unwrap_or_default();
    if !sources.is_empty() {
        println!("\nSources:");
        for source in &sources {
            println!("  {} — {} ({:.2})", source.title, source.url, source.score);
        }
    }
    let search = search_time_ms.load(Ordering::SeqCst);
    let total = total_time_ms.load(Ordering::SeqCst);
    if total > 0 {
        println!("\n(searched in {}ms, total {}ms)", search, total);
    }
}
