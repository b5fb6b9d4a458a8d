//! analyst-cli: terminal frontend for the Analyst HTTP server
//!
//! # Subcommands
//! - `ask <question> [--json] [--session <uuid>]`: one question, one answer
//! - `chat`                                        : interactive session, `exit` quits
//! - `status`                                      : show server health
//! - `schema`                                      : print the database schema

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8765";

/// Pipeline runs include model calls; give them room.
const ASK_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "analyst-cli",
    version,
    about = "Ask questions about your tabular data from the terminal"
)]
struct Cli {
    /// Analyst HTTP server URL (overrides ANALYST_HTTP_URL env var)
    #[arg(long, env = "ANALYST_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question, e.g. "Show total sales by region"
        question: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,

        /// Continue an existing conversation
        #[arg(long)]
        session: Option<Uuid>,
    },

    /// Interactive question loop; type `exit` to quit
    Chat,

    /// Show Analyst server status
    Status,

    /// Print the database schema
    Schema,
}

// ============================================================================
// API Response Types
// ============================================================================

/// The answer returned by POST /ask
#[derive(Debug, Deserialize)]
pub struct AskReply {
    pub session_id: Option<Uuid>,
    pub answer: String,
    pub route: String,
    pub sql_query: Option<String>,
    #[serde(default)]
    pub row_count: usize,
    pub chart_url: Option<String>,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
    #[serde(default)]
    pub warnings: BTreeMap<String, String>,
    #[serde(default)]
    pub step_times: BTreeMap<String, f64>,
    #[serde(default)]
    pub total_ms: f64,
}

/// Running totals for a `chat` session.
#[derive(Debug)]
pub struct SessionStats {
    started: Instant,
    questions: usize,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            questions: 0,
        }
    }

    pub fn record_question(&mut self) {
        self.questions += 1;
    }

    pub fn report(&self) -> String {
        format_session_stats(self.started.elapsed(), self.questions)
    }
}

// ============================================================================
// Formatting
// ============================================================================

pub fn format_session_stats(elapsed: Duration, questions: usize) -> String {
    let secs = elapsed.as_secs_f64();
    let mut out = format!(
        "Session Statistics:\nTotal time: {:.2}s\nQuestions processed: {}",
        secs, questions
    );
    if questions > 0 {
        out.push_str(&format!(
            "\nAverage time per question: {:.2}s",
            secs / questions as f64
        ));
    }
    out
}

/// Per-step timings, slowest first, `total_elapsed` last.
pub fn format_step_times(step_times: &BTreeMap<String, f64>) -> String {
    let mut steps: Vec<(&String, &f64)> = step_times
        .iter()
        .filter(|(name, _)| name.as_str() != "total_elapsed")
        .collect();
    steps.sort_by(|a, b| b.1.total_cmp(a.1));

    let mut out = String::from("Performance Summary:");
    for (name, ms) in steps {
        out.push_str(&format!("\n  - {}: {:.3}s", name, ms / 1000.0));
    }
    if let Some(total) = step_times.get("total_elapsed") {
        out.push_str(&format!("\n  - total_elapsed: {:.3}s", total / 1000.0));
    }
    out
}

/// Human-readable rendering of an answer. The server's `answer` text already
/// lists errors, SQL and rows; this adds the chart link and warnings.
pub fn format_reply(reply: &AskReply, server: &str) -> String {
    let mut out = format!(
        "--- Answer via {} (processed in {:.2}s) ---\n{}",
        reply.route,
        reply.total_ms / 1000.0,
        reply.answer
    );
    if let Some(url) = &reply.chart_url {
        out.push_str(&format!("\nChart: {}{}", server, url));
    }
    for (key, message) in &reply.warnings {
        out.push_str(&format!("\nNote ({}): {}", key, message));
    }
    if !reply.step_times.is_empty() {
        out.push_str("\n\n");
        out.push_str(&format_step_times(&reply.step_times));
    }
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout: Duration) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder().timeout(timeout).build()?)
}

/// POST /ask and decode the answer. Connection and HTTP errors come back as
/// `Err` with a printable message.
fn post_question(
    client: &reqwest::blocking::Client,
    server: &str,
    question: &str,
    session: Option<Uuid>,
) -> anyhow::Result<serde_json::Value> {
    let url = format!("{}/ask", server);
    let body = serde_json::json!({
        "question": question,
        "session_id": session,
    });

    let resp = client
        .post(&url)
        .json(&body)
        .send()
        .map_err(|e| anyhow::anyhow!("connection failed to {}: {}", url, e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        anyhow::bail!("server returned {}: {}", status, body);
    }

    Ok(resp.json()?)
}

fn do_ask(server: &str, question: &str, json_output: bool, session: Option<Uuid>) -> anyhow::Result<()> {
    let client = client(ASK_TIMEOUT)?;
    let raw = match post_question(&client, server, question, session) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("analyst-cli: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let reply: AskReply = serde_json::from_value(raw)?;
    println!("{}", format_reply(&reply, server));
    if !reply.errors.is_empty() {
        std::process::exit(2);
    }
    Ok(())
}

fn do_chat(server: &str) -> anyhow::Result<()> {
    let client = client(ASK_TIMEOUT)?;
    let mut stats = SessionStats::new();
    let mut session: Option<Uuid> = None;

    println!("--- Analyst is ready. Ask a question or type 'exit' to quit. ---");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\nYour question: ");
        std::io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            // EOF ends the session like `exit`
            None => String::from("exit"),
        };
        let question = line.trim();

        if question.eq_ignore_ascii_case("exit") {
            println!("\n{}", stats.report());
            println!("Exiting.");
            return Ok(());
        }
        if question.is_empty() {
            println!("Please enter a question.");
            continue;
        }

        stats.record_question();
        match post_question(&client, server, question, session) {
            Ok(raw) => match serde_json::from_value::<AskReply>(raw) {
                Ok(reply) => {
                    session = reply.session_id.or(session);
                    println!("\n{}", format_reply(&reply, server));
                }
                Err(e) => eprintln!("ERROR: unexpected response: {}", e),
            },
            Err(e) => {
                eprintln!("ERROR: {}", e);
                eprintln!("Please try again with a different question.");
            }
        }
    }
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = client(Duration::from_secs(10))?;

    let url = format!("{}/health", server);
    let resp = client.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Analyst server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("SQLite:         {}", body["database"].as_str().unwrap_or("?"));
            println!(
                "Model:          {} via {} ({})",
                body["model"]["model"].as_str().unwrap_or("?"),
                body["model"]["backend"].as_str().unwrap_or("?"),
                if body["model"]["reachable"].as_bool().unwrap_or(false) {
                    "reachable"
                } else {
                    "unreachable"
                }
            );
            println!("Charts:         {}", body["chart_dir"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            let body: serde_json::Value = r.json().unwrap_or_default();
            eprintln!(
                "analyst-cli: server unhealthy (HTTP {}): {}",
                status,
                body["error"].as_str().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("analyst-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn do_schema(server: &str) -> anyhow::Result<()> {
    let client = client(Duration::from_secs(30))?;
    let url = format!("{}/schema", server);

    let resp = match client.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("analyst-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    };
    if !resp.status().is_success() {
        eprintln!("analyst-cli: server returned {}", resp.status());
        std::process::exit(1);
    }

    let body: serde_json::Value = resp.json()?;
    println!("{}", body["schema_text"].as_str().unwrap_or(""));
    if let Some(e) = body["error"].as_str() {
        eprintln!("analyst-cli: schema error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Ask {
            question,
            json,
            session,
        } => do_ask(&server, &question, json, session),
        Commands::Chat => do_chat(&server),
        Commands::Status => do_status(&server),
        Commands::Schema => do_schema(&server),
    };

    if let Err(e) = result {
        eprintln!("analyst-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
