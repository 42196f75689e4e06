use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Days;
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::fanout::FailurePolicy;
use crate::model::work_item::WorkItem;
use crate::providers;
use crate::providers::azure_devops::DateWindow;
use crate::providers::completion::CompletionParameters;

const DEFAULT_DAYS: u32 = 10;
const DEFAULT_OUTPUT: &str = "work_items.json";

#[derive(Debug, PartialEq)]
pub struct ExtractArgs {
    pub start: Option<String>,
    pub days: u32,
    pub output: PathBuf,
}

#[derive(Debug, PartialEq)]
pub struct CompleteArgs {
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl CompleteArgs {
    fn parameters(&self) -> CompletionParameters {
        CompletionParameters {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    match args.get(i) {
        Some(v) => Ok(v.as_str()),
        None => bail!("Missing value for {flag}"),
    }
}

/// Parse `ado-extract extract` arguments.
///
/// Supported forms:
///   ado-extract extract
///   ado-extract extract --start 2024-03-18 --days 10
///   ado-extract extract -s 2024-03-18 -o march.json
pub fn parse_extract_args(args: &[String]) -> Result<ExtractArgs> {
    let mut parsed = ExtractArgs {
        start: None,
        days: DEFAULT_DAYS,
        output: PathBuf::from(DEFAULT_OUTPUT),
    };
    let mut i = 0;

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-s" | "--start" => {
                i += 1;
                parsed.start = Some(flag_value(args, i, flag)?.to_string());
            }
            "-d" | "--days" => {
                i += 1;
                let value = flag_value(args, i, flag)?;
                parsed.days = value
                    .parse()
                    .with_context(|| format!("Invalid number of days: {value}"))?;
                if parsed.days == 0 {
                    bail!("--days must be at least 1");
                }
            }
            "-o" | "--output" => {
                i += 1;
                parsed.output = PathBuf::from(flag_value(args, i, flag)?);
            }
            other => bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    Ok(parsed)
}

/// Parse `ado-extract complete` arguments into a prompt and sampling parameters.
pub fn parse_complete_args(args: &[String]) -> Result<CompleteArgs> {
    let defaults = CompletionParameters::default();
    let mut prompt_parts: Vec<String> = Vec::new();
    let mut parsed = CompleteArgs {
        prompt: String::new(),
        temperature: defaults.temperature,
        top_p: defaults.top_p,
        max_tokens: defaults.max_tokens,
    };
    let mut i = 0;

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--temperature" => {
                i += 1;
                let value = flag_value(args, i, flag)?;
                parsed.temperature = value
                    .parse()
                    .with_context(|| format!("Invalid temperature: {value}"))?;
            }
            "--top-p" => {
                i += 1;
                let value = flag_value(args, i, flag)?;
                parsed.top_p = value
                    .parse()
                    .with_context(|| format!("Invalid top-p: {value}"))?;
            }
            "--max-tokens" => {
                i += 1;
                let value = flag_value(args, i, flag)?;
                parsed.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max-tokens: {value}"))?;
            }
            _ => prompt_parts.push(args[i].clone()),
        }
        i += 1;
    }

    parsed.prompt = prompt_parts.join(" ");
    if parsed.prompt.trim().is_empty() {
        bail!("Usage: ado-extract complete <prompt> [--temperature F] [--top-p F] [--max-tokens N]");
    }
    Ok(parsed)
}

fn resolve_window(args: &ExtractArgs) -> Result<DateWindow> {
    let window = match &args.start {
        Some(start) => DateWindow::parse(start, args.days)?,
        None => {
            let today = chrono::Utc::now().date_naive();
            let start = today
                .checked_sub_days(Days::new(u64::from(args.days)))
                .context("Window start is out of range")?;
            DateWindow::new(start, args.days)?
        }
    };
    Ok(window)
}

fn write_items(path: &Path, items: &[WorkItem]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(items)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub async fn handle_extract(args: &[String]) -> Result<()> {
    let args = parse_extract_args(args)?;
    let window = resolve_window(&args)?;
    let config = config::load_config()?;

    let cancel = CancellationToken::new();
    let extractor = providers::create_extractor(&config)?.with_cancellation(cancel.clone());

    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling extraction");
            on_interrupt.cancel();
        }
    });

    let (items, failures) = match config.fan_out.failure_policy {
        FailurePolicy::AbortOnFirst => {
            let items = extractor.extract(&window).await.context("Extraction failed")?;
            (items, Vec::new())
        }
        FailurePolicy::CollectPartial => {
            let report = extractor
                .extract_report(&window)
                .await
                .context("Extraction failed")?;
            (report.items, report.failures)
        }
    };
    write_items(&args.output, &items)?;

    println!(
        "Wrote {} work items changed between {} and {} to {}",
        items.len(),
        window.start,
        window.end,
        args.output.display()
    );
    if !failures.is_empty() {
        println!("Skipped {} work items:", failures.len());
        for failure in &failures {
            println!("  {} ({}): {}", failure.item_id, failure.stage, failure.error);
        }
    }

    Ok(())
}

pub async fn handle_complete(args: &[String]) -> Result<()> {
    let args = parse_complete_args(args)?;
    let config = config::load_config()?;
    let client = providers::create_completion_client(&config)?;

    let completion = client
        .complete(&args.prompt, args.parameters())
        .await
        .context("Completion request failed")?;
    tracing::debug!(model = %completion.model, usage = %completion.usage, "completion received");
    println!("{}", completion.content);
    Ok(())
}

pub fn print_help() {
    println!("ado-extract: pull Azure DevOps work items with their comments\n");
    println!("USAGE:");
    println!("  ado-extract extract [options]    Extract work items changed in a date window");
    println!("  ado-extract complete <prompt>    Send one prompt to the completion endpoint");
    println!();
    println!("EXTRACT OPTIONS:");
    println!("  -s, --start <date>   First day of the window (YYYY-MM-DD). Default: today minus --days");
    println!("  -d, --days <n>       Length of the window in days. Default: {DEFAULT_DAYS}");
    println!("  -o, --output <path>  Where to write the JSON array. Default: {DEFAULT_OUTPUT}");
    println!();
    println!("COMPLETE OPTIONS:");
    println!("  --temperature <f>    Default: 0.7");
    println!("  --top-p <f>          Default: 0.95");
    println!("  --max-tokens <n>     Default: 2000");
    println!();
    println!("CONFIG:");
    println!("  ~/.ado-extract/config.toml, overridden by ADO_PERSONAL_ACCESS_TOKEN,");
    println!("  ADO_ORGANIZATION_URL, ADO_TEAM_PROJECT, AOAI_URL and AOAI_KEY");
}
