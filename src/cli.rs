//! # CLI Module
//!
//! Handles command-line argument parsing and dispatching for the `myutils`
//! binary. It uses the `clap` crate for parsing.

use crate::config::{resolve_api_key, LLMConfig};
use crate::llm::{get_llm_response_with, UnifiedClient};
use crate::utils::io::{add_to_jsonl, load_text};
use crate::utils::logger::{get_logger, LogSink, LoggerOptions};
use crate::utils::text::clean_json_identifier;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prompt to the model and print the answer
    Complete(CompleteArgs),
    /// Show the resolved model configuration
    ShowConfig(ShowConfigArgs),
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Prompt text; read from --prompt-file when omitted
    #[arg(index = 1)]
    pub prompt: Option<String>,
    #[arg(long, conflicts_with = "prompt")]
    pub prompt_file: Option<PathBuf>,
    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,
    #[arg(long, conflicts_with = "system")]
    pub system_file: Option<PathBuf>,
    #[arg(short, long)]
    pub provider: Option<String>,
    #[arg(short, long)]
    pub model: Option<String>,
    #[arg(short, long)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub base_url: Option<String>,
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Extra API parameter as key=value; the value is parsed as JSON when possible, `null` unsets it
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
    #[arg(long, default_value = "llm_config.json")]
    pub config_file: PathBuf,
    /// Extract the content of a ```json fenced block from the answer
    #[arg(long)]
    pub clean_json: bool,
    /// Append {prompt, response, model} to this JSONL file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Log retries to <log-dir>/<log-name>.log instead of stdout
    #[arg(long)]
    pub log_name: Option<String>,
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ShowConfigArgs {
    #[arg(long, default_value = "llm_config.json")]
    pub config_file: PathBuf,
}

/// Parses a `key=value` parameter. The value is read as JSON, falling back to
/// a plain string.
pub fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid parameter '{}': expected KEY=VALUE", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Invalid parameter '{}': empty key", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Loads the config file and applies the command-line overrides.
pub fn build_config(args: &CompleteArgs) -> Result<LLMConfig> {
    let mut config = LLMConfig::load(&args.config_file)?;
    if let Some(provider) = &args.provider {
        config.provider = provider.clone();
    }
    if let Some(model) = &args.model {
        config.model_name = model.clone();
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    let params = args
        .params
        .iter()
        .map(|raw| parse_param(raw))
        .collect::<Result<Vec<_>>>()?;
    config.update(params);
    Ok(config)
}

fn read_prompt(text: &Option<String>, file: &Option<PathBuf>) -> Result<Option<String>> {
    match (text, file) {
        (Some(text), _) => Ok(Some(text.clone())),
        (None, Some(path)) => load_text(path).map(Some),
        (None, None) => Ok(None),
    }
}

pub async fn handle_complete(args: CompleteArgs) -> Result<()> {
    let user_prompt = read_prompt(&args.prompt, &args.prompt_file)?
        .ok_or_else(|| anyhow!("No prompt given: pass PROMPT or --prompt-file"))?;
    let system_prompt = read_prompt(&args.system, &args.system_file)?.unwrap_or_default();

    let config = build_config(&args)?;
    info!("Using model {}", config.model());

    let api_key = resolve_api_key(&config.provider, args.api_key.clone()).ok_or_else(|| {
        anyhow!(
            "No API key found: pass --api-key or set UNIFIED_LLM_API_KEY / the provider's key variable"
        )
    })?;
    let client = UnifiedClient::new(&api_key, args.base_url.clone())?;

    let logger = match &args.log_name {
        Some(name) => Some(get_logger(
            name,
            LoggerOptions {
                log_dir: Some(args.log_dir.clone()),
                ..LoggerOptions::default()
            },
        )?),
        None => None,
    };
    let sink = logger.as_ref().map(|l| l as &dyn LogSink);

    let response = get_llm_response_with(&client, &user_prompt, &config, &system_prompt, sink)
        .await
        .map_err(|e| {
            error!("Completion failed: {}", e);
            anyhow::Error::new(e).context("Completion failed after all retries")
        })?;

    let response = if args.clean_json {
        clean_json_identifier(&response)
    } else {
        response
    };
    println!("{}", response);

    if let Some(output) = &args.output {
        add_to_jsonl(
            [json!({
                "prompt": user_prompt,
                "response": response,
                "model": config.model(),
            })],
            output,
        )
        .with_context(|| format!("Failed to record response in {}", output.display()))?;
        info!("Response appended to {}", output.display());
    }
    Ok(())
}

pub async fn handle_show_config(args: ShowConfigArgs) -> Result<()> {
    println!("Attempting to load config from: {}", args.config_file.display());
    let config = LLMConfig::load(&args.config_file)?;

    println!("\n--- Configuration ---");
    println!("Provider: {}", config.provider);
    println!("Model Name: {}", config.model_name);
    println!("Model Identifier: {}", config.model());
    println!("Max Retries: {}", config.max_retries);
    println!("API Params:");
    for (key, value) in config.get_api_params() {
        println!("  {}: {}", key, value);
    }
    println!(
        "API Key: {}",
        if resolve_api_key(&config.provider, None).is_some() {
            "Set"
        } else {
            "Not set"
        }
    );
    println!("--- End Configuration ---");
    Ok(())
}
