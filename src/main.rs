mod agent;
mod cache;
mod config;
mod context;
mod ops;
mod providers;
mod security;
mod tools;
mod web;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use crate::agent::policy::Persona;
use crate::agent::{Agent, AgentInput, AgentSettings};
use crate::cache::{system_clock_ms, FileCache};
use crate::config::AppConfig;
use crate::context::RequestContext;
use crate::ops::OpsClient;
use crate::providers::ResponsesClient;
use crate::security::SystemResolver;
use crate::tools::web_research::WebResearch;
use crate::tools::{extract_enabled_tool_names, tools_for_context};
use crate::web::{BraveSearchClient, PageFetcher};

fn print_usage() {
    println!("agentd {}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
    println!("Usage: agentd [--persona default|ops] <question...>\n");
    println!("Options:");
    println!("  --persona <name>  Instruction profile (default: default)");
    println!("  -h, --help        Print help");
    println!("  -V, --version     Print version");
}

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") || args.is_empty() {
        print_usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("agentd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut persona = Persona::Default;
    if let Some(pos) = args.iter().position(|a| a == "--persona") {
        if pos + 1 >= args.len() {
            anyhow::bail!("--persona requires a value");
        }
        persona = Persona::parse(&args[pos + 1]);
        args.drain(pos..=pos + 1);
    }
    let question = args.join(" ");
    if question.trim().is_empty() {
        print_usage();
        return Ok(());
    }

    let config = AppConfig::load_or_default(&PathBuf::from("config.toml"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_once(config, persona, question))
}

/// Wire the components exactly once and run a single orchestration,
/// standing in for the chat-platform collaborator.
async fn run_once(config: AppConfig, persona: Persona, question: String) -> anyhow::Result<()> {
    let provider = Arc::new(ResponsesClient::new(
        &config.provider.base_url,
        &config.provider.api_key,
        &config.provider.model,
    ));

    let resolver = Arc::new(SystemResolver);
    let fetcher = Arc::new(PageFetcher::new(
        resolver,
        config.web.fetch_timeout_ms,
        config.web.fetch_max_bytes,
        config.web.max_redirects,
    ));
    let search = Arc::new(BraveSearchClient::new(
        &config.web.brave_base_url,
        &config.web.brave_api_key,
        config.web.fetch_timeout_ms,
    ));
    let web_research = WebResearch::new(
        search,
        fetcher,
        FileCache::new(&config.web.cache_dir),
        config.web.search_ttl_seconds,
        config.web.page_ttl_seconds,
        system_clock_ms(),
    );

    let ops = if config.ops_enabled() {
        Some(Arc::new(OpsClient::new(&config.ops)))
    } else {
        None
    };
    let allow_ops = ops.is_some() && persona == Persona::Ops;

    let agent = Agent::new(
        provider,
        web_research,
        ops,
        AgentSettings {
            assistant_name: config.assistant.name.clone(),
            model_name: config.provider.model.clone(),
            started_at: Utc::now(),
            max_loops: config.agent.max_loops,
            lm_timeout_ms: config.agent.lm_timeout_ms,
            max_output_tokens: config.agent.max_output_tokens,
            temperature: config.agent.temperature,
            ops_write_enabled: config.ops.enable_write_tools,
        },
    );

    let tools = tools_for_context(allow_ops, config.ops.enable_write_tools);
    let ctx = RequestContext::local(persona, extract_enabled_tool_names(&tools));

    let answer = agent
        .run(AgentInput::text(question), persona, tools, &ctx)
        .await?;
    println!("{answer}");
    Ok(())
}
