use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::agent::react::{AgentLimits, AgentRun, ReactAgent};
use crate::agent::transcript::render_readable;
use crate::clients::chat_completions::ChatCompletionsBackend;
use crate::clients::session::{ClientSession, SessionOptions};
use crate::core::tool::{InputSchema, ResultMode};
use crate::infra::config::{ClientConfig, ServerConfig};
use crate::infra::runtime::limits::make_http_client;
use crate::tools::proxy::load_remote_tools;

pub const DEFAULT_QUERY: &str = "what's (3 + 5) x 12? and what is 3789 + 2442?";

#[derive(Parser)]
#[command(name = "stateless-mcp-gateway")]
#[command(about = "Stateless MCP tool server and reasoning-loop client")]
#[command(version)]
pub struct Cli {
    /// DEBUG, INFO, WARNING, ERROR or CRITICAL (RUST_LOG wins when set)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the MCP endpoint over streamable HTTP
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
        /// Answer with application/json instead of an event stream
        #[arg(long)]
        json_response: bool,
    },
    /// Ask a question; the model may call the server's tools to answer it
    Ask {
        /// The question
        #[arg(default_value = DEFAULT_QUERY)]
        query: String,
        /// MCP endpoint (overrides config)
        #[arg(short, long)]
        url: Option<String>,
        /// Print the conversation instead of the raw JSON transcript
        #[arg(long)]
        readable: bool,
        /// TOML client config
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List the tools a server advertises
    Tools {
        /// MCP endpoint (overrides config)
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Check /healthz and an MCP ping
    Health {
        /// MCP endpoint (overrides config)
        #[arg(short, long)]
        url: Option<String>,
    },
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    run_commands(cli.command, cli.log_level).await
}

pub async fn run_commands(command: Commands, log_level: Option<String>) -> ExitCode {
    match command {
        Commands::Serve { port, json_response } => {
            let mut cfg = ServerConfig::from_env();
            if let Some(port) = port {
                cfg.port = port;
            }
            if let Some(level) = log_level {
                cfg.log_level = level;
            }
            cfg.json_response |= json_response;
            crate::infra::logging::init(&cfg.log_level);
            match crate::infra::boot::run_server(cfg).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("❌ Server failed: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Ask { query, url, readable, config } => {
            crate::infra::logging::init(log_level.as_deref().unwrap_or("WARNING"));
            match ask(&query, url, config, readable).await {
                Ok(out) => {
                    println!("{out}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ Ask failed: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Tools { url } => {
            crate::infra::logging::init(log_level.as_deref().unwrap_or("WARNING"));
            match list_tools(url).await {
                Ok(out) => {
                    print!("{out}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ Listing tools failed: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Health { url } => {
            crate::infra::logging::init(log_level.as_deref().unwrap_or("WARNING"));
            match health_check(url).await {
                Ok(()) => {
                    println!("✅ Service is healthy");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ Health check failed: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn client_config(url: Option<String>, config: Option<PathBuf>) -> anyhow::Result<ClientConfig> {
    let mut cfg = ClientConfig::load(config.as_deref())?;
    if let Some(url) = url {
        cfg.mcp_url = url;
    }
    Ok(cfg)
}

async fn open_session(cfg: &ClientConfig) -> anyhow::Result<Arc<ClientSession>> {
    let options = SessionOptions { timeout: cfg.limits.request_timeout(), ..SessionOptions::default() };
    let session = ClientSession::connect(&cfg.mcp_url, options)?;
    session
        .initialize()
        .await
        .with_context(|| format!("cannot initialize MCP session at {}", cfg.mcp_url))?;
    Ok(Arc::new(session))
}

async fn ask(query: &str, url: Option<String>, config: Option<PathBuf>, readable: bool) -> anyhow::Result<String> {
    let cfg = client_config(url, config)?;
    let session = open_session(&cfg).await?;
    let outcome = run_agent(&cfg, session.clone(), query).await;
    session.close().await;
    let run = outcome?;
    if readable {
        Ok(render_readable(query, &run))
    } else {
        Ok(serde_json::to_string_pretty(&run)?)
    }
}

async fn run_agent(cfg: &ClientConfig, session: Arc<ClientSession>, query: &str) -> anyhow::Result<AgentRun> {
    let tools = load_remote_tools(session, ResultMode::Text).await?;
    let backend = ChatCompletionsBackend::new(make_http_client(cfg.limits.request_timeout())?, &cfg.llm);
    let agent = ReactAgent::new(Arc::new(backend), tools, AgentLimits::from(&cfg.limits));
    Ok(agent.run(query).await?)
}

async fn list_tools(url: Option<String>) -> anyhow::Result<String> {
    let cfg = client_config(url, None)?;
    let session = open_session(&cfg).await?;
    let tools = session.list_tools().await;
    session.close().await;
    let mut out = String::new();
    for t in tools? {
        let schema = InputSchema::of(&t);
        let params: Vec<String> = schema
            .properties
            .keys()
            .map(|k| if schema.is_required(k) { k.clone() } else { format!("{k}?") })
            .collect();
        let description = t.description.as_deref().unwrap_or("");
        out.push_str(&format!("{}({}): {}\n", t.name, params.join(", "), description));
    }
    Ok(out)
}

async fn health_check(url: Option<String>) -> anyhow::Result<()> {
    let cfg = client_config(url, None)?;
    let endpoint = reqwest::Url::parse(&cfg.mcp_url).with_context(|| format!("invalid URL {}", cfg.mcp_url))?;
    let healthz = endpoint.join("/healthz")?;
    let response = make_http_client(std::time::Duration::from_secs(2))?
        .get(healthz)
        .send()
        .await?;
    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }
    let session = open_session(&cfg).await?;
    let ping = session.ping().await;
    session.close().await;
    Ok(ping?)
}
