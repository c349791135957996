//! Prerender server: entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use url::Url;

use prerender::{render, should_prerender, ChromiumRenderer, Prerender, RequestInfo};
use prerender_server::config::load_config;
use prerender_server::logging::{init_tracing, LogFormat};
use prerender_server::server;

#[derive(Parser)]
#[command(
    name = "prerender-server",
    about = "Serve a single-page app, answering crawlers with headless-browser snapshots",
    version
)]
struct Cli {
    /// Path to prerender.toml (also reads PRERENDER_CONFIG).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a static directory with prerendering in front (default).
    Serve {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,

        /// Directory containing the built application (index.html fallback).
        #[arg(long, default_value = "dist")]
        root: PathBuf,
    },

    /// Show whether a request would be prerendered.
    Classify {
        /// Absolute request URL.
        url: String,

        /// User-Agent header value.
        #[arg(long)]
        user_agent: Option<String>,

        /// Referer header value.
        #[arg(long)]
        referer: Option<String>,

        /// Print the decision as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render a URL once and print the snapshot.
    Render {
        /// Absolute URL to render.
        url: String,
    },

    /// Load and compile the configuration, then report it.
    CheckConfig,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_format);

    match cli.command.unwrap_or(Commands::Serve {
        addr: "127.0.0.1:8080".to_string(),
        root: PathBuf::from("dist"),
    }) {
        Commands::Serve { addr, root } => {
            if !root.is_dir() {
                bail!("application root {} is not a directory", root.display());
            }
            let (config, path) = load_config(cli.config.as_deref())?;
            match &path {
                Some(path) => tracing::info!("Config: {}", path.display()),
                None => tracing::info!("Config: built-in defaults"),
            }
            tracing::info!("Root: {}", root.display());

            let renderer = server::build_renderer(&config);
            let prerender = Arc::new(Prerender::new(Arc::new(config), renderer));
            let app = server::router(prerender, &root);
            server::run(&addr, app).await?;
        }

        Commands::Classify {
            url,
            user_agent,
            referer,
            json,
        } => {
            let (config, _) = load_config(cli.config.as_deref())?;
            let url = Url::parse(&url).with_context(|| format!("invalid URL '{url}'"))?;
            let request = RequestInfo {
                url,
                user_agent,
                referer,
            };
            let decision = should_prerender(&request, &config);
            if json {
                let out = serde_json::json!({
                    "url": request.url.as_str(),
                    "user_agent": request.user_agent,
                    "referer": request.referer,
                    "prerender": decision,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{decision}");
            }
        }

        Commands::Render { url } => {
            let (config, _) = load_config(cli.config.as_deref())?;
            let url = Url::parse(&url).with_context(|| format!("invalid URL '{url}'"))?;
            let renderer = ChromiumRenderer::new(&config)?;
            let result = render(&renderer, &url, config.timeouts()).await;
            eprintln!("Status: {}", result.status);
            for (key, value) in &result.headers {
                eprintln!("{key}: {value}");
            }
            println!("{}", result.body);
            if !result.is_success() {
                std::process::exit(1);
            }
        }

        Commands::CheckConfig => match load_config(cli.config.as_deref()) {
            Ok((config, path)) => {
                match path {
                    Some(path) => println!("Valid config: {}", path.display()),
                    None => println!("No config file found; using defaults"),
                }
                println!("  Blacklist patterns: {}", config.blacklist_len());
                println!("  Whitelist patterns: {}", config.whitelist_len());
                println!("  Crawler user agents: {}", config.crawler_user_agents().len());
                println!("  Ignored extensions: {}", config.extensions_to_ignore().len());
                println!("  Page load timeout: {:?}", config.timeouts().page_load);
                println!("  Settle delay: {:?}", config.timeouts().settle);
                if let Some(proxy) = config.proxy() {
                    println!("  Proxy: {}", proxy.server_arg());
                }
            }
            Err(e) => {
                eprintln!("Invalid config: {e:#}");
                std::process::exit(1);
            }
        },

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "prerender-server", &mut std::io::stdout());
        }
    }

    Ok(())
}
