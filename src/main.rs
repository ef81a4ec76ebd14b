//! Plify CLI - extract discussions and stream their summaries
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{Input, Password};
use futures::StreamExt;
use plify::{
    page, prompt, ui, Config, ContentService, ContentServiceFactory, LocalTabs, Page, Profile,
    ProviderType, SettingsStore, SummaryService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plify")]
#[command(author, version, about = "Summarise Reddit, YouTube and Hacker News discussions with an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the post and comments of a page
    Extract {
        /// Page URL
        url: String,
        /// Read the page from a saved HTML file instead of fetching it
        #[arg(long)]
        html: Option<PathBuf>,
        /// Print the content as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract a page and stream its summary
    Summarise {
        /// Page URL
        url: String,
        /// Read the page from a saved HTML file instead of fetching it
        #[arg(long)]
        html: Option<PathBuf>,
        /// Stored prompt to use, by command (e.g. /summarize)
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Count the comments a user wrote on a page
    Highlight {
        /// Page URL
        url: String,
        /// Username to look for
        username: String,
        /// Read the page from a saved HTML file instead of fetching it
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Manage LLM provider profiles
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
    /// Show or set the summary language
    Language {
        /// Language code, e.g. en, zh-CN, ja
        code: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// List profiles; the first is the default
    List,
    /// Add a profile (the API key is prompted for)
    Add {
        /// Profile name
        name: String,
        /// Provider type: oai_compatible, openai, anthropic, gemini, lmstudio
        #[arg(long, default_value = "openai")]
        provider: String,
        /// Model name
        #[arg(long)]
        model: String,
        /// API endpoint; defaults to the provider's
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, default_value_t = plify::profile::DEFAULT_TEMPERATURE)]
        temperature: f32,
    },
    /// Remove the profile at an index
    Remove { index: usize },
    /// Make the profile at an index the default
    Top { index: usize },
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("loading plify.toml")?;
    init_tracing(&config.log.level);

    let store = SettingsStore::open(&config.storage.path)
        .with_context(|| format!("opening settings at {}", config.storage.path.display()))?;

    match cli.command {
        Commands::Extract { url, html, json } => {
            let service = open_service(&config, &store, &url, html).await?;
            let data = service.extract_data().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                ui::print_content(&mut std::io::stdout(), &data)?;
            }
        }
        Commands::Summarise { url, html, prompt } => {
            let template = match prompt {
                Some(command) => match store.find_prompt(&command)? {
                    Some(stored) => Some(stored.content),
                    None => bail!("no stored prompt named {command}"),
                },
                None => None,
            };

            let service = Arc::new(open_service(&config, &store, &url, html).await?);
            let data = service.extract_data().await?;
            println!("{} {}\n", "Summarising".bold(), data.title.as_deref().unwrap_or(&url));

            let mut stream = service.summarize_data(&data, template.as_deref()).await?;

            // Ctrl-C stops the registered stream; repeated presses are no-ops.
            let stopper = service.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    stopper.stop_summarization();
                }
            });

            let mut printer = ui::SummaryPrinter::new(std::io::stdout());
            while let Some(fragment) = stream.next().await {
                printer.render(&fragment?)?;
            }
            let stopped = stream.state() == plify::stream::StreamState::Cancelled;
            printer.finish(stopped)?;
        }
        Commands::Highlight {
            url,
            username,
            html,
        } => {
            let service = open_service(&config, &store, &url, html).await?;
            let matched = service.highlight_user_comments(&username).await?;
            println!("Found {} comment(s) by {}", matched, username.green());
        }
        Commands::Profile { action } => manage_profiles(&store, action)?,
        Commands::Language { code } => match code {
            Some(code) => {
                if !prompt::is_supported_language(&code) {
                    let known: Vec<&str> = prompt::LANGUAGES.iter().map(|(c, _)| *c).collect();
                    bail!("unsupported language {code}; choose one of {}", known.join(", "));
                }
                store.set_language(&code)?;
                println!("Summary language set to {code}");
            }
            None => println!("{}", store.language()?),
        },
    }

    Ok(())
}

/// Load the page into a local tab and pick the content service for it.
async fn open_service(
    config: &Config,
    store: &SettingsStore,
    url: &str,
    html: Option<PathBuf>,
) -> anyhow::Result<ContentService> {
    let client = page::http_client(&config.http)?;
    let page: Page = match html {
        Some(path) => page::read_page(url, &path)?,
        None => page::fetch_page(&client, url).await?,
    };
    debug!(url, bytes = page.html.len(), "page loaded");

    let tabs = Arc::new(LocalTabs::new());
    tabs.open(page);

    let summary = Arc::new(SummaryService::new(client, store.clone()));
    let factory = ContentServiceFactory::new(tabs, summary, &config.bridge);
    let service = factory.for_active_tab().await?;
    info!(site = %service.site(), "content service ready");
    Ok(service)
}

fn manage_profiles(store: &SettingsStore, action: ProfileCommand) -> anyhow::Result<()> {
    match action {
        ProfileCommand::List => ui::print_profiles(&mut std::io::stdout(), &store.profiles()?)?,
        ProfileCommand::Add {
            name,
            provider,
            model,
            endpoint,
            temperature,
        } => {
            let provider_type = ProviderType::from_key(&provider);
            let endpoint = match endpoint {
                Some(endpoint) => endpoint,
                None => {
                    let default = provider_type.map(|p| p.default_endpoint()).unwrap_or_default();
                    Input::<String>::new()
                        .with_prompt("API endpoint")
                        .with_initial_text(default)
                        .interact_text()?
                }
            };
            let api_key = Password::new().with_prompt("API key").interact()?;
            let stored = store.add_profile(Profile {
                index: 0,
                profile_name: name,
                provider_type: provider,
                api_endpoint: endpoint,
                api_key,
                model_name: model,
                temperature,
            })?;
            println!("Added profile [{}] {}", stored.index, stored.profile_name);
        }
        ProfileCommand::Remove { index } => {
            let removed = store.remove_profile(index)?;
            println!("Removed profile {}", removed.profile_name);
        }
        ProfileCommand::Top { index } => {
            store.move_to_top(index)?;
            println!("Profile {index} is now the default");
        }
    }
    Ok(())
}
