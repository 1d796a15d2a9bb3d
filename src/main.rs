use anyhow::{Context as _, Result};
use bibget::bibtex::{bibliography_to_string, parse_bibliography};
use bibget::blg;
use bibget::config::{default_config_path, ConfigStore, Settings};
use bibget::models::{classify, Kind};
use bibget::resolver::{Prompter, Resolver, TerminalPrompter, Updater};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SCOPUS_REGISTER_URL: &str = "https://dev.elsevier.com/";

/// bibget - Retrieve BibTeX citations from MathSciNet, Crossref, Scopus, arXiv and PubMed
#[derive(clap::Parser, Debug)]
#[command(name = "bibget")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Retrieve BibTeX citations from MathSciNet, Crossref, Scopus, arXiv and PubMed", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv, -vvv)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress everything but errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not query MathSciNet for DOIs
    #[arg(long, global = true)]
    no_mathscinet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Retrieve entries for citation keys
    #[command(alias = "g")]
    Get {
        /// MathSciNet (MRxxxxx), arXiv (xxxx.xxxxx), PubMed (PMID:xxxxxxxx) or DOI (10.xxx/xxxxx) keys
        #[arg(required = true, value_name = "CITEKEYS")]
        keys: Vec<String>,

        /// Append output to this file instead of writing to stdout
        #[arg(long, short)]
        write: Option<PathBuf>,
    },

    /// Retrieve the entries a BibTeX/Biber run reported as missing
    #[command(alias = "p")]
    Parse {
        /// Base name of the main .tex file (reads <BASENAME>.blg)
        basename: String,

        /// Append output to a .bib file; without a value, the first database
        /// file named in the log is used
        #[arg(long, short, num_args = 0..=1, default_missing_value = "")]
        write: Option<String>,
    },

    /// Offer canonical replacements for the entries of a .bib file
    #[command(alias = "u")]
    Update {
        /// The .bib file to update
        bibfile: PathBuf,

        /// Write the updated bibliography here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Inspect or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Store the Scopus API key
    SetApiKey {
        /// Elsevier API key (empty to disable Scopus)
        key: String,
    },
}

fn init_logging(cli: &Cli, settings: &Settings) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => settings.logging.level.as_str(),
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("warn,bibget={}", level))),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
}

/// Keys in first-occurrence order, without repeats
fn dedup_keys(keys: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.trim();
        if !key.is_empty() && !unique.iter().any(|k| k == key) {
            unique.push(key.to_string());
        }
    }
    unique
}

/// Ask for a Scopus key once, the first time DOI or PubMed keys are resolved
fn first_run_setup(store: &ConfigStore, keys: &[String], prompter: &dyn Prompter) -> Result<()> {
    if store.exists() || !keys.iter().any(|k| matches!(classify(k), Kind::Doi | Kind::PubMed)) {
        return Ok(());
    }
    let message = format!(
        "Scopus can result in more reliable results than crossref.org, but requires an API key. \
         If you want to use Scopus, please register at {} and enter your API key below. \
         If you don't want to use Scopus, just press [enter]. \
         You can also enter your API key later in {}\n",
        SCOPUS_REGISTER_URL,
        store.path().display()
    );
    let key = prompter.ask(&message).unwrap_or_default();
    store
        .set_api_key(&key)
        .with_context(|| format!("Failed to write {}", store.path().display()))
}

/// Require a Scopus key, asking until one is given
fn require_api_key(store: &ConfigStore, prompter: &dyn Prompter) -> Result<()> {
    while store.get_api_key().is_none() {
        let message = format!(
            "Scopus is required for 'bibget update' and requires an API key. \
             Please register at {} and enter your API key below.\n",
            SCOPUS_REGISTER_URL
        );
        let key = prompter
            .ask(&message)
            .context("A Scopus API key is required for updating")?;
        store
            .set_api_key(&key)
            .with_context(|| format!("Failed to write {}", store.path().display()))?;
    }
    Ok(())
}

fn load_settings(store: &ConfigStore, no_mathscinet: bool) -> Result<Settings> {
    let mut settings = store
        .load()
        .with_context(|| format!("Failed to load {}", store.path().display()))?;
    if no_mathscinet {
        settings.sources.mathscinet = false;
    }
    Ok(settings)
}

async fn get_citations(
    keys: &[String],
    file: Option<&Path>,
    store: &ConfigStore,
    no_mathscinet: bool,
) -> Result<()> {
    let keys = dedup_keys(keys);
    first_run_setup(store, &keys, &TerminalPrompter)?;
    let settings = load_settings(store, no_mathscinet)?;
    let resolver = Resolver::from_settings(&settings)?;

    let mut entries = Vec::new();
    for (_, outcome) in resolver.resolve_many(&keys).await {
        match outcome {
            Ok(entry) => entries.push(entry),
            Err(err) => tracing::error!("{}", err),
        }
    }

    let text = bibliography_to_string(&entries);
    match file {
        Some(path) => {
            let mut out = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            out.write_all(text.as_bytes())?;
            println!(
                "Successfully appended {} BibTeX entries to {}.",
                entries.len(),
                path.display()
            );
        }
        None => println!("\n{}", text),
    }
    Ok(())
}

async fn parse_log(
    basename: &str,
    write: Option<String>,
    store: &ConfigStore,
    no_mathscinet: bool,
) -> Result<()> {
    let blg_path = PathBuf::from(format!("{}.blg", basename));
    let log = std::fs::read_to_string(&blg_path)
        .with_context(|| format!("Failed to read {}", blg_path.display()))?;
    let report = blg::scan(&log);

    if report.missing_citations.is_empty() {
        println!(
            "No missing citations found. Make sure that biber/bibtex is run successfully before running bibget."
        );
        return Ok(());
    }

    let file = match write.as_deref() {
        None => None,
        Some("") => match report.primary_database() {
            Some(db) => Some(PathBuf::from(db)),
            None => {
                println!("No .bib file found. Please specify the .bib file via '-w file_name.bib'");
                return Ok(());
            }
        },
        Some(path) => Some(PathBuf::from(path)),
    };

    get_citations(
        &report.missing_citations,
        file.as_deref(),
        store,
        no_mathscinet,
    )
    .await
}

async fn update_bibliography(
    bibfile: &Path,
    output: Option<&Path>,
    store: &ConfigStore,
    no_mathscinet: bool,
) -> Result<()> {
    let source = std::fs::read_to_string(bibfile)
        .with_context(|| format!("Failed to read {}", bibfile.display()))?;
    let entries = parse_bibliography(&source)
        .with_context(|| format!("Failed to parse {}", bibfile.display()))?;

    require_api_key(store, &TerminalPrompter)?;
    let settings = load_settings(store, no_mathscinet)?;
    let resolver = Resolver::from_settings(&settings)?;

    let updated = Updater::new(&resolver, TerminalPrompter)
        .update_all(entries)
        .await;
    let text = bibliography_to_string(&updated);

    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", text),
    }
    Ok(())
}

fn run_config(action: ConfigAction, store: &ConfigStore) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = store.load()?;
            println!("{}", toml::to_string_pretty(&settings)?);
        }
        ConfigAction::Path => println!("{}", store.path().display()),
        ConfigAction::SetApiKey { key } => {
            store.set_api_key(&key)?;
            println!("Saved Scopus API key to {}", store.path().display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = <Cli as clap::Parser>::parse();

    let store = ConfigStore::new(cli.config.clone().unwrap_or_else(default_config_path));
    // A broken config file is reported by the command itself.
    init_logging(&cli, &store.load().unwrap_or_default());
    tracing::debug!("Using config file: {}", store.path().display());

    match cli.command {
        Commands::Get { keys, write } => {
            get_citations(&keys, write.as_deref(), &store, cli.no_mathscinet).await
        }
        Commands::Parse { basename, write } => {
            parse_log(&basename, write, &store, cli.no_mathscinet).await
        }
        Commands::Update { bibfile, output } => {
            update_bibliography(&bibfile, output.as_deref(), &store, cli.no_mathscinet).await
        }
        Commands::Config { action } => run_config(action, &store),
    }
}
