use crate::gateway::{DEFAULT_API_BASE, DEFAULT_RAW_HOST};
use crate::query::SortKey;
use crate::record::RiskLevel;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aquavault")]
#[command(about = "A CLI catalog of marine species with images hosted on GitHub")]
#[command(version = "1.0")]
pub(crate) struct Args {
    /// Directory holding the saved catalog and settings
    #[arg(short = 'D', long, env = "AQUAVAULT_DATA_DIR", default_value = ".aquavault", global = true)]
    pub data_dir: PathBuf,

    /// GitHub token for this run, instead of the saved one
    #[arg(long, env = "AQUAVAULT_GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Base URL of the GitHub REST API
    #[arg(long, default_value = DEFAULT_API_BASE, global = true)]
    pub api_base: String,

    /// Host serving raw file contents
    #[arg(long, default_value = DEFAULT_RAW_HOST, global = true)]
    pub raw_host: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search, filter and sort the catalog
    List(ListArgs),
    /// Show every field of one species
    Show {
        id: i64,
        /// Print only the image URL (a placeholder when there is no image)
        #[arg(long)]
        image_url: bool,
    },
    /// Add a species
    Add(AddArgs),
    /// Change fields of a species
    Update(UpdateArgs),
    /// Delete a species and its remote image
    Delete { id: i64 },
    /// Replace the catalog with a JSON export
    Import { file: PathBuf },
    /// Write the catalog to stdout or a file
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,
    },
    /// Upload every image in a directory named after a species
    AttachImages { dir: PathBuf },
    /// Upload the site logo
    Logo { file: PathBuf },
    /// Remote image repository settings
    #[command(subcommand)]
    Config(ConfigCommand),
    /// The free-text "about" note
    #[command(subcommand)]
    About(AboutCommand),
}

#[derive(clap::Args)]
pub(crate) struct ListArgs {
    /// Text to look for in common and scientific names
    #[arg(short, long, default_value = "")]
    pub search: String,

    #[arg(short, long, value_enum)]
    pub risk: Option<RiskLevel>,

    #[arg(long, value_enum)]
    pub sort: Option<SortKey>,

    /// Print matching records as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Default)]
pub(crate) struct TextFields {
    #[arg(long)]
    pub characteristics: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub habitat: Option<String>,
    #[arg(long)]
    pub diet: Option<String>,
    #[arg(long)]
    pub risk_details: Option<String>,
    #[arg(long)]
    pub ecological_role: Option<String>,
}

#[derive(clap::Args)]
pub(crate) struct AddArgs {
    #[arg(short, long)]
    pub name: String,

    #[arg(long)]
    pub scientific_name: String,

    #[arg(short, long, value_enum)]
    pub risk: RiskLevel,

    /// Image file; its name must be the species name
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Audio clip embedded in the record
    #[arg(short, long)]
    pub audio: Option<PathBuf>,

    #[command(flatten)]
    pub text: TextFields,
}

#[derive(clap::Args)]
pub(crate) struct UpdateArgs {
    pub id: i64,

    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(long)]
    pub scientific_name: Option<String>,

    #[arg(short, long, value_enum)]
    pub risk: Option<RiskLevel>,

    #[arg(short, long)]
    pub image: Option<PathBuf>,

    #[arg(short, long)]
    pub audio: Option<PathBuf>,

    #[command(flatten)]
    pub text: TextFields,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ExportFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommand {
    /// Print the current settings, token masked
    Show,
    /// Change and save settings; omitted values are kept
    Set {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        /// Token to save (use "" to clear)
        #[arg(long)]
        save_token: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum AboutCommand {
    Show,
    Set {
        text: Option<String>,
        /// Read the note from a file instead
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
}
