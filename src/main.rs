mod config;
mod error;
mod gateway;
mod parse;
mod query;
mod record;
mod repository;
mod store;
#[cfg(test)]
mod testing;
mod util;

use crate::config::RemoteHostConfig;
use crate::gateway::{ContentsApi, GithubContents, ImageGateway};
use crate::parse::{
    AboutCommand, AddArgs, Args, Command, ConfigCommand, ExportFormat, TextFields, UpdateArgs,
};
use crate::query::query;
use crate::record::{ImageFile, SpeciesDraft, SpeciesPatch, SpeciesRecord};
use crate::repository::SpeciesRepository;
use crate::store::{FileStore, KeyValueStore};
use crate::util::{print_hms, read_data_url};
use clap::Parser;
use log::debug;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::time::Instant;

type CliResult = Result<(), Box<dyn Error>>;

pub fn print_table(records: &[&SpeciesRecord], total: usize) {
    if records.is_empty() {
        println!("No species found. Try adjusting the search filters.");
        return;
    }

    for record in records {
        println!(
            "{:>14}  {:<28} {:<30} {}",
            record.id, record.name, record.scientific_name, record.risk_level
        );
    }
    println!("\nShowing {} of {} species", records.len(), total);
}

pub fn print_details(record: &SpeciesRecord) {
    println!("{} ({})", record.name, record.scientific_name);
    println!("Id: {}", record.id);
    println!("Risk level: {}", record.risk_level);
    println!("Image: {}", record.image.as_deref().unwrap_or("(placeholder)"));
    println!("Audio: {}", if record.audio.is_some() { "yes" } else { "no" });

    let sections = [
        ("Characteristics", &record.characteristics),
        ("Location", &record.location),
        ("Habitat", &record.habitat),
        ("Diet", &record.diet),
        ("Risk details", &record.risk_details),
        ("Ecological role", &record.ecological_role),
    ];
    for (title, text) in sections {
        println!("\n{}:\n  {}", title, text.as_deref().unwrap_or("—"));
    }
}

/// Count of records per risk level, most threatened first.
pub fn risk_summary(records: &[SpeciesRecord]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<(std::cmp::Reverse<u8>, &str), usize> = BTreeMap::new();
    for record in records {
        let level = record.risk_level;
        *counts
            .entry((std::cmp::Reverse(level.severity()), level.label()))
            .or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|((_, label), count)| (label.to_string(), count))
        .collect()
}

fn read_image(path: Option<&Path>) -> std::io::Result<Option<ImageFile>> {
    path.map(ImageFile::from_path).transpose()
}

fn read_audio(path: Option<&Path>) -> std::io::Result<Option<String>> {
    path.map(read_data_url).transpose()
}

pub(crate) fn draft_from(args: &AddArgs) -> std::io::Result<SpeciesDraft> {
    let TextFields {
        characteristics,
        location,
        habitat,
        diet,
        risk_details,
        ecological_role,
    } = &args.text;
    Ok(SpeciesDraft {
        name: args.name.clone(),
        scientific_name: args.scientific_name.clone(),
        risk_level: Some(args.risk),
        audio: read_audio(args.audio.as_deref())?,
        characteristics: characteristics.clone(),
        location: location.clone(),
        habitat: habitat.clone(),
        diet: diet.clone(),
        risk_details: risk_details.clone(),
        ecological_role: ecological_role.clone(),
    })
}

pub(crate) fn patch_from(args: &UpdateArgs) -> std::io::Result<SpeciesPatch> {
    let text = &args.text;
    Ok(SpeciesPatch {
        name: args.name.clone(),
        scientific_name: args.scientific_name.clone(),
        risk_level: args.risk,
        audio: read_audio(args.audio.as_deref())?,
        characteristics: text.characteristics.clone(),
        location: text.location.clone(),
        habitat: text.habitat.clone(),
        diet: text.diet.clone(),
        risk_details: text.risk_details.clone(),
        ecological_role: text.ecological_role.clone(),
    })
}

async fn run<S: KeyValueStore, A: ContentsApi>(
    repo: &mut SpeciesRepository<S, A>,
    command: Command,
) -> CliResult {
    match command {
        Command::List(list) => {
            let results = query(repo.records(), &list.search, list.risk, list.sort);
            if list.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_table(&results, repo.records().len());
            }
        }
        Command::Show { id, image_url } => {
            let record = repo.get(id).ok_or(error::RepoError::NotFound(id))?;
            if image_url {
                println!("{}", record.image_or_placeholder());
            } else {
                print_details(record);
            }
        }
        Command::Add(add) => {
            let draft = draft_from(&add)?;
            let image = read_image(add.image.as_deref())?;
            let record = repo.create(draft, image).await?;
            println!("Species added: {} ({})", record.name, record.id);
        }
        Command::Update(update) => {
            let patch = patch_from(&update)?;
            let image = read_image(update.image.as_deref())?;
            let record = repo.update(update.id, patch, image).await?;
            println!("Species updated: {} ({})", record.name, record.id);
        }
        Command::Delete { id } => {
            let record = repo.delete(id).await?;
            println!("Species deleted: {}", record.name);
        }
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let count = repo.import(&json)?;
            println!("Imported {} species", count);
            for (label, count) in risk_summary(repo.records()) {
                println!("  {}: {}", label, count);
            }
        }
        Command::Export { output, format } => {
            let mut buffer = Vec::new();
            match format {
                ExportFormat::Json => buffer.extend_from_slice(repo.export()?.as_bytes()),
                ExportFormat::Csv => repo.export_csv(&mut buffer)?,
            }
            match output {
                Some(path) => {
                    std::fs::write(&path, &buffer)?;
                    println!("Data saved to {}", path.display());
                }
                None => println!("{}", String::from_utf8_lossy(&buffer)),
            }
        }
        Command::AttachImages { dir } => {
            let start = Instant::now();
            let summary = repo.attach_images(&dir).await?;
            print_hms(&start);
            println!(
                "Attached {} images ({} without a matching species, {} failed)",
                summary.attached, summary.unmatched, summary.failed
            );
        }
        Command::Logo { file } => {
            let bytes = std::fs::read(&file)?;
            let url = repo.gateway().upload_logo(&bytes).await?;
            println!("Logo uploaded: {}", url);
        }
        Command::Config(ConfigCommand::Show) => {
            let cfg = repo.gateway().config();
            println!("owner:  {}", cfg.owner);
            println!("repo:   {}", cfg.repo);
            println!("branch: {}", cfg.branch);
            println!("token:  {}", cfg.masked_token());
        }
        Command::Config(ConfigCommand::Set {
            owner,
            repo: name,
            branch,
            save_token,
        }) => {
            // Start from what is saved so a token given for this run only is
            // not persisted by accident.
            let mut cfg = RemoteHostConfig::load(repo.store());
            if let Some(owner) = owner {
                cfg.owner = owner;
            }
            if let Some(name) = name {
                cfg.repo = name;
            }
            if let Some(branch) = branch {
                cfg.branch = branch;
            }
            if let Some(token) = save_token {
                cfg.token = token;
            }
            let saved = repo.save_config(cfg)?;
            println!("GitHub settings saved for {}/{}@{}", saved.owner, saved.repo, saved.branch);
        }
        Command::About(AboutCommand::Show) => match store::load_about(repo.store()) {
            Some(text) => println!("{}", text),
            None => println!("(no about note yet)"),
        },
        Command::About(AboutCommand::Set { text, file }) => {
            let text = match (text, file) {
                (_, Some(path)) => std::fs::read_to_string(path)?,
                (Some(text), None) => text,
                (None, None) => return Err("give the note text or --file".into()),
            };
            if store::save_about(repo.store_mut(), &text) {
                println!("About note saved.");
            } else {
                return Err("could not save the about note".into());
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult {
    let args = Args::parse();
    // Initialize logger
    init_logging(args.verbose);

    let store = FileStore::open(&args.data_dir)?;
    debug!("Using data directory {}", store.dir().display());

    let mut remote = RemoteHostConfig::load(&store);
    if let Some(token) = args.token {
        remote.token = token;
    }
    let contents = GithubContents::new()?.with_api_base(&args.api_base);
    let gateway = ImageGateway::new(contents, remote).with_raw_host(&args.raw_host);
    let mut repo = SpeciesRepository::open(store, gateway);

    run(&mut repo, args.command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RiskLevel;
    use crate::store::MemoryStore;
    use crate::testing::{FakeContents, config_with_token, sample_record};

    #[test]
    fn test_args_parse_add() {
        let args = Args::try_parse_from([
            "aquavault",
            "add",
            "--name",
            "Mero",
            "--scientific-name",
            "Epinephelus itajara",
            "--risk",
            "critically-endangered",
            "--diet",
            "Peixes",
        ])
        .unwrap();
        let Command::Add(add) = args.command else {
            panic!("expected add");
        };
        let draft = draft_from(&add).unwrap();
        assert_eq!(draft.risk_level, Some(RiskLevel::CriticallyEndangered));
        assert_eq!(draft.diet.as_deref(), Some("Peixes"));
        assert_eq!(draft.audio, None);
    }

    #[test]
    fn test_args_parse_list_and_globals() {
        let args = Args::try_parse_from([
            "aquavault", "list", "--search", "franca", "--sort", "risk", "-D", "/tmp/av", "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        assert_eq!(args.data_dir, Path::new("/tmp/av"));
        let Command::List(list) = args.command else {
            panic!("expected list");
        };
        assert_eq!(list.search, "franca");
        assert_eq!(list.sort, Some(query::SortKey::Risk));
        assert_eq!(list.risk, None);
    }

    #[test]
    fn test_update_patch_only_sets_given_fields() {
        let args = Args::try_parse_from(["aquavault", "update", "7", "--habitat", ""]).unwrap();
        let Command::Update(update) = args.command else {
            panic!("expected update");
        };
        let patch = patch_from(&update).unwrap();
        assert_eq!(update.id, 7);
        assert_eq!(patch.name, None);
        assert_eq!(patch.habitat.as_deref(), Some(""));
    }

    #[test]
    fn test_risk_summary() {
        let records = vec![
            sample_record(1, "A", RiskLevel::LeastConcern),
            sample_record(2, "B", RiskLevel::CriticallyEndangered),
            sample_record(3, "C", RiskLevel::LeastConcern),
        ];
        assert_eq!(
            risk_summary(&records),
            vec![
                ("Criticamente em Perigo".to_string(), 1),
                ("Pouco Preocupante".to_string(), 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_run_config_set_persists() {
        let store = MemoryStore::new().with_value(store::SPECIES_KEY, "[]");
        let mut repo =
            SpeciesRepository::open(store, ImageGateway::new(FakeContents::new(), config_with_token()));
        let args = Args::try_parse_from(["aquavault", "config", "set", "--owner", "someone"]).unwrap();
        run(&mut repo, args.command).await.unwrap();

        let saved = RemoteHostConfig::load(repo.store());
        assert_eq!(saved.owner, "someone");
        // The run-only token is not written out.
        assert_eq!(saved.token, "");
        assert_eq!(repo.gateway().config().owner, "someone");
    }

    #[tokio::test]
    async fn test_run_show_unknown_id_fails() {
        let store = MemoryStore::new().with_value(store::SPECIES_KEY, "[]");
        let mut repo =
            SpeciesRepository::open(store, ImageGateway::new(FakeContents::new(), config_with_token()));
        let args = Args::try_parse_from(["aquavault", "show", "5"]).unwrap();
        let err = run(&mut repo, args.command).await.unwrap_err();
        assert_eq!(err.to_string(), "species 5 not found");
    }

    #[tokio::test]
    async fn test_run_returns_gateway_failure() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("logo.png");
        std::fs::write(&logo, b"png").unwrap();

        let store = MemoryStore::new().with_value(store::SPECIES_KEY, "[]");
        let mut repo = SpeciesRepository::open(
            store,
            ImageGateway::new(FakeContents::new(), RemoteHostConfig::default()),
        );
        let args = Args::try_parse_from(["aquavault", "logo", logo.to_str().unwrap()]).unwrap();
        let err = run(&mut repo, args.command).await.unwrap_err();
        assert!(err.to_string().starts_with("no GitHub token configured"));
        assert!(repo.gateway().api().calls().is_empty());
    }
}
