use crate::config::RemoteHostConfig;
use crate::error::{RepoError, RepoResult, StorageError};
use crate::gateway::{ContentsApi, DeleteOutcome, ImageGateway};
use crate::record::{ImageFile, RiskLevel, SpeciesDraft, SpeciesPatch, SpeciesRecord};
use crate::store::{self, KeyValueStore, SPECIES_KEY};
use crate::util::now_millis;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// The species catalog.
///
/// Owns the in-memory collection and writes it through to the store after
/// every mutation. Image work goes through the gateway; a failed image step
/// never undoes a record change that was already flushed.
pub struct SpeciesRepository<S, A> {
    species: Vec<SpeciesRecord>,
    store: S,
    gateway: ImageGateway<A>,
}

/// Outcome of a bulk image attachment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AttachSummary {
    pub attached: usize,
    pub unmatched: usize,
    pub failed: usize,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: i64,
    name: &'a str,
    scientific_name: &'a str,
    risk_level: &'static str,
    image: &'a str,
    characteristics: &'a str,
    location: &'a str,
    habitat: &'a str,
    diet: &'a str,
    risk_details: &'a str,
    ecological_role: &'a str,
    created_at: i64,
}

impl<'a> From<&'a SpeciesRecord> for CsvRow<'a> {
    fn from(record: &'a SpeciesRecord) -> Self {
        Self {
            id: record.id,
            name: &record.name,
            scientific_name: &record.scientific_name,
            risk_level: record.risk_level.label(),
            image: text(&record.image),
            characteristics: text(&record.characteristics),
            location: text(&record.location),
            habitat: text(&record.habitat),
            diet: text(&record.diet),
            risk_details: text(&record.risk_details),
            ecological_role: text(&record.ecological_role),
            created_at: record.created_at,
        }
    }
}

fn text(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("")
}

/// Catalog used when nothing has been saved yet.
pub fn sample_species(config: &RemoteHostConfig) -> Vec<SpeciesRecord> {
    vec![SpeciesRecord {
        id: 1,
        name: "Baleia-franca-austral".to_string(),
        scientific_name: "Eubalaena australis".to_string(),
        risk_level: RiskLevel::Endangered,
        image: Some(format!(
            "https://raw.githubusercontent.com/{}/{}/{}/Baleia-franca-austral.png",
            config.owner, config.repo, config.branch
        )),
        audio: None,
        characteristics: Some(
            "Baleia de grande porte, até 18 m. Calosidades brancas na cabeça e ausência de barbatana dorsal."
                .to_string(),
        ),
        location: Some("Costa sul e sudeste do Brasil (SC e RS)".to_string()),
        habitat: Some("Águas costeiras temperadas; áreas protegidas para reprodução".to_string()),
        diet: Some("Filtradora: copépodes e pequenos crustáceos".to_string()),
        risk_details: Some(
            "Ameaças: colisão com embarcações, poluição sonora, mudanças climáticas e pesca acidental."
                .to_string(),
        ),
        ecological_role: Some(
            "Dispersora de nutrientes entre áreas oceânicas; contribui para a produtividade marinha."
                .to_string(),
        ),
        created_at: now_millis() - 3000,
        extra: BTreeMap::new(),
    }]
}

impl<S: KeyValueStore, A: ContentsApi> SpeciesRepository<S, A> {
    /// Load the saved catalog, or the sample catalog when there is none.
    pub fn open(store: S, gateway: ImageGateway<A>) -> Self {
        let species = match store::load(&store, SPECIES_KEY) {
            Some(species) => species,
            None => {
                info!("No saved catalog, starting from the sample species");
                sample_species(gateway.config())
            }
        };
        Self {
            species,
            store,
            gateway,
        }
    }

    pub fn records(&self) -> &[SpeciesRecord] {
        &self.species
    }

    pub fn get(&self, id: i64) -> Option<&SpeciesRecord> {
        self.species.iter().find(|s| s.id == id)
    }

    pub fn gateway(&self) -> &ImageGateway<A> {
        &self.gateway
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Persist new remote-host settings and start using them.
    pub fn save_config(&mut self, config: RemoteHostConfig) -> RepoResult<&RemoteHostConfig> {
        let saved = config.save(&mut self.store)?;
        self.gateway.set_config(saved);
        Ok(self.gateway.config())
    }

    fn position(&self, id: i64) -> RepoResult<usize> {
        self.species
            .iter()
            .position(|s| s.id == id)
            .ok_or(RepoError::NotFound(id))
    }

    fn flush(&mut self) {
        store::save(&mut self.store, SPECIES_KEY, &self.species);
    }

    /// Creation time as id, bumped past any id already taken.
    fn next_id(&self, now: i64) -> i64 {
        let taken: HashSet<i64> = self.species.iter().map(|s| s.id).collect();
        let mut id = now;
        while taken.contains(&id) {
            id += 1;
        }
        id
    }

    /// Add a record, then attach its image.
    ///
    /// The record is inserted and flushed before any image work, so a bad
    /// file name or a failed upload leaves it in place without an image and
    /// returns the error.
    pub async fn create(
        &mut self,
        draft: SpeciesDraft,
        image: Option<ImageFile>,
    ) -> RepoResult<SpeciesRecord> {
        draft.validate()?;
        let created_at = now_millis();
        let record = SpeciesRecord::from_draft(self.next_id(created_at), created_at, draft)?;
        let id = record.id;
        self.species.push(record.clone());
        self.flush();
        info!("Created species {} ({})", record.name, id);

        let Some(file) = image else {
            return Ok(record);
        };
        if !file.matches_species(&record.name) {
            warn!("Species {} kept without image: file name mismatch", id);
            return Err(RepoError::NamingMismatch {
                expected: record.name,
                found: file.name,
            });
        }

        let url = match self.gateway.upload_species_image(&record.name, &file).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Species {} kept without image: {}", id, e);
                return Err(e.into());
            }
        };

        let idx = self.position(id)?;
        self.species[idx].image = Some(url);
        let updated = self.species[idx].clone();
        self.flush();
        Ok(updated)
    }

    /// Merge `patch` into a record, uploading a new image first if given.
    ///
    /// Nothing changes unless the lookup, validation and upload all succeed;
    /// the merged record is then flushed once.
    pub async fn update(
        &mut self,
        id: i64,
        patch: SpeciesPatch,
        image: Option<ImageFile>,
    ) -> RepoResult<SpeciesRecord> {
        let idx = self.position(id)?;
        patch.validate()?;
        let mut merged = self.species[idx].patched(patch);

        if let Some(file) = image {
            if !file.matches_species(&merged.name) {
                return Err(RepoError::NamingMismatch {
                    expected: merged.name,
                    found: file.name,
                });
            }
            let url = self.gateway.upload_species_image(&merged.name, &file).await?;
            merged.image = Some(url);
        }

        let idx = self.position(id)?;
        self.species[idx] = merged.clone();
        self.flush();
        info!("Updated species {} ({})", merged.name, id);
        Ok(merged)
    }

    /// Remove a record. Its remote image is removed on a best-effort basis;
    /// gateway trouble is logged and never keeps the record alive.
    pub async fn delete(&mut self, id: i64) -> RepoResult<SpeciesRecord> {
        let idx = self.position(id)?;

        match self.gateway.delete(&self.species[idx]).await {
            Ok(DeleteOutcome::Deleted { path }) => info!("Removed image {} for species {}", path, id),
            Ok(DeleteOutcome::NotFound) => info!("No remote image found for species {}", id),
            Ok(DeleteOutcome::NoToken) => warn!("No GitHub token, remote image of {} left in place", id),
            Err(e) => warn!("Failed to remove remote image of {}: {}", id, e),
        }

        let idx = self.position(id)?;
        let removed = self.species.remove(idx);
        self.flush();
        info!("Deleted species {} ({})", removed.name, id);
        Ok(removed)
    }

    /// Replace the whole catalog with an exported JSON array.
    ///
    /// Every entry must be a record-shaped object with a unique id; otherwise
    /// nothing is applied. A missing `createdAt` is filled with the current
    /// time.
    pub fn import(&mut self, json: &str) -> RepoResult<usize> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| RepoError::ImportFormat(e.to_string()))?;
        let serde_json::Value::Array(items) = value else {
            return Err(RepoError::ImportFormat("expected a JSON array".to_string()));
        };

        let now = now_millis();
        let mut ids = HashSet::new();
        let mut imported = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let serde_json::Value::Object(mut fields) = item else {
                return Err(RepoError::ImportFormat(format!("entry {} is not an object", i)));
            };
            if fields.get("createdAt").is_none_or(|v| v.is_null()) {
                fields.insert("createdAt".to_string(), now.into());
            }
            let record: SpeciesRecord = serde_json::from_value(serde_json::Value::Object(fields))
                .map_err(|e| RepoError::ImportFormat(format!("entry {}: {}", i, e)))?;
            if record.name.trim().is_empty() || record.scientific_name.trim().is_empty() {
                return Err(RepoError::ImportFormat(format!("entry {} has a blank name", i)));
            }
            if !ids.insert(record.id) {
                return Err(RepoError::ImportFormat(format!("duplicate id {}", record.id)));
            }
            imported.push(record);
        }

        let count = imported.len();
        self.species = imported;
        self.flush();
        info!("Imported {} species", count);
        Ok(count)
    }

    /// Pretty-printed JSON of the catalog, in collection order.
    pub fn export(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(&self.species)?)
    }

    /// Flat CSV of the catalog's text fields.
    pub fn export_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        for record in &self.species {
            writer.serialize(CsvRow::from(record))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Upload every image in `dir` that is named after a species and link it
    /// to that species. Runs one upload at a time: each one is a commit on
    /// the same branch.
    pub async fn attach_images(&mut self, dir: &Path) -> io::Result<AttachSummary> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| {
                        IMAGE_EXTENSIONS.contains(&ext.to_string_lossy().to_lowercase().as_str())
                    })
            })
            .collect();
        paths.sort();
        Ok(self.attach_files(paths).await)
    }

    async fn attach_files(&mut self, paths: Vec<PathBuf>) -> AttachSummary {
        let progress_bar = ProgressBar::new(paths.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        progress_bar.set_message("Attaching images");

        let mut summary = AttachSummary::default();
        for path in paths {
            progress_bar.inc(1);
            let file = match ImageFile::from_path(&path) {
                Ok(file) => file,
                Err(e) => {
                    error!("Failed to read {}: {}", path.display(), e);
                    summary.failed += 1;
                    continue;
                }
            };
            let target = self
                .species
                .iter()
                .find(|s| file.matches_species(&s.name))
                .map(|s| s.id);

            match target {
                Some(id) => match self.update(id, SpeciesPatch::default(), Some(file)).await {
                    Ok(_) => summary.attached += 1,
                    Err(e) => {
                        error!("Failed to attach {}: {}", path.display(), e);
                        summary.failed += 1;
                    }
                },
                None => {
                    warn!("No species named after {}", path.display());
                    summary.unmatched += 1;
                }
            }
        }
        progress_bar.finish_and_clear();

        info!(
            "Attached {} images ({} unmatched, {} failed)",
            summary.attached, summary.unmatched, summary.failed
        );
        summary
    }
}
