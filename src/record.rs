use crate::error::{RepoError, RepoResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Conservation status, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum RiskLevel {
    #[serde(rename = "Criticamente em Perigo", alias = "CriticallyEndangered")]
    CriticallyEndangered,
    #[serde(rename = "Em Perigo", alias = "Endangered")]
    Endangered,
    #[serde(rename = "Vulnerável", alias = "Vulnerable")]
    Vulnerable,
    #[serde(rename = "Quase Ameaçada", alias = "NearThreatened")]
    NearThreatened,
    #[serde(rename = "Pouco Preocupante", alias = "LeastConcern")]
    LeastConcern,
    #[serde(rename = "Superpopulação", alias = "Overpopulated")]
    Overpopulated,
}

impl RiskLevel {
    /// Severity rank used for sorting; higher is more threatened.
    pub fn severity(self) -> u8 {
        match self {
            RiskLevel::CriticallyEndangered => 6,
            RiskLevel::Endangered => 5,
            RiskLevel::Vulnerable => 4,
            RiskLevel::NearThreatened => 3,
            RiskLevel::LeastConcern => 2,
            RiskLevel::Overpopulated => 1,
        }
    }

    /// The label stored in the catalog file.
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::CriticallyEndangered => "Criticamente em Perigo",
            RiskLevel::Endangered => "Em Perigo",
            RiskLevel::Vulnerable => "Vulnerável",
            RiskLevel::NearThreatened => "Quase Ameaçada",
            RiskLevel::LeastConcern => "Pouco Preocupante",
            RiskLevel::Overpopulated => "Superpopulação",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesRecord {
    pub id: i64,
    pub name: String,
    pub scientific_name: String,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "audioUrl", alias = "audio", default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characteristics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habitat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecological_role: Option<String>,
    pub created_at: i64,
    /// Fields this version does not know about, kept so exports stay lossless.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

const PLACEHOLDER_PALETTE: [&str; 5] = ["#4281a4", "#2d5016", "#8b5cf6", "#059669", "#dc2626"];

impl SpeciesRecord {
    /// Build a record from a validated draft.
    pub fn from_draft(id: i64, created_at: i64, draft: SpeciesDraft) -> RepoResult<Self> {
        draft.validate()?;
        let risk_level = draft.risk_level.ok_or(RepoError::Validation("riskLevel"))?;
        Ok(Self {
            id,
            name: draft.name.trim().to_string(),
            scientific_name: draft.scientific_name.trim().to_string(),
            risk_level,
            image: None,
            audio: draft.audio,
            characteristics: non_blank(draft.characteristics),
            location: non_blank(draft.location),
            habitat: non_blank(draft.habitat),
            diet: non_blank(draft.diet),
            risk_details: non_blank(draft.risk_details),
            ecological_role: non_blank(draft.ecological_role),
            created_at,
            extra: BTreeMap::new(),
        })
    }

    /// Stored image URL, or a generated placeholder when there is none.
    pub fn image_or_placeholder(&self) -> String {
        match &self.image {
            Some(url) => url.clone(),
            None => placeholder_image(&self.name),
        }
    }

    fn apply(&mut self, patch: SpeciesPatch) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(scientific_name) = patch.scientific_name {
            self.scientific_name = scientific_name.trim().to_string();
        }
        if let Some(risk_level) = patch.risk_level {
            self.risk_level = risk_level;
        }
        if let Some(audio) = patch.audio {
            self.audio = Some(audio);
        }
        let text_fields = [
            (&mut self.characteristics, patch.characteristics),
            (&mut self.location, patch.location),
            (&mut self.habitat, patch.habitat),
            (&mut self.diet, patch.diet),
            (&mut self.risk_details, patch.risk_details),
            (&mut self.ecological_role, patch.ecological_role),
        ];
        for (field, value) in text_fields {
            // An explicit blank clears the field.
            if let Some(value) = value {
                *field = non_blank(Some(value));
            }
        }
    }

    /// Copy of this record with the patch merged in.
    pub fn patched(&self, patch: SpeciesPatch) -> Self {
        let mut merged = self.clone();
        merged.apply(patch);
        merged
    }
}

/// User-supplied fields for a new record.
#[derive(Debug, Clone, Default)]
pub struct SpeciesDraft {
    pub name: String,
    pub scientific_name: String,
    pub risk_level: Option<RiskLevel>,
    pub audio: Option<String>,
    pub characteristics: Option<String>,
    pub location: Option<String>,
    pub habitat: Option<String>,
    pub diet: Option<String>,
    pub risk_details: Option<String>,
    pub ecological_role: Option<String>,
}

impl SpeciesDraft {
    pub fn validate(&self) -> RepoResult<()> {
        if self.name.trim().is_empty() {
            return Err(RepoError::Validation("name"));
        }
        if self.scientific_name.trim().is_empty() {
            return Err(RepoError::Validation("scientificName"));
        }
        if self.risk_level.is_none() {
            return Err(RepoError::Validation("riskLevel"));
        }
        Ok(())
    }
}

/// Partial update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct SpeciesPatch {
    pub name: Option<String>,
    pub scientific_name: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub audio: Option<String>,
    pub characteristics: Option<String>,
    pub location: Option<String>,
    pub habitat: Option<String>,
    pub diet: Option<String>,
    pub risk_details: Option<String>,
    pub ecological_role: Option<String>,
}

impl SpeciesPatch {
    pub fn validate(&self) -> RepoResult<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(RepoError::Validation("name"));
        }
        if self
            .scientific_name
            .as_deref()
            .is_some_and(|n| n.trim().is_empty())
        {
            return Err(RepoError::Validation("scientificName"));
        }
        Ok(())
    }
}

/// A local image chosen for upload.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, bytes))
    }

    /// File name without its last extension.
    pub fn base_name(&self) -> &str {
        let base = match self.name.rfind('.') {
            Some(idx) if idx + 1 < self.name.len() => &self.name[..idx],
            _ => &self.name,
        };
        base.trim()
    }

    /// Lower-cased extension, `png` when the name has none.
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
            _ => "png".to_string(),
        }
    }

    /// Case- and accent-insensitive comparison of the base name with a
    /// species name.
    pub fn matches_species(&self, species_name: &str) -> bool {
        fold_name(self.base_name()) == fold_name(species_name)
    }
}

fn fold_name(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Palette colour picked by a 32-bit rolling hash of the name.
pub fn placeholder_color(name: &str) -> &'static str {
    let mut h: i32 = 0;
    for unit in name.encode_utf16() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(unit as i32);
    }
    PLACEHOLDER_PALETTE[(h.unsigned_abs() % PLACEHOLDER_PALETTE.len() as u32) as usize]
}

/// Deterministic SVG placeholder for records without an image.
pub fn placeholder_image(name: &str) -> String {
    let svg = format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='200' height='200'>\
         <rect width='200' height='200' fill='{}'/>\
         <text x='100' y='100' fill='white' font-family='Arial' font-weight='bold' \
         font-size='16' text-anchor='middle' dominant-baseline='middle'>{}</text></svg>",
        placeholder_color(name),
        escape_xml(name)
    );
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> SpeciesDraft {
        SpeciesDraft {
            name: "  Tartaruga-verde ".to_string(),
            scientific_name: "Chelonia mydas".to_string(),
            risk_level: Some(RiskLevel::Endangered),
            habitat: Some("   ".to_string()),
            diet: Some("Algas".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_draft_trims_and_drops_blank_text() {
        let record = SpeciesRecord::from_draft(7, 100, draft()).unwrap();
        assert_eq!(record.name, "Tartaruga-verde");
        assert_eq!(record.habitat, None);
        assert_eq!(record.diet.as_deref(), Some("Algas"));
        assert_eq!(record.image, None);
    }

    #[test]
    fn test_draft_missing_fields() {
        let mut d = draft();
        d.scientific_name = " ".to_string();
        assert!(matches!(d.validate(), Err(RepoError::Validation("scientificName"))));

        let mut d = draft();
        d.risk_level = None;
        assert!(matches!(d.validate(), Err(RepoError::Validation("riskLevel"))));
    }

    #[test]
    fn test_serialized_shape() {
        let record = SpeciesRecord::from_draft(7, 100, draft()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["scientificName"], "Chelonia mydas");
        assert_eq!(json["riskLevel"], "Em Perigo");
        assert_eq!(json["createdAt"], 100);
        assert!(json.get("image").is_none());
    }

    #[test]
    fn test_deserialize_keeps_unknown_fields_and_accepts_aliases() {
        let json = r#"{"id":1,"name":"A","scientificName":"B","riskLevel":"LeastConcern",
            "audio":"data:audio/mpeg;base64,AA==","createdAt":5,"featured":true}"#;
        let record: SpeciesRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.risk_level, RiskLevel::LeastConcern);
        assert_eq!(record.audio.as_deref(), Some("data:audio/mpeg;base64,AA=="));
        assert_eq!(record.extra.get("featured"), Some(&serde_json::Value::Bool(true)));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["featured"], true);
        assert_eq!(back["riskLevel"], "Pouco Preocupante");
        assert!(back.get("audioUrl").is_some());
    }

    #[test]
    fn test_patch_clears_blank_optional_text() {
        let record = SpeciesRecord::from_draft(1, 1, draft()).unwrap();
        let patch = SpeciesPatch {
            diet: Some(String::new()),
            risk_level: Some(RiskLevel::Vulnerable),
            ..Default::default()
        };
        let merged = record.patched(patch);
        assert_eq!(merged.diet, None);
        assert_eq!(merged.risk_level, RiskLevel::Vulnerable);
        assert_eq!(merged.image, record.image);
        assert_eq!(merged.id, record.id);
    }

    #[test]
    fn test_image_file_names() {
        let file = ImageFile::new("Tartaruga-Verde.JPG", vec![]);
        assert_eq!(file.base_name(), "Tartaruga-Verde");
        assert_eq!(file.extension(), "jpg");
        assert!(file.matches_species("tartaruga-verde"));
        assert!(!file.matches_species("Tartaruga"));

        let accented = ImageFile::new("Tubarao-martelo.png", vec![]);
        assert!(accented.matches_species("Tubarão-Martelo"));
        assert!(ImageFile::new("TUBARÃO.webp", vec![]).matches_species("tubarao"));
        assert!(!accented.matches_species("Tubarão"));

        let bare = ImageFile::new("logo", vec![]);
        assert_eq!(bare.base_name(), "logo");
        assert_eq!(bare.extension(), "png");
    }

    #[test]
    fn test_placeholder_is_deterministic() {
        assert_eq!(placeholder_color("Baleia"), placeholder_color("Baleia"));
        // "a" hashes to 97, 97 % 5 == 2
        assert_eq!(placeholder_color("a"), "#8b5cf6");
        let url = placeholder_image("Peixe & Cia");
        assert!(url.starts_with("data:image/svg+xml;base64,"));
        assert_eq!(url, placeholder_image("Peixe & Cia"));
    }
}
