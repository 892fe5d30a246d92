//! Static municipality reference table

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum EntityError {
    MissingInput(PathBuf),
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl From<std::io::Error> for EntityError {
    fn from(err: std::io::Error) -> Self {
        EntityError::Io(err)
    }
}

impl From<serde_json::Error> for EntityError {
    fn from(err: serde_json::Error) -> Self {
        EntityError::Parse(err)
    }
}

impl std::fmt::Display for EntityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityError::MissingInput(p) => write!(f, "Missing input: {}", p.display()),
            EntityError::Io(e) => write!(f, "IO error: {}", e),
            EntityError::Parse(e) => write!(f, "Entity table parse error: {}", e),
        }
    }
}

impl std::error::Error for EntityError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationBucket {
    #[serde(rename = "<50k")]
    Under50k,
    #[serde(rename = "50k-200k")]
    From50kTo200k,
    #[serde(rename = "200k-500k")]
    From200kTo500k,
    #[serde(rename = ">=500k")]
    Over500k,
}

impl PopulationBucket {
    pub fn from_population(population: u64) -> Self {
        match population {
            0..=49_999 => PopulationBucket::Under50k,
            50_000..=199_999 => PopulationBucket::From50kTo200k,
            200_000..=499_999 => PopulationBucket::From200kTo500k,
            _ => PopulationBucket::Over500k,
        }
    }
}

/// A municipality tracked by code and name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub parent_region_id: String,
    pub population_bucket: PopulationBucket,
}

/// On-disk shape: population is given as a figure and bucketed on load
#[derive(Debug, Deserialize)]
struct EntityRow {
    id: String,
    name: String,
    parent_region_id: String,
    population: u64,
}

/// Read-only lookup of the municipalities under study
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Entity>,
}

impl EntityRegistry {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self {
            entities: entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, EntityError> {
        let rows: Vec<EntityRow> = serde_json::from_str(json)?;
        let entities = rows
            .into_iter()
            .map(|row| Entity {
                population_bucket: PopulationBucket::from_population(row.population),
                id: row.id,
                name: row.name,
                parent_region_id: row.parent_region_id,
            })
            .collect();
        Ok(Self::new(entities))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EntityError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EntityError::MissingInput(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&json)?;
        log::info!("🏙️  Loaded {} entities from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Display name, falling back to the code for unknown ids
    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.entities.get(id).map(|e| e.name.as_str()).unwrap_or(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// Entity id → parent region id
    pub fn regions(&self) -> BTreeMap<String, String> {
        self.entities
            .values()
            .map(|e| (e.id.clone(), e.parent_region_id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"[
        {"id": "11100", "name": "さいたま市", "parent_region_id": "11", "population": 1324025},
        {"id": "11203", "name": "川口市", "parent_region_id": "11", "population": 594274},
        {"id": "20202", "name": "松本市", "parent_region_id": "20", "population": 237318}
    ]"#;

    #[test]
    fn test_registry_from_json() {
        let registry = EntityRegistry::from_json(TABLE).unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.ids(), vec!["11100", "11203", "20202"]);

        let matsumoto = registry.get("20202").unwrap();
        assert_eq!(matsumoto.name, "松本市");
        assert_eq!(matsumoto.parent_region_id, "20");
        assert_eq!(matsumoto.population_bucket, PopulationBucket::From200kTo500k);
    }

    #[test]
    fn test_name_falls_back_to_code() {
        let registry = EntityRegistry::from_json(TABLE).unwrap();
        assert_eq!(registry.name_of("11203"), "川口市");
        assert_eq!(registry.name_of("99999"), "99999");
    }

    #[test]
    fn test_population_buckets() {
        assert_eq!(PopulationBucket::from_population(12_000), PopulationBucket::Under50k);
        assert_eq!(PopulationBucket::from_population(50_000), PopulationBucket::From50kTo200k);
        assert_eq!(PopulationBucket::from_population(499_999), PopulationBucket::From200kTo500k);
        assert_eq!(PopulationBucket::from_population(500_000), PopulationBucket::Over500k);
    }

    #[test]
    fn test_missing_table_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = EntityRegistry::load(dir.path().join("entities.json"));
        assert!(matches!(result, Err(EntityError::MissingInput(_))));
    }
}
