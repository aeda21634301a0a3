//! Static plant metadata and seed ranking.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

/// Plant id whose crop is worth stealing regardless of its grow time.
pub const ALWAYS_STEAL_PLANT_ID: i64 = 1_021_542;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FruitRef {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PlantRecord {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub seed_id: i64,
    #[serde(default)]
    pub exp: i64,
    /// `"seed:30;sprout:30;mature:0;"`
    #[serde(default)]
    pub grow_phases: String,
    #[serde(default)]
    pub fruit: Option<FruitRef>,
}

impl PlantRecord {
    pub fn grow_time_sec(&self) -> i64 {
        parse_grow_phases(&self.grow_phases)
    }
}

/// Sums the `name:seconds` pairs; malformed segments count as zero.
pub fn parse_grow_phases(raw: &str) -> i64 {
    raw.split(';')
        .filter_map(|segment| segment.split_once(':'))
        .filter_map(|(_, seconds)| seconds.trim().parse::<i64>().ok())
        .sum()
}

#[derive(Debug)]
pub enum CatalogError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read plant table '{}': {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse plant table '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug, Default)]
pub struct PlantCatalog {
    plants: HashMap<i64, PlantRecord>,
    by_seed: HashMap<i64, i64>,
    by_fruit: HashMap<i64, i64>,
}

impl PlantCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<PlantRecord>) -> Self {
        let mut catalog = Self::default();
        for record in records {
            if record.seed_id > 0 {
                catalog.by_seed.insert(record.seed_id, record.id);
            }
            if let Some(fruit) = record.fruit.as_ref().filter(|fruit| fruit.id > 0) {
                catalog.by_fruit.insert(fruit.id, record.id);
            }
            catalog.plants.insert(record.id, record);
        }
        catalog
    }

    /// A missing file yields an empty catalog; unreadable or malformed files
    /// are errors.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(source) => {
                return Err(CatalogError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let records: Vec<PlantRecord> =
            serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }

    pub fn plant(&self, plant_id: i64) -> Option<&PlantRecord> {
        self.plants.get(&plant_id)
    }

    pub fn plant_by_seed(&self, seed_id: i64) -> Option<&PlantRecord> {
        self.by_seed.get(&seed_id).and_then(|id| self.plants.get(id))
    }

    pub fn plant_by_fruit(&self, fruit_id: i64) -> Option<&PlantRecord> {
        self.by_fruit.get(&fruit_id).and_then(|id| self.plants.get(id))
    }

    pub fn is_fruit(&self, item_id: i64) -> bool {
        self.by_fruit.contains_key(&item_id)
    }

    /// Zero for unknown plants.
    pub fn grow_time_sec(&self, plant_id: i64) -> i64 {
        self.plant(plant_id).map_or(0, PlantRecord::grow_time_sec)
    }

    pub fn exp(&self, plant_id: i64) -> i64 {
        self.plant(plant_id).map_or(0, |plant| plant.exp)
    }

    pub fn plant_name(&self, plant_id: i64) -> String {
        match self.plant(plant_id) {
            Some(plant) if !plant.name.is_empty() => plant.name.clone(),
            _ => format!("plant#{plant_id}"),
        }
    }

    pub fn seed_name(&self, seed_id: i64) -> String {
        match self.plant_by_seed(seed_id) {
            Some(plant) if !plant.name.is_empty() => plant.name.clone(),
            _ => format!("seed#{seed_id}"),
        }
    }

    pub fn item_name(&self, item_id: i64) -> String {
        if let Some(plant) = self.plant_by_seed(item_id) {
            return format!("{} seed", plant.name);
        }
        if let Some(plant) = self.plant_by_fruit(item_id) {
            return format!("{} fruit", plant.name);
        }
        format!("item#{item_id}")
    }

    fn plants(&self) -> impl Iterator<Item = &PlantRecord> {
        self.plants.values()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendError {
    NoData,
}

impl fmt::Display for RecommendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no plant data to rank seeds with"),
        }
    }
}

impl std::error::Error for RecommendError {}

/// Ranks seed ids best first for a player of `level` farming `land_count` plots.
pub trait SeedRecommender: Send + Sync {
    fn rank_seeds(&self, level: i64, land_count: usize) -> Result<Vec<i64>, RecommendError>;
}

/// Ranks by harvest exp per second of grow time.
pub struct CatalogYieldRecommender {
    catalog: Arc<PlantCatalog>,
}

impl CatalogYieldRecommender {
    pub fn new(catalog: Arc<PlantCatalog>) -> Self {
        Self { catalog }
    }
}

impl SeedRecommender for CatalogYieldRecommender {
    fn rank_seeds(&self, _level: i64, _land_count: usize) -> Result<Vec<i64>, RecommendError> {
        let mut scored: Vec<(f64, i64)> = self
            .catalog
            .plants()
            .filter(|plant| plant.seed_id > 0 && plant.exp > 0)
            .filter_map(|plant| {
                let grow = plant.grow_time_sec();
                (grow > 0).then(|| (plant.exp as f64 / grow as f64, plant.seed_id))
            })
            .collect();
        if scored.is_empty() {
            return Err(RecommendError::NoData);
        }

        scored.sort_by(|left, right| {
            right
                .0
                .total_cmp(&left.0)
                .then_with(|| left.1.cmp(&right.1))
        });
        Ok(scored.into_iter().map(|(_, seed_id)| seed_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use super::{
        parse_grow_phases, CatalogError, CatalogYieldRecommender, FruitRef, PlantCatalog,
        PlantRecord, RecommendError, SeedRecommender,
    };

    fn record(id: i64, seed_id: i64, exp: i64, phases: &str, fruit_id: i64) -> PlantRecord {
        PlantRecord {
            id,
            name: format!("crop{id}"),
            seed_id,
            exp,
            grow_phases: phases.to_owned(),
            fruit: Some(FruitRef {
                id: fruit_id,
                count: 10,
            }),
        }
    }

    #[test]
    fn grow_phases_sum_seconds() {
        assert_eq!(parse_grow_phases("seed:30;sprout:30;mature:0;"), 60);
        assert_eq!(parse_grow_phases(""), 0);
        assert_eq!(parse_grow_phases("a:10;broken;b:x;c:5"), 15);
    }

    #[test]
    fn lookups_resolve_by_seed_and_fruit() {
        let catalog = PlantCatalog::from_records(vec![record(1_020_002, 20_002, 8, "a:60;b:60", 40_002)]);

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.grow_time_sec(1_020_002), 120);
        assert_eq!(catalog.plant_by_seed(20_002).map(|p| p.id), Some(1_020_002));
        assert!(catalog.is_fruit(40_002));
        assert!(!catalog.is_fruit(20_002));
        assert_eq!(catalog.item_name(40_002), "crop1020002 fruit");
        assert_eq!(catalog.plant_name(7), "plant#7");
        assert_eq!(catalog.grow_time_sec(7), 0);
    }

    #[test]
    fn missing_file_is_an_empty_catalog() {
        let catalog = PlantCatalog::load(Path::new("/nonexistent/farmhand/Plant.json"))
            .expect("missing table should not fail");
        assert!(catalog.is_empty());
    }

    #[test]
    fn malformed_file_is_reported() {
        let path = std::env::temp_dir().join(format!("farmhand-plant-{}.json", std::process::id()));
        fs::write(&path, "{not json").expect("write table");

        let err = PlantCatalog::load(&path).expect_err("malformed table should fail");
        fs::remove_file(path).expect("cleanup table");
        assert!(matches!(err, CatalogError::Parse { .. }));
    }

    #[test]
    fn loads_json_table() {
        let path = std::env::temp_dir().join(format!("farmhand-plant-ok-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"[{"id": 1020001, "name": "turnip", "seed_id": 20001, "exp": 2,
                "grow_phases": "seed:30;mature:0;", "fruit": {"id": 40001, "count": 5}}]"#,
        )
        .expect("write table");

        let catalog = PlantCatalog::load(&path).expect("table should load");
        fs::remove_file(path).expect("cleanup table");
        assert_eq!(catalog.seed_name(20001), "turnip");
        assert_eq!(catalog.exp(1_020_001), 2);
    }

    #[test]
    fn recommender_ranks_by_exp_rate() {
        let catalog = PlantCatalog::from_records(vec![
            record(1, 101, 10, "a:100", 201),
            record(2, 102, 30, "a:100", 202),
            record(3, 103, 40, "a:400", 203),
            record(4, 0, 99, "a:1", 204),
        ]);

        let ranked = CatalogYieldRecommender::new(Arc::new(catalog))
            .rank_seeds(10, 6)
            .expect("ranking should succeed");
        assert_eq!(ranked, vec![102, 101, 103]);
    }

    #[test]
    fn recommender_without_data_errors() {
        let catalog = PlantCatalog::empty();
        let err = CatalogYieldRecommender::new(Arc::new(catalog))
            .rank_seeds(1, 1)
            .expect_err("empty catalog cannot rank");
        assert_eq!(err, RecommendError::NoData);
    }
}
