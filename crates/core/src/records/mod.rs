//! Domain record types and the contract they fulfil toward the sync engine.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Canonical list of local collections that participate in offline sync.
pub const SYNC_COLLECTIONS: [Collection; 6] = [
    Collection::Animal,
    Collection::WeightRecord,
    Collection::FeedingLog,
    Collection::MedicineLog,
    Collection::VaccineLog,
    Collection::InventoryItem,
];

/// Entity collections known at compile time.
///
/// Each variant maps to exactly one local table and one remote collection;
/// there is no runtime table-name lookup anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Animal,
    WeightRecord,
    FeedingLog,
    MedicineLog,
    VaccineLog,
    InventoryItem,
}

impl Collection {
    /// Local table (and remote collection path segment) for this collection.
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Animal => "animals",
            Collection::WeightRecord => "weight_records",
            Collection::FeedingLog => "feeding_logs",
            Collection::MedicineLog => "medicine_logs",
            Collection::VaccineLog => "vaccine_logs",
            Collection::InventoryItem => "inventory_items",
        }
    }
}

/// Contract every syncable record type fulfils.
///
/// The id is assigned client-side at creation time and never reassigned;
/// `set_record_id` exists so the entity service can mint a uuid for records
/// created without one.
pub trait SyncRecord:
    Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const COLLECTION: Collection;

    fn record_id(&self) -> &str;
    fn set_record_id(&mut self, id: String);
}

macro_rules! impl_sync_record {
    ($ty:ident, $collection:expr) => {
        impl SyncRecord for $ty {
            const COLLECTION: Collection = $collection;

            fn record_id(&self) -> &str {
                &self.id
            }

            fn set_record_id(&mut self, id: String) {
                self.id = id;
            }
        }
    };
}

/// A single animal on the holding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Animal {
    #[serde(default)]
    pub id: String,
    /// Ear-tag / herd book number, e.g. "A1".
    pub animal_id: String,
    pub category: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightRecord {
    #[serde(default)]
    pub id: String,
    pub animal_id: String,
    pub weight_kg: f64,
    pub recorded_at: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedingLog {
    #[serde(default)]
    pub id: String,
    pub animal_id: String,
    pub feed_type: String,
    pub quantity_kg: f64,
    pub fed_at: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MedicineLog {
    #[serde(default)]
    pub id: String,
    pub animal_id: String,
    pub medicine_name: String,
    pub dose: String,
    pub administered_at: String,
    #[serde(default)]
    pub withdrawal_until: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VaccineLog {
    #[serde(default)]
    pub id: String,
    pub animal_id: String,
    pub vaccine_name: String,
    pub administered_at: String,
    #[serde(default)]
    pub next_due: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub category: String,
    pub quantity: f64,
    pub unit: String,
}

impl_sync_record!(Animal, Collection::Animal);
impl_sync_record!(WeightRecord, Collection::WeightRecord);
impl_sync_record!(FeedingLog, Collection::FeedingLog);
impl_sync_record!(MedicineLog, Collection::MedicineLog);
impl_sync_record!(VaccineLog, Collection::VaccineLog);
impl_sync_record!(InventoryItem, Collection::InventoryItem);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_serialization_matches_storage_contract() {
        let actual = SYNC_COLLECTIONS
            .iter()
            .map(|c| serde_json::to_string(c).expect("serialize collection"))
            .collect::<Vec<_>>();

        let expected = vec![
            "\"animal\"",
            "\"weight_record\"",
            "\"feeding_log\"",
            "\"medicine_log\"",
            "\"vaccine_log\"",
            "\"inventory_item\"",
        ];

        assert_eq!(actual, expected);
    }

    #[test]
    fn table_names_are_unique() {
        let mut names: Vec<_> = SYNC_COLLECTIONS.iter().map(|c| c.table_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SYNC_COLLECTIONS.len());
    }

    #[test]
    fn record_id_assignment_round_trips() {
        let mut animal = Animal {
            animal_id: "A1".to_string(),
            category: "beef".to_string(),
            ..Default::default()
        };
        assert!(animal.record_id().is_empty());
        animal.set_record_id("abc-123".to_string());
        assert_eq!(animal.record_id(), "abc-123");
        assert_eq!(Animal::COLLECTION, Collection::Animal);
    }
}
