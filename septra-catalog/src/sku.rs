use chrono::{DateTime, Utc};
use septra_core::repository::{Collection, Record};
use septra_core::{ProcurementError, ProcurementResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Free-form product details. The common keys get fields, anything else
/// goes into `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkuMetadata {
    pub dosage_form: Option<String>,
    pub pack_size: Option<String>,
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// A catalog product. Referenced by id everywhere else, never copied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub strength: Option<String>,
    pub unit: String,
    pub metadata: SkuMetadata,
    pub is_active: bool,
    pub created_by: String,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Sku {
    const COLLECTION: Collection = Collection::Skus;
    const ENTITY: &'static str = "SKU";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewSku {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub strength: Option<String>,
    pub unit: String,
    pub metadata: SkuMetadata,
}

/// Mutable attributes. `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct SkuUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub strength: Option<String>,
    pub unit: Option<String>,
    pub metadata: Option<SkuMetadata>,
}

fn required(field: &str, value: &str) -> ProcurementResult<()> {
    if value.trim().is_empty() {
        return Err(ProcurementError::Validation(format!("SKU {} is required", field)));
    }
    Ok(())
}

impl NewSku {
    pub fn validate(&self) -> ProcurementResult<()> {
        required("code", &self.code)?;
        required("name", &self.name)?;
        required("unit", &self.unit)?;
        required("category", &self.category)
    }
}

impl Sku {
    pub fn new(input: NewSku, created_by: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: input.code.trim().to_uppercase(),
            name: input.name.trim().to_string(),
            description: input.description,
            category: input.category,
            strength: input.strength,
            unit: input.unit,
            metadata: input.metadata,
            is_active: true,
            created_by,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: SkuUpdate, now: DateTime<Utc>) -> ProcurementResult<()> {
        if let Some(name) = update.name {
            required("name", &name)?;
            self.name = name.trim().to_string();
        }
        if let Some(unit) = update.unit {
            required("unit", &unit)?;
            self.unit = unit;
        }
        if let Some(category) = update.category {
            required("category", &category)?;
            self.category = category;
        }
        if update.description.is_some() {
            self.description = update.description;
        }
        if update.strength.is_some() {
            self.strength = update.strength;
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        self.touch(now);
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.updated_at = now;
    }

    /// Whether `category` filter (a supplier's specialty) covers this SKU.
    pub fn in_category(&self, categories: &[String]) -> bool {
        categories
            .iter()
            .any(|c| c == "ALL" || c.eq_ignore_ascii_case(&self.category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paracetamol() -> NewSku {
        NewSku {
            code: " para500 ".to_string(),
            name: "Paracetamol".to_string(),
            category: "analgesics".to_string(),
            strength: Some("500mg".to_string()),
            unit: "box".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_sku_normalises_code() {
        let sku = Sku::new(paracetamol(), "admin".to_string(), Utc::now());
        assert_eq!(sku.code, "PARA500");
        assert!(sku.is_active);
        assert_eq!(sku.revision, 0);
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut input = paracetamol();
        input.name = "  ".to_string();
        assert!(matches!(input.validate(), Err(ProcurementError::Validation(_))));
    }

    #[test]
    fn test_update_bumps_revision() {
        let mut sku = Sku::new(paracetamol(), "admin".to_string(), Utc::now());
        sku.apply(
            SkuUpdate { strength: Some("1g".to_string()), ..Default::default() },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(sku.strength.as_deref(), Some("1g"));
        assert_eq!(sku.revision, 1);
    }

    #[test]
    fn test_category_match() {
        let sku = Sku::new(paracetamol(), "admin".to_string(), Utc::now());
        assert!(sku.in_category(&["ALL".to_string()]));
        assert!(sku.in_category(&["Analgesics".to_string()]));
        assert!(!sku.in_category(&["antibiotics".to_string()]));
    }
}
