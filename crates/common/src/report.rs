//! Audit report model and column derivation
//!
//! The report mirrors the subset of a Lighthouse result that the output layer
//! reads. Category order follows the engine's JSON document order, so the
//! derived column layout matches what the engine presents.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Structured result of auditing one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub lighthouse_version: String,
    #[serde(default)]
    pub requested_url: Option<String>,
    #[serde(default)]
    pub final_url: Option<String>,
    #[serde(with = "ordered_categories")]
    pub categories: Vec<Category>,
    pub audits: BTreeMap<String, Audit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub audit_refs: Vec<AuditRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRef {
    pub id: String,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub score_display_mode: Option<String>,
    #[serde(default)]
    pub numeric_value: Option<f64>,
    #[serde(default)]
    pub numeric_unit: Option<String>,
}

impl AuditReport {
    #[must_use]
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn audit(&self, id: &str) -> Option<&Audit> {
        self.audits.get(id)
    }

    /// A report with no categories carries nothing to tabulate.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.lighthouse_version.is_empty() && !self.categories.is_empty()
    }
}

/// Which metric a column reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ColumnField {
    CategoryScore { category: String },
    AuditScore { audit: String },
    AuditPassFail { audit: String },
    AuditNumericValue { audit: String },
}

/// A named slot shared by every row of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub detail: Option<String>,
    /// Title of the category the column belongs to.
    pub category: String,
    pub field: ColumnField,
}

impl Column {
    /// `name (detail)`, or just `name`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{} ({})", self.name, detail),
            None => self.name.clone(),
        }
    }

    /// Render this column's cell for `report`; missing metrics become "".
    #[must_use]
    pub fn cell(&self, report: &AuditReport) -> String {
        let value = match &self.field {
            ColumnField::CategoryScore { category } => report.category(category).and_then(|c| c.score),
            ColumnField::AuditScore { audit } => report.audit(audit).and_then(|a| a.score),
            ColumnField::AuditNumericValue { audit } => {
                report.audit(audit).and_then(|a| a.numeric_value)
            }
            ColumnField::AuditPassFail { audit } => {
                return match report.audit(audit).and_then(|a| a.score) {
                    Some(score) if score >= 1.0 => "PASS".to_string(),
                    Some(_) => "FAIL".to_string(),
                    None => String::new(),
                };
            }
        };
        value.map(|v| v.to_string()).unwrap_or_default()
    }
}

/// Derive the column layout from a report.
///
/// Every category's overall score first, in category order. Then, category by
/// category, each referenced audit's score (numeric audits), pass/fail (binary
/// audits) and numeric value.
#[must_use]
pub fn derive_columns(report: &AuditReport) -> Vec<Column> {
    let mut columns: Vec<Column> = report
        .categories
        .iter()
        .map(|category| Column {
            name: category.title.clone(),
            detail: Some("overall score".to_string()),
            category: category.title.clone(),
            field: ColumnField::CategoryScore {
                category: category.id.clone(),
            },
        })
        .collect();

    for category in &report.categories {
        for audit_ref in &category.audit_refs {
            let Some(audit) = report.audit(&audit_ref.id) else {
                continue;
            };
            match audit.score_display_mode.as_deref() {
                Some("numeric") => columns.push(Column {
                    name: audit.title.clone(),
                    detail: Some("score".to_string()),
                    category: category.title.clone(),
                    field: ColumnField::AuditScore {
                        audit: audit.id.clone(),
                    },
                }),
                Some("binary") => columns.push(Column {
                    name: audit.title.clone(),
                    detail: Some("pass/fail".to_string()),
                    category: category.title.clone(),
                    field: ColumnField::AuditPassFail {
                        audit: audit.id.clone(),
                    },
                }),
                _ => {}
            }
            if audit.numeric_value.is_some() {
                columns.push(Column {
                    name: audit.title.clone(),
                    detail: audit.numeric_unit.clone(),
                    category: category.title.clone(),
                    field: ColumnField::AuditNumericValue {
                        audit: audit.id.clone(),
                    },
                });
            }
        }
    }
    columns
}

/// Convert a report into cells using a fixed column list.
#[must_use]
pub fn row_values(columns: &[Column], report: &AuditReport) -> Vec<String> {
    columns.iter().map(|c| c.cell(report)).collect()
}

/// Categories arrive as a JSON object keyed by id; keep them in document order.
mod ordered_categories {
    use super::*;

    pub fn serialize<S: Serializer>(categories: &[Category], ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(categories.len()))?;
        for category in categories {
            map.serialize_entry(&category.id, category)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<Category>, D::Error> {
        struct CategoriesVisitor;

        impl<'de> Visitor<'de> for CategoriesVisitor {
            type Value = Vec<Category>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category id to category")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut categories = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((_id, category)) = access.next_entry::<String, Category>()? {
                    categories.push(category);
                }
                Ok(categories)
            }
        }

        de.deserialize_map(CategoriesVisitor)
    }
}
