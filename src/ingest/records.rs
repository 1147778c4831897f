//! Typed record sets flowing through the pipeline.
//!
//! The extractor's JSON is parsed into [`RawRecordSet`]; the consolidator
//! folds raw records into per-name fact buckets whose fields are comma-set
//! semantics throughout. Merging is defined on the types themselves so the
//! union rules live in one place.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A JSON field that models sometimes emit as a string and sometimes as a
/// list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl Default for TextOrList {
    fn default() -> Self {
        TextOrList::Text(String::new())
    }
}

impl TextOrList {
    /// Normalize to uppercase trimmed tokens; strings are comma-split.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            TextOrList::Text(s) => s
                .split(',')
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
            TextOrList::List(items) => items
                .iter()
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-chunk raw records (extractor output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "SOURCE", default)]
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerRecord {
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "PRODUCTS_USED", default)]
    pub products_used: TextOrList,
    #[serde(rename = "FOCUS_AREA", default)]
    pub focus_area: TextOrList,
    #[serde(rename = "INDUSTRY", default)]
    pub industry: TextOrList,
    #[serde(rename = "SOURCE", default)]
    pub source: TextOrList,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SupplierRecord {
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "RELATIONSHIP", default)]
    pub relationship: TextOrList,
    #[serde(rename = "FOCUS_AREA", default)]
    pub focus_area: TextOrList,
    #[serde(rename = "INDUSTRY", default)]
    pub industry: TextOrList,
    #[serde(rename = "SOURCE", default)]
    pub source: TextOrList,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompetitorRecord {
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "COMPETING_IN", default)]
    pub competing_in: TextOrList,
    #[serde(rename = "FOCUS_AREA", default)]
    pub focus_area: TextOrList,
    #[serde(rename = "INDUSTRY", default)]
    pub industry: TextOrList,
    #[serde(rename = "SOURCE", default)]
    pub source: TextOrList,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Association {
    #[serde(rename = "ROLE", default)]
    pub role: String,
    #[serde(rename = "COMPANY_NAME", default)]
    pub company_name: String,
    #[serde(rename = "FOCUS_AREA", default)]
    pub focus_area: String,
    #[serde(rename = "INDUSTRY", default)]
    pub industry: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectorRecord {
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "ROLE", default)]
    pub role: TextOrList,
    #[serde(rename = "OTHER_ASSOCIATIONS", default)]
    pub other_associations: Vec<Association>,
    #[serde(rename = "SOURCE", default)]
    pub source: TextOrList,
}

/// The five record classes extracted from one chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawRecordSet {
    #[serde(rename = "COMMERCIAL_PRODUCTS_OR_SERVICES", default)]
    pub products: Vec<ProductRecord>,
    #[serde(rename = "CUSTOMERS", default)]
    pub customers: Vec<CustomerRecord>,
    #[serde(rename = "SUPPLIERS_OR_PARTNERS", default)]
    pub suppliers_or_partners: Vec<SupplierRecord>,
    #[serde(rename = "COMPETITORS", default)]
    pub competitors: Vec<CompetitorRecord>,
    #[serde(rename = "DIRECTORS", default)]
    pub directors: Vec<DirectorRecord>,
}

impl RawRecordSet {
    /// Stamp the originating document onto every record.
    pub fn stamp_source(&mut self, source: &str) {
        for record in &mut self.products {
            record.source = source.to_string();
        }
        for record in &mut self.customers {
            record.source = TextOrList::Text(source.to_string());
        }
        for record in &mut self.suppliers_or_partners {
            record.source = TextOrList::Text(source.to_string());
        }
        for record in &mut self.competitors {
            record.source = TextOrList::Text(source.to_string());
        }
        for record in &mut self.directors {
            record.source = TextOrList::Text(source.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Consolidated fact buckets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerFacts {
    #[serde(rename = "PRODUCTS_USED", default)]
    pub products_used: BTreeSet<String>,
    #[serde(rename = "FOCUS_AREA", default)]
    pub focus_area: BTreeSet<String>,
    #[serde(rename = "INDUSTRY", default)]
    pub industry: BTreeSet<String>,
    #[serde(rename = "SOURCE", default)]
    pub source: BTreeSet<String>,
}

impl CustomerFacts {
    pub fn absorb(&mut self, record: &CustomerRecord) {
        self.products_used.extend(record.products_used.tokens());
        self.focus_area.extend(record.focus_area.tokens());
        self.industry.extend(record.industry.tokens());
        self.source.extend(record.source.tokens());
    }

    /// Vertex attributes exclude the relational field.
    pub fn vertex_attributes(&self) -> Vec<(String, String)> {
        vec![
            ("FOCUS_AREA".to_string(), join(&self.focus_area)),
            ("INDUSTRY".to_string(), join(&self.industry)),
            ("SOURCE".to_string(), join(&self.source)),
        ]
    }

    pub fn context_edge(&self, name: &str, main_entity: &str) -> String {
        format!(
            "{name} is a customer of (PRODUCTS_USED:{}) {main_entity}",
            join(&self.products_used)
        )
    }

    pub fn edge_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("PRODUCTS_USED".to_string(), join(&self.products_used)),
            ("SOURCE".to_string(), join(&self.source)),
        ])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SupplierFacts {
    #[serde(rename = "RELATIONSHIP", default)]
    pub relationship: BTreeSet<String>,
    #[serde(rename = "FOCUS_AREA", default)]
    pub focus_area: BTreeSet<String>,
    #[serde(rename = "INDUSTRY", default)]
    pub industry: BTreeSet<String>,
    #[serde(rename = "SOURCE", default)]
    pub source: BTreeSet<String>,
}

impl SupplierFacts {
    pub fn absorb(&mut self, record: &SupplierRecord) {
        self.relationship.extend(record.relationship.tokens());
        self.focus_area.extend(record.focus_area.tokens());
        self.industry.extend(record.industry.tokens());
        self.source.extend(record.source.tokens());
    }

    pub fn vertex_attributes(&self) -> Vec<(String, String)> {
        vec![
            ("FOCUS_AREA".to_string(), join(&self.focus_area)),
            ("INDUSTRY".to_string(), join(&self.industry)),
            ("SOURCE".to_string(), join(&self.source)),
        ]
    }

    pub fn context_edge(&self, name: &str, main_entity: &str) -> String {
        format!(
            "{name} is a supplier of (RELATIONSHIP:{}) {main_entity}",
            join(&self.relationship)
        )
    }

    pub fn edge_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("RELATIONSHIP".to_string(), join(&self.relationship)),
            ("SOURCE".to_string(), join(&self.source)),
        ])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompetitorFacts {
    #[serde(rename = "COMPETING_IN", default)]
    pub competing_in: BTreeSet<String>,
    #[serde(rename = "FOCUS_AREA", default)]
    pub focus_area: BTreeSet<String>,
    #[serde(rename = "INDUSTRY", default)]
    pub industry: BTreeSet<String>,
    #[serde(rename = "SOURCE", default)]
    pub source: BTreeSet<String>,
}

impl CompetitorFacts {
    pub fn absorb(&mut self, record: &CompetitorRecord) {
        self.competing_in.extend(record.competing_in.tokens());
        self.focus_area.extend(record.focus_area.tokens());
        self.industry.extend(record.industry.tokens());
        self.source.extend(record.source.tokens());
    }

    pub fn vertex_attributes(&self) -> Vec<(String, String)> {
        vec![
            ("FOCUS_AREA".to_string(), join(&self.focus_area)),
            ("INDUSTRY".to_string(), join(&self.industry)),
            ("SOURCE".to_string(), join(&self.source)),
        ]
    }

    pub fn context_edge(&self, name: &str, main_entity: &str) -> String {
        format!(
            "{name} is a competitor of (COMPETING_IN:{}) {main_entity}",
            join(&self.competing_in)
        )
    }

    pub fn edge_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("COMPETING_IN".to_string(), join(&self.competing_in)),
            ("SOURCE".to_string(), join(&self.source)),
        ])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectorFacts {
    #[serde(rename = "ROLE", default)]
    pub role: BTreeSet<String>,
    /// Concatenated, not unioned: multiple mentions of the same role are
    /// preserved.
    #[serde(rename = "OTHER_ASSOCIATIONS", default)]
    pub other_associations: Vec<Association>,
    #[serde(rename = "SOURCE", default)]
    pub source: BTreeSet<String>,
}

impl DirectorFacts {
    pub fn absorb(&mut self, record: &DirectorRecord) {
        self.role.extend(record.role.tokens());
        self.other_associations
            .extend(record.other_associations.iter().cloned());
        self.source.extend(record.source.tokens());
    }

    pub fn vertex_attributes(&self) -> Vec<(String, String)> {
        vec![("SOURCE".to_string(), join(&self.source))]
    }

    pub fn context_edge(&self, name: &str, main_entity: &str) -> String {
        format!(
            "{name} is a director of (ROLE: {}) {main_entity}",
            join(&self.role)
        )
    }

    pub fn edge_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("ROLE".to_string(), join(&self.role)),
            ("SOURCE".to_string(), join(&self.source)),
        ])
    }
}

/// Cross-chunk consolidation result: products as a flat set plus the four
/// relationship buckets keyed by uppercase entity name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsolidatedRecords {
    pub products: BTreeSet<String>,
    pub customers: BTreeMap<String, CustomerFacts>,
    pub suppliers_or_partners: BTreeMap<String, SupplierFacts>,
    pub competitors: BTreeMap<String, CompetitorFacts>,
    pub directors: BTreeMap<String, DirectorFacts>,
}

impl ConsolidatedRecords {
    /// UPSERT one chunk's records into the buckets. Empty-name rows are
    /// skipped.
    pub fn absorb(&mut self, chunk: &RawRecordSet) {
        self.products
            .extend(chunk.products.iter().map(|p| p.name.clone()).filter(|n| !n.is_empty()));
        for record in chunk.customers.iter().filter(|r| !r.name.is_empty()) {
            self.customers
                .entry(record.name.clone())
                .or_default()
                .absorb(record);
        }
        for record in chunk
            .suppliers_or_partners
            .iter()
            .filter(|r| !r.name.is_empty())
        {
            self.suppliers_or_partners
                .entry(record.name.clone())
                .or_default()
                .absorb(record);
        }
        for record in chunk.competitors.iter().filter(|r| !r.name.is_empty()) {
            self.competitors
                .entry(record.name.clone())
                .or_default()
                .absorb(record);
        }
        for record in chunk.directors.iter().filter(|r| !r.name.is_empty()) {
            self.directors
                .entry(record.name.clone())
                .or_default()
                .absorb(record);
        }
    }
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(",")
}

// ---------------------------------------------------------------------------
// Document summary
// ---------------------------------------------------------------------------

/// One `{ "KEY": value }` entry of the summary attribute list.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryAttribute {
    pub key: String,
    pub value: TextOrList,
}

impl Serialize for SummaryAttribute {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key, &self.value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for SummaryAttribute {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, TextOrList>::deserialize(deserializer)?;
        let (key, value) = map
            .into_iter()
            .next()
            .ok_or_else(|| serde::de::Error::custom("empty attribute object"))?;
        Ok(SummaryAttribute { key, value })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MainEntity {
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "ATTRIBUTES", default)]
    pub attributes: Vec<SummaryAttribute>,
}

/// Document-level summary centered on the main entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    #[serde(rename = "MAIN_ENTITY")]
    pub main_entity: MainEntity,
}

/// Narrative fields stripped from the short summary variant.
const NARRATIVE_SUMMARY_KEYS: [&str; 2] = [
    "SUMMARY_OF_BUSINESS_PERFORMANCE",
    "SUMMARY_OF_BUSINESS_STRATEGY",
];

impl DocumentSummary {
    /// Short variant handed to extractors: narrative fields removed.
    pub fn short(&self) -> DocumentSummary {
        let mut short = self.clone();
        short
            .main_entity
            .attributes
            .retain(|attr| !NARRATIVE_SUMMARY_KEYS.contains(&attr.key.as_str()));
        short
    }

    pub fn push_attribute(&mut self, key: &str, value: &str) {
        self.main_entity.attributes.push(SummaryAttribute {
            key: key.to_string(),
            value: TextOrList::Text(value.to_string()),
        });
    }

    /// Attributes flattened to comma-joined strings for vertex writes.
    pub fn flattened_attributes(&self) -> Vec<(String, String)> {
        self.main_entity
            .attributes
            .iter()
            .map(|attr| {
                let value = match &attr.value {
                    TextOrList::Text(s) => s.clone(),
                    TextOrList::List(items) => items.join(","),
                };
                (attr.key.clone(), value)
            })
            .collect()
    }
}
