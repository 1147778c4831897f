//! Graph writer.
//!
//! Materializes the main entity first (with the union of all leaf edge
//! descriptions as disambiguation context), then walks the four filtered
//! buckets resolving each name and writing MERGE edges. Runs as a detached
//! task signalling the orchestrator through a completion channel, since a
//! large document can take tens of minutes here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::Result;
use crate::graph::{GraphAccess, VertexId, LABEL_COMPANY, LABEL_PERSON};
use crate::ingest::records::{
    CompetitorFacts, CustomerFacts, DirectorFacts, DocumentSummary, SupplierFacts,
};
use crate::store::KvTable;

/// Edge labels written by the ingestion path.
pub const EDGE_CUSTOMER: &str = "is a customer of";
pub const EDGE_SUPPLIER: &str = "is a supplier/partner of";
pub const EDGE_COMPETITOR: &str = "is a competitor of";
pub const EDGE_DIRECTOR: &str = "is a director of";
pub const EDGE_EMPLOYEE: &str = "is an employee/director of";

/// Scratch ids of the filtered buckets to write.
#[derive(Debug, Clone)]
pub struct FinalBucketIds {
    pub customers: String,
    pub suppliers_or_partners: String,
    pub competitors: String,
    pub directors: String,
}

/// Keys written per class, reported back through the completion channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteReport {
    pub main_entity_id: VertexId,
    pub customer_keys: Vec<String>,
    pub supplier_keys: Vec<String>,
    pub competitor_keys: Vec<String>,
    pub director_keys: Vec<String>,
}

pub struct GraphWriter {
    access: Arc<GraphAccess>,
    scratch: KvTable,
}

impl GraphWriter {
    pub fn new(access: Arc<GraphAccess>, scratch: KvTable) -> Self {
        Self { access, scratch }
    }

    /// Spawn the write as a background task; the returned receiver is the
    /// orchestrator's completion token.
    pub fn spawn(
        self: Arc<Self>,
        ids: FinalBucketIds,
        summary: DocumentSummary,
    ) -> oneshot::Receiver<Result<WriteReport>> {
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let result = self.write(&ids, &summary).await;
            let _ = sender.send(result);
        });
        receiver
    }

    pub async fn write(
        &self,
        ids: &FinalBucketIds,
        summary: &DocumentSummary,
    ) -> Result<WriteReport> {
        let customers: BTreeMap<String, CustomerFacts> = self.load_bucket(&ids.customers)?;
        let suppliers: BTreeMap<String, SupplierFacts> =
            self.load_bucket(&ids.suppliers_or_partners)?;
        let competitors: BTreeMap<String, CompetitorFacts> = self.load_bucket(&ids.competitors)?;
        let directors: BTreeMap<String, DirectorFacts> = self.load_bucket(&ids.directors)?;

        let main_entity_name = summary.main_entity.name.clone();

        // The disambiguator needs the main entity's outgoing relationships
        // on first sight, so collect every leaf edge description up front.
        let mut all_edges = Vec::new();
        for (name, facts) in customers.iter().filter(|(n, _)| !n.is_empty()) {
            all_edges.push(facts.context_edge(name, &main_entity_name));
        }
        for (name, facts) in suppliers.iter().filter(|(n, _)| !n.is_empty()) {
            all_edges.push(facts.context_edge(name, &main_entity_name));
        }
        for (name, facts) in competitors.iter().filter(|(n, _)| !n.is_empty()) {
            all_edges.push(facts.context_edge(name, &main_entity_name));
        }
        for (name, facts) in directors.iter().filter(|(n, _)| !n.is_empty()) {
            all_edges.push(facts.context_edge(name, &main_entity_name));
        }

        let main_entity_id = self
            .access
            .get_or_create_id(
                LABEL_COMPANY,
                &main_entity_name,
                &summary.flattened_attributes(),
                &all_edges,
            )
            .await?;
        info!(main_entity = %main_entity_name, "main entity materialized");

        let mut report = WriteReport {
            main_entity_id: main_entity_id.clone(),
            ..Default::default()
        };

        for (name, facts) in customers.iter().filter(|(n, _)| !n.is_empty()) {
            match self
                .write_leaf(
                    LABEL_COMPANY,
                    name,
                    facts.vertex_attributes(),
                    facts.context_edge(name, &main_entity_name),
                    EDGE_CUSTOMER,
                    &main_entity_id,
                    facts.edge_properties(),
                )
                .await
            {
                Ok(()) => report.customer_keys.push(name.clone()),
                Err(e) => warn!(name = %name, "customer write failed ({e}), skipping"),
            }
        }

        for (name, facts) in suppliers.iter().filter(|(n, _)| !n.is_empty()) {
            match self
                .write_leaf(
                    LABEL_COMPANY,
                    name,
                    facts.vertex_attributes(),
                    facts.context_edge(name, &main_entity_name),
                    EDGE_SUPPLIER,
                    &main_entity_id,
                    facts.edge_properties(),
                )
                .await
            {
                Ok(()) => report.supplier_keys.push(name.clone()),
                Err(e) => warn!(name = %name, "supplier write failed ({e}), skipping"),
            }
        }

        for (name, facts) in competitors.iter().filter(|(n, _)| !n.is_empty()) {
            match self
                .write_leaf(
                    LABEL_COMPANY,
                    name,
                    facts.vertex_attributes(),
                    facts.context_edge(name, &main_entity_name),
                    EDGE_COMPETITOR,
                    &main_entity_id,
                    facts.edge_properties(),
                )
                .await
            {
                Ok(()) => report.competitor_keys.push(name.clone()),
                Err(e) => warn!(name = %name, "competitor write failed ({e}), skipping"),
            }
        }

        for (name, facts) in directors.iter().filter(|(n, _)| !n.is_empty()) {
            match self
                .write_director(name, facts, &main_entity_id, &main_entity_name)
                .await
            {
                Ok(()) => report.director_keys.push(name.clone()),
                Err(e) => warn!(name = %name, "director write failed ({e}), skipping"),
            }
        }

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_leaf(
        &self,
        label: &str,
        name: &str,
        attributes: Vec<(String, String)>,
        context_edge: String,
        edge_label: &str,
        main_entity_id: &VertexId,
        edge_properties: BTreeMap<String, String>,
    ) -> Result<()> {
        let id = self
            .access
            .get_or_create_id(label, name, &attributes, &[context_edge])
            .await?;
        self.access
            .add_or_update_edge(&id, edge_label, main_entity_id, &edge_properties)
            .await
    }

    async fn write_director(
        &self,
        name: &str,
        facts: &DirectorFacts,
        main_entity_id: &VertexId,
        main_entity_name: &str,
    ) -> Result<()> {
        let context = facts.context_edge(name, main_entity_name);
        let director_id = self
            .access
            .get_or_create_id(LABEL_PERSON, name, &facts.vertex_attributes(), &[context])
            .await?;
        self.access
            .add_or_update_edge(
                &director_id,
                EDGE_DIRECTOR,
                main_entity_id,
                &facts.edge_properties(),
            )
            .await?;

        let source = facts
            .source
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        for association in &facts.other_associations {
            if association.company_name.is_empty() {
                continue;
            }
            let attributes = vec![
                ("FOCUS_AREA".to_string(), association.focus_area.clone()),
                ("INDUSTRY".to_string(), association.industry.clone()),
                ("SOURCE".to_string(), source.clone()),
            ];
            let context = format!(
                "{name} {EDGE_EMPLOYEE} (ROLE: {}) {}",
                association.role, association.company_name
            );
            let result = async {
                let company_id = self
                    .access
                    .get_or_create_id(
                        LABEL_COMPANY,
                        &association.company_name,
                        &attributes,
                        &[context],
                    )
                    .await?;
                let edge_properties = BTreeMap::from([
                    ("ROLE".to_string(), association.role.clone()),
                    ("SOURCE".to_string(), source.clone()),
                ]);
                self.access
                    .add_or_update_edge(&director_id, EDGE_EMPLOYEE, &company_id, &edge_properties)
                    .await
            }
            .await;
            if let Err(e) = result {
                warn!(
                    director = %name,
                    company = %association.company_name,
                    "association write failed ({e}), skipping"
                );
            }
        }
        Ok(())
    }

    fn load_bucket<T: serde::de::DeserializeOwned + Default>(
        &self,
        id: &str,
    ) -> Result<BTreeMap<String, T>> {
        let item = self.scratch.get_typed::<serde_json::Value>(id)?;
        let data = item
            .get("data")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        Ok(serde_json::from_value(data)?)
    }
}
