//! Terraform Data Sources for Kowabunga
//!
//! Every data source looks an object up by name and exposes its ID.

use crate::engine::SCHEMA_VERSION;
use crate::error::ProviderError;
use crate::resolver::resolve;
use crate::resources::{ResourceResult, ResourceState};
use crate::schema::{Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::session::Session;
use crate::timeouts::Operation;
use crate::validators::validate_block;
use async_trait::async_trait;
use kowabunga_common::Kind;
use serde_json::Value;

/// Data source trait
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &str;

    fn schema(&self) -> ResourceSchema;

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic>;

    async fn read(&self, session: &Session, config: &ResourceState)
        -> ResourceResult<ResourceState>;
}

/// Name to ID lookup of one kind of object
pub struct NamedLookup {
    type_name: &'static str,
    kind: Kind,
}

impl NamedLookup {
    pub const fn new(type_name: &'static str, kind: Kind) -> Self {
        Self { type_name, kind }
    }
}

#[async_trait]
impl DataSource for NamedLookup {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description(&format!("Name of the {}", self.kind))
                    .required(),
            )
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description(&format!("{} identifier", self.kind))
                    .computed(),
            )
            .with_description(&format!("Looks up a {} by name", self.kind));

        ResourceSchema::new(SCHEMA_VERSION, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        validate_block(&self.schema().block, &config.to_object(), &[])
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = %self.kind))]
    async fn read(
        &self,
        session: &Session,
        config: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let name = config.get_string("name").ok_or_else(|| {
            vec![Diagnostic::error("Missing required argument")
                .with_detail("The argument \"name\" is required")
                .with_attribute(vec!["name".to_string()])]
        })?;

        let _guard = session.lock().await;
        let after = Operation::Read.default_timeout();

        let result = tokio::time::timeout(after, resolve(session.client(), self.kind, &name))
            .await
            .map_err(|_| ProviderError::Timeout {
                operation: Operation::Read,
                after,
            })
            .and_then(|resolved| resolved);

        match result {
            Ok(id) => {
                let mut state = config.clone();
                state.set("id", Value::from(id));
                Ok(state)
            }
            Err(e) => Err(vec![e.to_diagnostic(&format!("Failed to read {}", self.kind))]),
        }
    }
}

/// Get all available data sources
pub fn get_all_data_sources() -> Vec<Box<dyn DataSource>> {
    const LOOKUPS: &[(&str, Kind)] = &[
        ("kowabunga_region", Kind::Region),
        ("kowabunga_zone", Kind::Zone),
        ("kowabunga_host", Kind::Host),
        ("kowabunga_storage_pool", Kind::StoragePool),
        ("kowabunga_storage_nfs", Kind::StorageNfs),
        ("kowabunga_template", Kind::Template),
        ("kowabunga_netgw", Kind::NetGw),
        ("kowabunga_vnet", Kind::VNet),
        ("kowabunga_subnet", Kind::Subnet),
        ("kowabunga_user", Kind::User),
        ("kowabunga_team", Kind::Team),
        ("kowabunga_project", Kind::Project),
    ];

    LOOKUPS
        .iter()
        .map(|&(type_name, kind)| Box::new(NamedLookup::new(type_name, kind)) as Box<dyn DataSource>)
        .collect()
}
