//! Terraform Provider Implementation
//!
//! Implements the Terraform Plugin Protocol for Kowabunga.

use crate::client::KowabungaClient;
use crate::data_sources::{get_all_data_sources, DataSource};
use crate::error::ProviderError;
use crate::resources::{get_all_resources, Resource, ResourceState};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock,
};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Environment variable holding the API URI
pub const URI_ENV: &str = "KOWABUNGA_URI";
/// Environment variable holding the API token
pub const TOKEN_ENV: &str = "KOWABUNGA_TOKEN";

/// Provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub uri: Option<String>,
    pub token: Option<String>,
}

impl ProviderConfig {
    /// Fill unset or empty values from `lookup`, usually the process environment
    pub fn with_fallback<F>(self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |value: Option<String>, var: &str| {
            value
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(var).filter(|v| !v.is_empty()))
        };

        Self {
            uri: pick(self.uri, URI_ENV),
            token: pick(self.token, TOKEN_ENV),
        }
    }

    fn from_params(params: &Value) -> Self {
        params
            .get("config")
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .unwrap_or_default()
    }
}

/// Kowabunga Terraform Provider
pub struct KowabungaProvider {
    session: RwLock<Option<Arc<Session>>>,
    resources: HashMap<String, Box<dyn Resource>>,
    data_sources: HashMap<String, Box<dyn DataSource>>,
}

fn state_param(params: &Value, key: &str) -> Option<ResourceState> {
    params.get(key).and_then(ResourceState::from_value)
}

fn type_name(params: &Value) -> &str {
    params
        .get("type_name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

impl KowabungaProvider {
    /// Create a new provider
    pub fn new() -> Self {
        let resources = get_all_resources()
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();

        let data_sources = get_all_data_sources()
            .into_iter()
            .map(|d| (d.type_name().to_string(), d))
            .collect();

        Self {
            session: RwLock::new(None),
            resources,
            data_sources,
        }
    }

    /// Get provider schema
    fn get_schema(&self) -> ProviderSchema {
        let provider_block = SchemaBlock::new()
            .with_attribute(
                "uri",
                SchemaAttribute::string()
                    .with_description(&format!(
                        "Kowabunga API URI (e.g., https://kowabunga.example.com). Defaults to ${}",
                        URI_ENV
                    ))
                    .optional(),
            )
            .with_attribute(
                "token",
                SchemaAttribute::string()
                    .with_description(&format!("Kowabunga API token. Defaults to ${}", TOKEN_ENV))
                    .optional()
                    .sensitive(),
            )
            .with_description("Kowabunga private cloud provider");

        let mut schema = ProviderSchema::new(provider_block);

        for (name, resource) in &self.resources {
            schema = schema.with_resource(name, resource.schema());
        }
        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(name, data_source.schema());
        }

        schema
    }

    /// Check the provider configuration without connecting
    fn validate_config(&self, config: &ProviderConfig) -> Vec<Diagnostic> {
        match &config.uri {
            Some(uri) if reqwest::Url::parse(uri).is_err() => {
                vec![Diagnostic::error("Invalid provider configuration")
                    .with_detail(&format!("\"{}\" is not a valid URI", uri))
                    .with_attribute(vec!["uri".to_string()])]
            }
            _ => Vec::new(),
        }
    }

    /// Configure the provider
    fn configure(&self, config: ProviderConfig) -> Vec<Diagnostic> {
        let config = config.with_fallback(|var| std::env::var(var).ok());

        let Some(uri) = config.uri else {
            return vec![Diagnostic::error("Missing Kowabunga API URI")
                .with_detail(&format!("Set the \"uri\" attribute or ${}", URI_ENV))
                .with_attribute(vec!["uri".to_string()])];
        };
        let Some(token) = config.token else {
            return vec![Diagnostic::error("Missing Kowabunga API token")
                .with_detail(&format!("Set the \"token\" attribute or ${}", TOKEN_ENV))
                .with_attribute(vec!["token".to_string()])];
        };

        let client = match KowabungaClient::new(&uri) {
            Ok(client) => client.with_token(&token),
            Err(e) => {
                return vec![ProviderError::from(e).to_diagnostic("Unable to create API client")]
            }
        };

        tracing::info!("Configured provider for {}", client.base_url());

        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Session::new(client)));

        Vec::new()
    }

    /// Get the configured session
    fn get_session(&self) -> Result<Arc<Session>, Diagnostic> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                Diagnostic::error("Provider not configured")
                    .with_detail(&ProviderError::NotConfigured.to_string())
            })
    }

    fn get_resource(&self, type_name: &str) -> Result<&dyn Resource, Diagnostic> {
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("Unknown resource type: {}", type_name)))
    }

    fn get_data_source(&self, type_name: &str) -> Result<&dyn DataSource, Diagnostic> {
        self.data_sources
            .get(type_name)
            .map(|d| d.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("Unknown data source type: {}", type_name)))
    }

    /// Handle an RPC request
    pub async fn handle_request(&self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    -32700,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        tracing::debug!("Handling {} (request {})", request.method, request.id);

        let id = request.id;
        let params = &request.params;
        let response = match request.method.as_str() {
            "GetProviderSchema" => self.handle_get_schema(id),
            "ValidateProviderConfig" => RpcResponse::diagnostics(
                id,
                self.validate_config(&ProviderConfig::from_params(params)),
            ),
            "ConfigureProvider" => {
                RpcResponse::diagnostics(id, self.configure(ProviderConfig::from_params(params)))
            }
            "ValidateResourceConfig" => self.handle_validate_resource(id, params),
            "ValidateDataResourceConfig" => self.handle_validate_data_source(id, params),
            "PlanResourceChange" => self.handle_plan_resource(id, params),
            "ApplyResourceChange" => self.handle_apply_resource(id, params).await,
            "ReadResource" => self.handle_read_resource(id, params).await,
            "ImportResourceState" => self.handle_import_resource(id, params),
            "ReadDataSource" => self.handle_read_data_source(id, params).await,
            "StopProvider" => RpcResponse::success(id, json!({})),
            _ => RpcResponse::error(id, -32601, &format!("Method not found: {}", request.method)),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                id,
                -32603,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    /// Handle GetProviderSchema
    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        let schema = self.get_schema();
        RpcResponse::success(id, serde_json::to_value(schema).unwrap_or_default())
    }

    /// Handle ValidateResourceConfig
    fn handle_validate_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.get_resource(type_name(params)) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();
        RpcResponse::diagnostics(id, resource.validate(&config))
    }

    /// Handle ValidateDataResourceConfig
    fn handle_validate_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let data_source = match self.get_data_source(type_name(params)) {
            Ok(d) => d,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();
        RpcResponse::diagnostics(id, data_source.validate(&config))
    }

    /// Handle PlanResourceChange
    fn handle_plan_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.get_resource(type_name(params)) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        // Destroy plan
        let Some(proposed_state) = state_param(params, "proposed_new_state") else {
            return RpcResponse::success(id, json!({"planned_state": null, "diagnostics": []}));
        };
        let prior_state = state_param(params, "prior_state");

        match resource.plan_change(prior_state.as_ref(), &proposed_state) {
            Ok(planned) => {
                let requires_replace = prior_state
                    .as_ref()
                    .map(|prior| resource.requires_replace(prior, &planned))
                    .unwrap_or_default();

                RpcResponse::success(
                    id,
                    json!({
                        "planned_state": planned.values,
                        "requires_replace": requires_replace,
                        "diagnostics": []
                    }),
                )
            }
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }

    /// Handle ApplyResourceChange
    async fn handle_apply_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.get_resource(type_name(params)) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let planned_state = state_param(params, "planned_state");
        let prior_state = state_param(params, "prior_state");

        let result = match (prior_state, planned_state) {
            (Some(prior), None) => resource.delete(&session, &prior).await.map(|_| None),
            (None, None) => Ok(None),
            (None, Some(planned)) => resource.create(&session, &planned).await.map(Some),
            (Some(prior), Some(planned)) => {
                resource.update(&session, &prior, &planned).await.map(Some)
            }
        };

        match result {
            Ok(Some(new_state)) => RpcResponse::success(
                id,
                json!({
                    "new_state": new_state.values,
                    "diagnostics": []
                }),
            ),
            Ok(None) => RpcResponse::success(
                id,
                json!({
                    "new_state": null,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }

    /// Handle ReadResource
    async fn handle_read_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.get_resource(type_name(params)) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let current_state = state_param(params, "current_state").unwrap_or_default();

        match resource.read(&session, &current_state).await {
            // Resource no longer exists
            Ok(state) if state.is_empty() => RpcResponse::success(
                id,
                json!({
                    "new_state": null,
                    "diagnostics": []
                }),
            ),
            Ok(state) => RpcResponse::success(
                id,
                json!({
                    "new_state": state.values,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }

    /// Handle ImportResourceState: the ID is taken as is and the next
    /// ReadResource fills in the rest
    fn handle_import_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = type_name(params);
        if let Err(diag) = self.get_resource(type_name) {
            return RpcResponse::diagnostics(id, vec![diag]);
        }

        let resource_id = match params.get("id").and_then(|v| v.as_str()) {
            Some(rid) if !rid.is_empty() => rid,
            _ => {
                return RpcResponse::diagnostics(
                    id,
                    vec![Diagnostic::error("Import ID is required")],
                )
            }
        };

        RpcResponse::success(
            id,
            json!({
                "imported_resources": [{
                    "type_name": type_name,
                    "state": {"id": resource_id}
                }],
                "diagnostics": []
            }),
        )
    }

    /// Handle ReadDataSource
    async fn handle_read_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let data_source = match self.get_data_source(type_name(params)) {
            Ok(d) => d,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();

        match data_source.read(&session, &config).await {
            Ok(state) => RpcResponse::success(
                id,
                json!({
                    "state": state.values,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }
}

impl Default for KowabungaProvider {
    fn default() -> Self {
        Self::new()
    }
}
