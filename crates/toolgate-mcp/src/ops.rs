//! Synchronous operation facade over provider sessions.
//!
//! Each method opens a fresh session, performs exactly one protocol
//! operation, normalizes the payload and tears the session down. The
//! methods are synchronous; the async transport work runs through
//! [`crate::bridge`], so they can be called from request handlers and
//! worker threads alike.

use std::collections::HashMap;

use serde_json::Value;
use toolgate_core::{
    InvocationResult, ProviderConfig, ProviderError, ResourceDescriptor, ResourceReadResult,
    ToolDescriptor,
};

use crate::bridge;
use crate::decode;
use crate::session::{SessionError, SessionFactory};

const RESOURCES_UNSUPPORTED: &str = "Provider does not support resources";

/// Tool and resource operations against one configured provider.
pub struct ProviderOperations {
    provider_id: String,
    config: ProviderConfig,
    factory: SessionFactory,
}

impl ProviderOperations {
    pub fn new(
        provider_id: impl Into<String>,
        config: ProviderConfig,
        factory: SessionFactory,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            config,
            factory,
        }
    }

    /// List the tools the provider exposes.
    pub fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError> {
        bridge::run_to_completion(self.list_tools_async())
    }

    /// Invoke a tool by name. Provider-reported tool failures come back
    /// as an unsuccessful [`InvocationResult`], not as an `Err`.
    pub fn call_tool(
        &self,
        tool_name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<InvocationResult, ProviderError> {
        bridge::run_to_completion(self.call_tool_async(tool_name, arguments))
    }

    /// List the resources the provider exposes. Providers without
    /// resource support yield an empty list.
    pub fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, ProviderError> {
        bridge::run_to_completion(self.list_resources_async())
    }

    /// Read one resource by URI. Providers without resource support
    /// yield an unsuccessful result with an explanatory message.
    pub fn read_resource(&self, uri: &str) -> Result<ResourceReadResult, ProviderError> {
        bridge::run_to_completion(self.read_resource_async(uri))
    }

    async fn list_tools_async(&self) -> Result<Vec<ToolDescriptor>, ProviderError> {
        let session = self.factory.open(&self.provider_id, &self.config).await?;
        let response = session
            .list_tools()
            .await
            .map_err(SessionError::into_op_error)?;
        let tools = decode::tool_list(&response)?;
        tracing::info!(
            provider_id = %self.provider_id,
            count = tools.len(),
            "Listed provider tools"
        );
        Ok(tools)
    }

    async fn call_tool_async(
        &self,
        tool_name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<InvocationResult, ProviderError> {
        let session = self.factory.open(&self.provider_id, &self.config).await?;
        let response = session
            .call_tool(tool_name, &arguments)
            .await
            .map_err(SessionError::into_op_error)?;

        let content = decode::content_items(response.get("content"));
        let is_error = response
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if is_error {
            let message = decode::first_text(&content).unwrap_or("Unknown tool error");
            tracing::warn!(
                provider_id = %self.provider_id,
                tool = %tool_name,
                error = %message,
                "Tool reported failure"
            );
            let message = message.to_string();
            Ok(InvocationResult::error(tool_name, content, message))
        } else {
            tracing::info!(
                provider_id = %self.provider_id,
                tool = %tool_name,
                items = content.len(),
                "Tool call succeeded"
            );
            Ok(InvocationResult::success(tool_name, content))
        }
    }

    async fn list_resources_async(&self) -> Result<Vec<ResourceDescriptor>, ProviderError> {
        let session = self.factory.open(&self.provider_id, &self.config).await?;
        match session.list_resources().await {
            Ok(response) => {
                let resources = decode::resource_list(&response)?;
                tracing::info!(
                    provider_id = %self.provider_id,
                    count = resources.len(),
                    "Listed provider resources"
                );
                Ok(resources)
            }
            Err(e) if e.is_resource_unsupported() => {
                tracing::warn!(
                    provider_id = %self.provider_id,
                    error = %e,
                    "Provider does not support resource listing"
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e.into_op_error()),
        }
    }

    async fn read_resource_async(&self, uri: &str) -> Result<ResourceReadResult, ProviderError> {
        let session = self.factory.open(&self.provider_id, &self.config).await?;
        match session.read_resource(uri).await {
            Ok(response) => {
                let content = decode::content_items(response.get("contents"));
                Ok(ResourceReadResult::success(uri, content))
            }
            Err(e) if e.is_resource_unsupported() => {
                tracing::warn!(
                    provider_id = %self.provider_id,
                    uri = %uri,
                    error = %e,
                    "Provider does not support resource reads"
                );
                Ok(ResourceReadResult::error(uri, RESOURCES_UNSUPPORTED))
            }
            Err(e) => Err(e.into_op_error()),
        }
    }
}
