//! Consul registry client
//!
//! Talks to the Consul agent HTTP API: health-filtered service listings with
//! blocking-query (long-poll) support, and service registration backed by a
//! TTL check that this client keeps alive with a background heartbeat task.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::ConsulConfig;
use crate::error::{CoxswainError, Result};
use crate::registry::traits::{Registry, ServiceDescriptor};
use async_trait::async_trait;

/// Consul implementation of the [`Registry`] trait
pub struct ConsulRegistry {
    config: ConsulConfig,
    client: reqwest::Client,
    // One heartbeat task per registered service id; dropping the sender
    // stops the task.
    heartbeats: Mutex<HashMap<String, watch::Sender<()>>>,
}

impl std::fmt::Debug for ConsulRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulRegistry")
            .field("config", &self.config)
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

/// True when the entry's own `service:<id>` check reports passing. Entries
/// registered without such a check are skipped.
fn service_check_passing(service_id: &str, checks: &Value) -> bool {
    let check_id = format!("service:{}", service_id);
    match checks.as_array() {
        Some(checks) => checks.iter().any(|check| {
            check["CheckID"].as_str() == Some(check_id.as_str())
                && check["Status"].as_str() == Some("passing")
        }),
        None => false,
    }
}

/// Extract a version from the `version:<v>` tag convention.
fn version_from_tags(tags: &[String]) -> Option<String> {
    tags.iter()
        .find_map(|tag| tag.strip_prefix("version:"))
        .map(|v| v.to_string())
}

/// Convert one entry of a `/v1/health/service/<name>` response into a
/// descriptor.
fn parse_entry(entry: &Value) -> Result<ServiceDescriptor> {
    let service = entry
        .get("Service")
        .ok_or_else(|| CoxswainError::backend("Missing Service in Consul response"))?;
    let node = entry
        .get("Node")
        .ok_or_else(|| CoxswainError::backend("Missing Node in Consul response"))?;

    let id = service["ID"]
        .as_str()
        .ok_or_else(|| CoxswainError::backend("Missing Service.ID in Consul response"))?;
    let name = service["Service"]
        .as_str()
        .ok_or_else(|| CoxswainError::backend("Missing Service.Service in Consul response"))?;
    let port = service["Port"]
        .as_u64()
        .ok_or_else(|| CoxswainError::backend("Missing or invalid Service.Port"))?
        as u16;

    let tags: Vec<String> = service["Tags"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    Ok(ServiceDescriptor {
        id: id.to_string(),
        service: name.to_string(),
        version: version_from_tags(&tags),
        tags,
        address: service["Address"].as_str().unwrap_or("").to_string(),
        port,
        create_index: service["CreateIndex"].as_u64().unwrap_or(0),
        modify_index: service["ModifyIndex"].as_u64().unwrap_or(0),
        node_id: node["ID"].as_str().unwrap_or("").to_string(),
        node: node["Node"].as_str().unwrap_or("").to_string(),
        node_address: node["Address"].as_str().unwrap_or("").to_string(),
        datacenter: node["Datacenter"].as_str().unwrap_or("").to_string(),
    })
}

impl ConsulRegistry {
    /// Create a new Consul registry client
    pub fn new(config: ConsulConfig) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| CoxswainError::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            heartbeats: Mutex::new(HashMap::new()),
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.header("X-Consul-Token", token),
            None => request,
        }
    }

    /// Check that the Consul agent is reachable
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/v1/status/leader", self.config.address);
        let response = self.authed(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            return Err(CoxswainError::backend(format!(
                "Consul leader query failed: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Spawn the heartbeat task keeping the TTL check of `service_id` passing.
    /// Replaces (and thereby stops) any previous heartbeat for the same id.
    async fn start_heartbeat(&self, service_id: &str, ttl: Duration) {
        let (tx, mut rx) = watch::channel(());

        let client = self.client.clone();
        let config = self.config.clone();
        let id = service_id.to_string();
        // Report at half the TTL so one missed beat does not expire the check.
        let beat = ttl / 2;

        tokio::spawn(async move {
            let check_id = format!("service:{}", id);
            info!(service_id = %id, "consul: ttl heartbeat started");
            loop {
                let url = format!("{}/v1/agent/check/update/{}", config.address, check_id);
                let mut request = client.put(&url).json(&serde_json::json!({
                    "Status": "passing"
                }));
                if let Some(token) = &config.token {
                    request = request.header("X-Consul-Token", token);
                }
                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!(service_id = %id, "consul: ttl updated");
                    }
                    Ok(response) => {
                        warn!(
                            service_id = %id,
                            status = %response.status(),
                            "consul: ttl update rejected"
                        );
                    }
                    Err(e) => {
                        warn!(service_id = %id, error = %e, "consul: ttl update failed");
                    }
                }

                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(beat) => {}
                }
            }
            info!(service_id = %id, "consul: ttl heartbeat stopped");
        });

        let mut heartbeats = self.heartbeats.lock().await;
        heartbeats.insert(service_id.to_string(), tx);
    }

    async fn stop_heartbeat(&self, service_id: &str) {
        let mut heartbeats = self.heartbeats.lock().await;
        heartbeats.remove(service_id);
    }
}

#[async_trait]
impl Registry for ConsulRegistry {
    async fn list_instances(
        &self,
        service: &str,
        tag: &str,
        wait_index: u64,
    ) -> Result<(Vec<ServiceDescriptor>, u64)> {
        let url = format!("{}/v1/health/service/{}", self.config.address, service);
        let mut request = self.client.get(&url).query(&[("passing", "true")]);

        if !tag.is_empty() {
            request = request.query(&[("tag", tag)]);
        }
        if let Some(dc) = &self.config.datacenter {
            request = request.query(&[("dc", dc)]);
        }
        if wait_index > 0 {
            request = request.query(&[
                ("index", wait_index.to_string()),
                ("wait", format!("{}s", self.config.wait_time.as_secs())),
            ]);
        }

        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| CoxswainError::network(format!("Failed to query Consul: {}", e)))?;

        if !response.status().is_success() {
            return Err(CoxswainError::backend(format!(
                "Consul API error: HTTP {}",
                response.status()
            )));
        }

        let new_index = response
            .headers()
            .get("X-Consul-Index")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                CoxswainError::backend("Missing or invalid X-Consul-Index in Consul response")
            })?;

        let entries: Vec<Value> = response
            .json()
            .await
            .map_err(|e| CoxswainError::backend(format!("Failed to parse Consul response: {}", e)))?;

        let mut instances = Vec::new();
        for entry in &entries {
            match parse_entry(entry) {
                Ok(descriptor) => {
                    if service_check_passing(&descriptor.id, &entry["Checks"]) {
                        instances.push(descriptor);
                    }
                }
                Err(e) => {
                    warn!(service = %service, error = %e, "consul: skipping malformed entry");
                }
            }
        }

        debug!(
            service = %service,
            instances = instances.len(),
            index = new_index,
            "consul: listed instances"
        );

        Ok((instances, new_index))
    }

    async fn register(&self, descriptor: &ServiceDescriptor, ttl: Duration) -> Result<()> {
        let registration = serde_json::json!({
            "ID": descriptor.id,
            "Name": descriptor.service,
            "Tags": descriptor.tags,
            "Address": descriptor.address,
            "Port": descriptor.port,
            "Check": {
                "TTL": format!("{}s", ttl.as_secs()),
                "TLSSkipVerify": self.config.tls_skip_verify,
            }
        });

        let url = format!("{}/v1/agent/service/register", self.config.address);
        let response = self
            .authed(self.client.put(&url).json(&registration))
            .send()
            .await
            .map_err(|e| CoxswainError::registration(format!("Failed to reach Consul: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(CoxswainError::registration(format!(
                "Consul registration failed: HTTP {} - {}",
                status, body
            )));
        }

        self.start_heartbeat(&descriptor.id, ttl).await;
        info!(service_id = %descriptor.id, service = %descriptor.service, "consul: registered service");
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> Result<()> {
        self.stop_heartbeat(service_id).await;

        let url = format!(
            "{}/v1/agent/service/deregister/{}",
            self.config.address, service_id
        );
        let response = self
            .authed(self.client.put(&url))
            .send()
            .await
            .map_err(|e| CoxswainError::network(format!("Failed to reach Consul: {}", e)))?;

        if !response.status().is_success() {
            return Err(CoxswainError::backend(format!(
                "Consul deregistration failed: HTTP {}",
                response.status()
            )));
        }

        info!(service_id = %service_id, "consul: deregistered service");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Value {
        serde_json::json!({
            "Node": {
                "ID": "node-uuid",
                "Node": "worker-1",
                "Address": "192.168.1.10",
                "Datacenter": "dc1"
            },
            "Service": {
                "ID": "web-1",
                "Service": "web",
                "Tags": ["primary", "version:2.1.0"],
                "Address": "10.0.0.1",
                "Port": 8080,
                "CreateIndex": 10,
                "ModifyIndex": 20
            },
            "Checks": [
                { "CheckID": "serfHealth", "Status": "passing" },
                { "CheckID": "service:web-1", "Status": "passing" }
            ]
        })
    }

    #[test]
    fn test_parse_entry() {
        let entry = sample_entry();
        let descriptor = parse_entry(&entry).expect("parse entry");

        assert_eq!(descriptor.id, "web-1");
        assert_eq!(descriptor.service, "web");
        assert_eq!(descriptor.address, "10.0.0.1");
        assert_eq!(descriptor.port, 8080);
        assert_eq!(descriptor.version.as_deref(), Some("2.1.0"));
        assert_eq!(descriptor.node, "worker-1");
        assert_eq!(descriptor.node_address, "192.168.1.10");
        assert_eq!(descriptor.datacenter, "dc1");
        assert_eq!(descriptor.create_index, 10);
        assert_eq!(descriptor.modify_index, 20);
        assert_eq!(descriptor.host_port(), "10.0.0.1:8080");
    }

    #[test]
    fn test_parse_entry_missing_fields() {
        let entry = serde_json::json!({ "Service": { "ID": "web-1" } });
        assert!(parse_entry(&entry).is_err());

        let entry = serde_json::json!({ "Node": {}, "Service": { "Service": "web", "Port": 80 } });
        assert!(parse_entry(&entry).is_err());
    }

    #[test]
    fn test_service_check_filter() {
        let entry = sample_entry();
        assert!(service_check_passing("web-1", &entry["Checks"]));
        assert!(!service_check_passing("web-2", &entry["Checks"]));

        let critical = serde_json::json!([
            { "CheckID": "service:web-1", "Status": "critical" }
        ]);
        assert!(!service_check_passing("web-1", &critical));
        assert!(!service_check_passing("web-1", &Value::Null));
    }

    #[test]
    fn test_version_from_tags() {
        let tags = vec!["primary".to_string(), "version:1.0.3".to_string()];
        assert_eq!(version_from_tags(&tags).as_deref(), Some("1.0.3"));
        assert_eq!(version_from_tags(&["primary".to_string()]), None);
        assert_eq!(version_from_tags(&[]), None);
    }
}
