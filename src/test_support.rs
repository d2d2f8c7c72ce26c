//! In-memory doubles for the container runtime and the HTTP transport.
//!
//! Public so integration tests under `tests/` can drive the orchestrator and
//! the query clients without a container engine or live backends.

use crate::domain::model::Network;
use crate::domain::ports::{
    ContainerHandle, ContainerRuntime, ContainerSpec, HttpResponse, HttpTransport, ReadinessSignal,
};
use crate::utils::error::{Result, StackError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A panicking test must not hide the journal from later assertions.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    CreateNetwork,
    RemoveNetwork,
    Start,
    Readiness,
    PortResolution,
    Remove,
}

#[derive(Default)]
struct MockState {
    counter: u32,
    networks: Vec<Network>,
    containers: HashMap<String, ContainerSpec>,
    removed_containers: Vec<String>,
    removed_networks: Vec<String>,
    journal: Vec<String>,
    failures: Vec<(MockFailure, String)>,
}

pub struct MockRuntime {
    state: Mutex<MockState>,
    host: String,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            host: "localhost".to_string(),
        }
    }

    /// Fail `failure` for containers whose name contains `target`.
    /// Network failures ignore the target.
    pub fn fail_on(&self, failure: MockFailure, target: &str) {
        lock(&self.state)
            .failures
            .push((failure, target.to_string()));
    }

    pub fn journal(&self) -> Vec<String> {
        lock(&self.state).journal.clone()
    }

    pub fn created_networks(&self) -> Vec<Network> {
        lock(&self.state).networks.clone()
    }

    pub fn removed_networks(&self) -> Vec<String> {
        lock(&self.state).removed_networks.clone()
    }

    /// Container names in the order they were removed.
    pub fn removed_containers(&self) -> Vec<String> {
        lock(&self.state).removed_containers.clone()
    }

    /// Names of containers started and not yet removed, sorted.
    pub fn running_containers(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut names: Vec<String> = state
            .containers
            .keys()
            .filter(|name| !state.removed_containers.contains(name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Spec of the container whose name starts with `prefix`.
    pub fn spec_for(&self, prefix: &str) -> Option<ContainerSpec> {
        let state = lock(&self.state);
        state
            .containers
            .iter()
            .find(|(name, _)| name.starts_with(prefix))
            .map(|(_, spec)| spec.clone())
    }

    fn should_fail(state: &MockState, failure: MockFailure, name: &str) -> bool {
        state
            .failures
            .iter()
            .any(|(f, target)| *f == failure && name.contains(target.as_str()))
    }

    fn injected(failure: MockFailure, name: &str) -> StackError {
        StackError::RuntimeError {
            command: format!("{:?} {}", failure, name),
            message: "injected failure".to_string(),
        }
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_network(&self) -> Result<Network> {
        let mut state = lock(&self.state);
        state.counter += 1;
        let name = format!("mock-network-{}", state.counter);
        state.journal.push(format!("create_network {}", name));
        if Self::should_fail(&state, MockFailure::CreateNetwork, &name) {
            return Err(Self::injected(MockFailure::CreateNetwork, &name));
        }
        let network = Network::new(format!("id-{}", name), name);
        state.networks.push(network.clone());
        Ok(network)
    }

    async fn remove_network(&self, network: &Network) -> Result<()> {
        let mut state = lock(&self.state);
        state.journal.push(format!("remove_network {}", network.name));
        if Self::should_fail(&state, MockFailure::RemoveNetwork, &network.name) {
            return Err(Self::injected(MockFailure::RemoveNetwork, &network.name));
        }
        state.removed_networks.push(network.name.clone());
        Ok(())
    }

    async fn start_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let mut state = lock(&self.state);
        state.counter += 1;
        let name = format!("{}-{}", spec.name_prefix, state.counter);
        state.journal.push(format!("start {}", name));
        if Self::should_fail(&state, MockFailure::Start, &name) {
            return Err(Self::injected(MockFailure::Start, &name));
        }
        state.containers.insert(name.clone(), spec.clone());
        Ok(ContainerHandle {
            id: format!("id-{}", name),
            name,
        })
    }

    async fn wait_ready(&self, container: &ContainerHandle, _signal: &ReadinessSignal) -> Result<()> {
        let mut state = lock(&self.state);
        state.journal.push(format!("wait_ready {}", container.name));
        if Self::should_fail(&state, MockFailure::Readiness, &container.name) {
            return Err(Self::injected(MockFailure::Readiness, &container.name));
        }
        Ok(())
    }

    async fn mapped_port(&self, container: &ContainerHandle, port: u16) -> Result<u16> {
        let mut state = lock(&self.state);
        state.journal.push(format!("port {} {}", container.name, port));
        if Self::should_fail(&state, MockFailure::PortResolution, &container.name) {
            return Err(Self::injected(MockFailure::PortResolution, &container.name));
        }
        state.counter += 1;
        Ok(40000 + state.counter as u16)
    }

    async fn remove_container(&self, container: &ContainerHandle) -> Result<()> {
        let mut state = lock(&self.state);
        state.journal.push(format!("remove {}", container.name));
        state.removed_containers.push(container.name.clone());
        if Self::should_fail(&state, MockFailure::Remove, &container.name) {
            return Err(Self::injected(MockFailure::Remove, &container.name));
        }
        Ok(())
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Replays queued responses in order, then the fallback if one is set.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    fallback: Mutex<Option<HttpResponse>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_body(&self, status: u16, body: &str) {
        lock(&self.responses).push_back(HttpResponse {
            status,
            body: body.to_string(),
        });
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push_body(status, &body.to_string());
    }

    pub fn push_status(&self, status: u16) {
        self.push_body(status, "");
    }

    pub fn set_fallback_json(&self, status: u16, body: serde_json::Value) {
        *lock(&self.fallback) = Some(HttpResponse {
            status,
            body: body.to_string(),
        });
    }

    pub fn set_fallback_status(&self, status: u16) {
        *lock(&self.fallback) = Some(HttpResponse {
            status,
            body: String::new(),
        });
    }

    /// Every endpoint requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, endpoint: &str) -> Result<HttpResponse> {
        lock(&self.requests).push(endpoint.to_string());

        if let Some(response) = lock(&self.responses).pop_front() {
            return Ok(response);
        }

        lock(&self.fallback)
            .clone()
            .ok_or_else(|| StackError::config(format!("no scripted response left for {}", endpoint)))
    }
}
