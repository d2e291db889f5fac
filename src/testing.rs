//! Test doubles shared by the unit tests.

use crate::config::RemoteHostConfig;
use crate::error::GatewayError;
use crate::gateway::{ContentsApi, DeleteRequest, PutRequest};
use crate::record::{RiskLevel, SpeciesDraft, SpeciesRecord};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// In-memory contents API that records every call and enforces sha checks
/// the way the real API does.
#[derive(Default)]
pub struct FakeContents {
    files: RefCell<HashMap<String, String>>,
    calls: RefCell<Vec<String>>,
    puts: RefCell<Vec<(String, PutRequest)>>,
    fail_puts: Cell<Option<u16>>,
    revision: Cell<u32>,
    concurrent_writer: Cell<bool>,
}

impl FakeContents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, sha: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(path.to_string(), sha.to_string());
        self
    }

    pub fn fail_puts_with(&self, status: u16) {
        self.fail_puts.set(Some(status));
    }

    /// Make every lookup be followed by another writer changing the file,
    /// so the sha handed out is already stale when the write arrives.
    pub fn race_after_lookup(&self) {
        self.concurrent_writer.set(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn last_put(&self) -> Option<(String, PutRequest)> {
        self.puts.borrow().last().cloned()
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl ContentsApi for FakeContents {
    async fn fetch_sha(
        &self,
        _cfg: &RemoteHostConfig,
        path: &str,
    ) -> Result<Option<String>, GatewayError> {
        self.record(format!("GET {}", path));
        let sha = self.files.borrow().get(path).cloned();
        if self.concurrent_writer.get() {
            self.files
                .borrow_mut()
                .insert(path.to_string(), "someone-else".to_string());
        }
        Ok(sha)
    }

    async fn put(
        &self,
        _cfg: &RemoteHostConfig,
        path: &str,
        request: &PutRequest,
    ) -> Result<(), GatewayError> {
        self.record(format!("PUT {}", path));
        self.puts
            .borrow_mut()
            .push((path.to_string(), request.clone()));
        if let Some(status) = self.fail_puts.get() {
            return Err(GatewayError::Write {
                status,
                body: "rejected".to_string(),
            });
        }
        let current = self.files.borrow().get(path).cloned();
        if current != request.sha {
            return Err(GatewayError::Write {
                status: 409,
                body: "sha does not match".to_string(),
            });
        }
        let revision = self.revision.get() + 1;
        self.revision.set(revision);
        self.files
            .borrow_mut()
            .insert(path.to_string(), format!("rev{}", revision));
        Ok(())
    }

    async fn delete(
        &self,
        _cfg: &RemoteHostConfig,
        path: &str,
        request: &DeleteRequest,
    ) -> Result<(), GatewayError> {
        self.record(format!("DELETE {}", path));
        let mut files = self.files.borrow_mut();
        if files.get(path) != Some(&request.sha) {
            return Err(GatewayError::Write {
                status: 409,
                body: "sha does not match".to_string(),
            });
        }
        files.remove(path);
        Ok(())
    }
}

pub fn config_with_token() -> RemoteHostConfig {
    RemoteHostConfig {
        owner: "owner".to_string(),
        repo: "pics".to_string(),
        branch: "main".to_string(),
        token: "test-token".to_string(),
    }
}

pub fn draft(name: &str, risk_level: RiskLevel) -> SpeciesDraft {
    SpeciesDraft {
        name: name.to_string(),
        scientific_name: format!("{} scientificus", name),
        risk_level: Some(risk_level),
        ..Default::default()
    }
}

pub fn sample_record(id: i64, name: &str, risk_level: RiskLevel) -> SpeciesRecord {
    SpeciesRecord::from_draft(id, id, draft(name, risk_level)).expect("test draft is valid")
}
