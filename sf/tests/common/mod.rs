//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use specflow::config::BackoffKind;
use specflow::{AgentGateway, ApprovalLedger, Config, FsArtifactStore, GatewayError, StateStore, WorkflowEngine};

pub const CONSTITUTION: &str = "# Constitution

## I. Simplicity
Keep the service small.

## II. Test-First
Tests are written before code.
";

pub const SPEC: &str = "# Todo API

Users manage a list of **Task** items kept in a **TaskStore**.
";

pub const PLAN: &str = "# Implementation Plan

## Technical Context
Python 3.10+ with FastAPI, pytest.

## Constitution Check
- Simplicity: a single service
- Test-First: pytest suite per route

## Components
- TaskStore: persists each Task
- Routes: HTTP handlers over the TaskStore
";

pub const TASKS: &str = "# Tasks

## Phase 1: Setup
- [ ] T001 [US1] Create the app entry point in src/main.py

## Phase 2: Foundational
- [ ] T002 [US1] Implement TaskStore in src/store.py (depends on T001)
- [ ] T003 [US1] Add task routes in src/routes.py (depends on T002)
";

pub const IMPLEMENTATION: &str = "# Implementation

## Task T001
**File**: src/main.py
```python
from fastapi import FastAPI

app = FastAPI()
```

## Task T002
**File**: src/store.py
```python
class TaskStore:
    pass
```

## Task T003
**File**: src/routes.py
```python
from src.main import app
```
";

/// Implementation that never mentions T003
pub const IMPLEMENTATION_WITHOUT_T003: &str = "# Implementation

## Task T001
**File**: src/main.py
```python
app = None
```

## Task T002
**File**: src/store.py
```python
class TaskStore:
    pass
```
";

pub fn timeout() -> Result<String, GatewayError> {
    Err(GatewayError::Timeout(Duration::from_millis(10)))
}

/// Replays canned results in order and records every prompt it receives
///
/// Once the script runs out the gateway either hangs or answers `Empty`.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<String, GatewayError>>>,
    prompts: Mutex<Vec<String>>,
    hang_when_exhausted: bool,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
            hang_when_exhausted: false,
        }
    }

    /// Full run: plan, tasks, implementation
    pub fn happy() -> Self {
        Self::new(vec![
            Ok(PLAN.to_string()),
            Ok(TASKS.to_string()),
            Ok(IMPLEMENTATION.to_string()),
        ])
    }

    pub fn hanging(mut self) -> Self {
        self.hang_when_exhausted = true;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentGateway for ScriptedGateway {
    async fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String, GatewayError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None if self.hang_when_exhausted => std::future::pending().await,
            None => Err(GatewayError::Empty),
        }
    }
}

/// Config with no backoff so retries run instantly
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.generation.backoff = BackoffKind::None;
    config.gateway.timeout_ms = 1_000;
    config
}

/// Working directory holding both seed documents
pub fn seeded_dir() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_seeds(temp.path());
    temp
}

pub fn write_seeds(dir: &Path) {
    std::fs::write(dir.join("constitution.md"), CONSTITUTION).unwrap();
    std::fs::write(dir.join("spec.md"), SPEC).unwrap();
}

/// Engine rooted at `dir` with checkpoints and a persistent ledger
pub async fn engine(dir: &Path, config: Config, gateway: Arc<ScriptedGateway>) -> WorkflowEngine {
    let state_dir = dir.join(&config.layout.state_dir);
    let ledger = ApprovalLedger::open(state_dir.join("approvals.jsonl")).await.unwrap();
    WorkflowEngine::new(config, gateway, Arc::new(FsArtifactStore::new(dir)))
        .with_state_store(StateStore::new(&state_dir))
        .with_ledger(Arc::new(ledger))
}
