// SPDX-License-Identifier: MIT

//! Scripted engine for tests.

use super::{Engine, EngineError, EngineKind, EngineMetadata, EngineRequest, EngineResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Engine that replays canned responses and records requests.
pub struct ScriptedEngine {
    metadata: EngineMetadata,
    available: bool,
    responses: Mutex<VecDeque<Result<EngineResponse, EngineError>>>,
    requests: Mutex<Vec<EngineRequest>>,
}

impl ScriptedEngine {
    pub fn new(id: &str) -> Self {
        Self {
            metadata: EngineMetadata::new(id, format!("Scripted {id}"), EngineKind::Cli),
            available: true,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(id: &str) -> Self {
        let mut engine = Self::new(id);
        engine.available = false;
        engine
    }

    /// Queue a successful response with the given stdout.
    pub fn respond_with(self, stdout: &str) -> Self {
        self.responses.lock().push_back(Ok(EngineResponse {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }));
        self
    }

    /// Queue a failing response.
    pub fn fail_with(self, stderr: &str, exit_code: i32) -> Self {
        self.responses.lock().push_back(Ok(EngineResponse {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
        }));
        self
    }

    /// Queue a timeout error.
    pub fn time_out(self) -> Self {
        self.responses
            .lock()
            .push_back(Err(EngineError::Timeout(900)));
        self
    }

    /// Requests observed so far.
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn metadata(&self) -> &EngineMetadata {
        &self.metadata
    }

    async fn check_availability(&self) -> bool {
        self.available
    }

    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        self.requests.lock().push(request);
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Ok(EngineResponse {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        })
    }
}
