//! The Tool Bridge: a uniform `{discover, invoke, stream}` surface over
//! the concrete tool implementations in this crate.
//!
//! Every tool declares the connection it needs (`None` for an
//! always-available local primitive like `exec`/file ops). Before
//! invocation the bridge checks that connection's state through a narrow
//! `ConnectionStateReader` — it never mutates connection state itself;
//! the integration that manages connections lives outside this crate.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use ck_domain::error::{Error, Result};
use ck_domain::model::ConnectionState;

use crate::exec::{self, ExecRequest};
use crate::file_ops::{
    self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest,
    FileReadRequest, FileWriteRequest,
};
use crate::manager::ProcessManager;

/// Describes one tool the bridge can invoke.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// The connection this tool needs, or `None` for a local primitive
    /// that's always available.
    pub requires_connection: Option<&'static str>,
}

/// Read-only view of a caller's live connection states. The orchestrator
/// never mutates this — only reads it before dispatching a tool call.
pub trait ConnectionStateReader: Send + Sync {
    fn state(&self, caller_id: &str, provider: &str) -> ConnectionState;
}

/// Trivial reader that reports every connection as `Connected`. Used where
/// no external connection manager is wired in (every tool this crate
/// ships today is a local, always-available primitive).
pub struct AlwaysConnected;

impl ConnectionStateReader for AlwaysConnected {
    fn state(&self, _caller_id: &str, _provider: &str) -> ConnectionState {
        ConnectionState::Connected
    }
}

const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

const DESCRIPTORS: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: "exec",
        description: "Run a shell command, foreground or backgrounded.",
        requires_connection: None,
    },
    ToolDescriptor {
        name: "file_read",
        description: "Read a file under the session workspace.",
        requires_connection: None,
    },
    ToolDescriptor {
        name: "file_write",
        description: "Write a file under the session workspace.",
        requires_connection: None,
    },
    ToolDescriptor {
        name: "file_append",
        description: "Append to a file under the session workspace.",
        requires_connection: None,
    },
    ToolDescriptor {
        name: "file_move",
        description: "Move/rename a file under the session workspace.",
        requires_connection: None,
    },
    ToolDescriptor {
        name: "file_delete",
        description: "Delete a file under the session workspace.",
        requires_connection: None,
    },
    ToolDescriptor {
        name: "file_list",
        description: "List files under a directory in the session workspace.",
        requires_connection: None,
    },
];

pub struct ToolBridge {
    processes: ProcessManager,
    workspace_root: PathBuf,
    connections: Box<dyn ConnectionStateReader>,
}

impl ToolBridge {
    pub fn new(processes: ProcessManager, workspace_root: PathBuf) -> Self {
        Self {
            processes,
            workspace_root,
            connections: Box::new(AlwaysConnected),
        }
    }

    pub fn with_connection_reader(mut self, reader: Box<dyn ConnectionStateReader>) -> Self {
        self.connections = reader;
        self
    }

    pub fn discover(&self) -> &'static [ToolDescriptor] {
        DESCRIPTORS
    }

    pub fn processes(&self) -> &ProcessManager {
        &self.processes
    }

    /// Invoke a tool by name, enforcing connection-state gating and an
    /// overall timeout. A tool whose required connection isn't
    /// `Connected` never runs; a call that exceeds `INVOKE_TIMEOUT` is
    /// cancelled and surfaced as `Error::ToolTimeout`.
    pub async fn invoke(&self, caller_id: &str, tool_name: &str, args: Value) -> Result<Value> {
        let descriptor = DESCRIPTORS
            .iter()
            .find(|d| d.name == tool_name)
            .ok_or_else(|| Error::ToolUnavailable(format!("unknown tool: {tool_name}")))?;

        if let Some(provider) = descriptor.requires_connection {
            if self.connections.state(caller_id, provider) != ConnectionState::Connected {
                return Err(Error::ToolUnavailable(format!(
                    "{tool_name} requires an active {provider} connection"
                )));
            }
        }

        match tokio::time::timeout(INVOKE_TIMEOUT, self.dispatch(tool_name, args)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ToolTimeout(format!(
                "{tool_name} exceeded {INVOKE_TIMEOUT:?}"
            ))),
        }
    }

    async fn dispatch(&self, tool_name: &str, args: Value) -> Result<Value> {
        match tool_name {
            "exec" => {
                let req: ExecRequest = serde_json::from_value(args)?;
                let resp = exec::exec(&self.processes, req).await;
                Ok(serde_json::to_value(resp)?)
            }
            "file_read" => {
                let req: FileReadRequest = serde_json::from_value(args)?;
                file_ops::file_read(&self.workspace_root, req)
                    .await
                    .map_err(Error::ToolUnavailable)
            }
            "file_write" => {
                let req: FileWriteRequest = serde_json::from_value(args)?;
                file_ops::file_write(&self.workspace_root, req)
                    .await
                    .map_err(Error::ToolUnavailable)
            }
            "file_append" => {
                let req: FileAppendRequest = serde_json::from_value(args)?;
                file_ops::file_append(&self.workspace_root, req)
                    .await
                    .map_err(Error::ToolUnavailable)
            }
            "file_move" => {
                let req: FileMoveRequest = serde_json::from_value(args)?;
                file_ops::file_move(&self.workspace_root, req)
                    .await
                    .map_err(Error::ToolUnavailable)
            }
            "file_delete" => {
                let req: FileDeleteRequest = serde_json::from_value(args)?;
                file_ops::file_delete(&self.workspace_root, req)
                    .await
                    .map_err(Error::ToolUnavailable)
            }
            "file_list" => {
                let req: FileListRequest = serde_json::from_value(args)?;
                file_ops::file_list(&self.workspace_root, req)
                    .await
                    .map_err(Error::ToolUnavailable)
            }
            other => Err(Error::ToolUnavailable(format!("unknown tool: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_domain::config::ExecConfig;

    fn bridge() -> ToolBridge {
        ToolBridge::new(ProcessManager::new(ExecConfig::default()), PathBuf::from("/tmp"))
    }

    #[test]
    fn discover_lists_every_registered_tool() {
        let b = bridge();
        assert_eq!(b.discover().len(), DESCRIPTORS.len());
    }

    #[tokio::test]
    async fn unknown_tool_is_unavailable() {
        let b = bridge();
        let err = b.invoke("u1", "does_not_exist", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable(_)));
    }
}
