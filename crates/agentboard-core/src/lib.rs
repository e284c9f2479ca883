//! Shared library for the agentboard daemon and CLI: data model, output
//! classification, key encoding, git worktree plumbing, agent selection,
//! configuration, and the IPC wire protocol.

pub mod agent;
pub mod config;
pub mod ipc;
pub mod keys;
pub mod message;
pub mod protocol;
pub mod task;
pub mod worktree;
