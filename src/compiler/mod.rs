//! Compiler driver: the opaque incremental compiler the scheduler drives.
//!
//! ```text
//! Scheduler --CompilerMsg--> CompilerActor --Backend::compile--> output dir
//!     ^                           |
//!     +---- begin_pass / finish_pass
//! ```
//!
//! The scheduler only talks to the driver through [`DriverHandle`]. The actor
//! pulls entry points with `begin_pass`, compiles them and reports back with
//! `finish_pass`.

mod actor;
mod backend;
mod error;
mod freshness;

pub use actor::CompilerActor;
pub use backend::backend_factory;
pub use error::{CompileError, ErrorKind};

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tokio::sync::{mpsc, oneshot};

use crate::core::PagePath;

/// A named unit handed to the compiler for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub page: PagePath,
    /// Artifact name relative to the output directory
    pub name: String,
    /// Absolute source path
    pub source: PathBuf,
}

/// Result of one compile pass.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Pages whose artifacts were produced
    pub produced: Vec<PagePath>,
    pub errors: Vec<CompileError>,
}

/// Messages to the compiler actor.
#[derive(Debug)]
pub enum CompilerMsg {
    /// Run one compile pass over the scheduler's current entries
    Invalidate,
    /// Drop artifacts for disposed entries
    Dispose(Vec<EntryPoint>),
    /// Tear the backend down and build a fresh one
    Rebuild(oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Sending side of the compiler actor's mailbox.
///
/// Unbounded so the scheduler can signal while holding its state lock.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<CompilerMsg>,
}

/// Create a driver handle and the mailbox the actor reads from.
pub fn channel() -> (DriverHandle, mpsc::UnboundedReceiver<CompilerMsg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DriverHandle { tx }, rx)
}

impl DriverHandle {
    pub fn invalidate(&self) {
        self.send(CompilerMsg::Invalidate);
    }

    pub fn dispose(&self, entries: Vec<EntryPoint>) {
        if !entries.is_empty() {
            self.send(CompilerMsg::Dispose(entries));
        }
    }

    /// Ask the actor to tear down and rebuild its backend, wait for the result.
    pub async fn rebuild(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CompilerMsg::Rebuild(reply))
            .map_err(|_| anyhow!("compiler actor is gone"))?;
        rx.await.map_err(|_| anyhow!("compiler actor dropped the rebuild request"))?
    }

    pub fn shutdown(&self) {
        self.send(CompilerMsg::Shutdown);
    }

    fn send(&self, msg: CompilerMsg) {
        if self.tx.send(msg).is_err() {
            crate::debug!("compile"; "compiler actor is gone, message dropped");
        }
    }
}
