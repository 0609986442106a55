//! Startup shim shared by the packaged binaries.
//!
//! Wires the install root into the weights search path, binds the weights
//! facade for the UI, resolves the requested entry point, and starts it.
//! Session introspection decides how startup is logged, but the entry point
//! is started either way so a detached launcher still gets a console.

use crate::entry::{self, EntryPoint};
use crate::session::{detect_interactive, SessionIntrospector, TtyIntrospector};
use crate::weights;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Entry point not found: {symbol}{}", .hint.as_ref().map(|h| format!("\n  Hint: {}", h)).unwrap_or_default())]
    EntryPointNotFound {
        symbol: String,
        hint: Option<String>,
    },

    #[error("entry point `{symbol}` is not defined")]
    EntryPointUndefined { symbol: String },

    #[error("Install root unavailable: {reason}")]
    RootUnavailable { reason: String },
}

/// Options for [`run`].
pub struct LaunchOptions {
    /// Name of the registered entry point to start.
    pub entry: String,
    /// Treat the session as a terminal even when introspection says otherwise.
    pub force_terminal: bool,
    /// Install root override. When unset the root is the parent of the
    /// working directory.
    pub root: Option<PathBuf>,
    /// Session introspector consulted for interactivity. `None` means the
    /// session is treated as non-interactive.
    pub introspector: Option<Arc<dyn SessionIntrospector>>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            entry: entry::CONSOLE_ENTRY.to_string(),
            force_terminal: false,
            root: None,
            introspector: Some(Arc::new(TtyIntrospector)),
        }
    }
}

impl LaunchOptions {
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    pub fn with_force_terminal(mut self, force: bool) -> Self {
        self.force_terminal = force;
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_introspector(mut self, introspector: Arc<dyn SessionIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    pub fn without_introspector(mut self) -> Self {
        self.introspector = None;
        self
    }
}

/// Run the startup sequence and hand control to the entry point.
pub async fn run(options: LaunchOptions) -> crate::Result<()> {
    let root = determine_root(&options)?;
    tracing::debug!(root = %root.display(), "install root");
    weights::global_store().ensure_root(&root);

    // Bind the facade the entry point will resolve weights through. No
    // weights are fetched here; the first probe inside the UI does that.
    let facade = weights::global_store();
    tracing::debug!(roots = facade.search_roots().len(), "weights facade bound");

    let entry_point: Option<EntryPoint> = match entry::global().resolve(&options.entry) {
        Ok(entry_point) => Some(entry_point),
        Err(e) => {
            tracing::warn!("{}", e);
            None
        }
    };

    let interactive = detect_interactive(options.introspector.as_deref());
    if options.force_terminal || interactive {
        tracing::info!(entry = %options.entry, "starting interactive console");
        invoke(&options.entry, entry_point).await
    } else {
        tracing::info!(entry = %options.entry, "no interactive session detected, starting console");
        invoke(&options.entry, entry_point).await
    }
}

async fn invoke(symbol: &str, entry_point: Option<EntryPoint>) -> crate::Result<()> {
    match entry_point {
        Some(entry_point) => entry_point().await,
        None => Err(LaunchError::EntryPointUndefined {
            symbol: symbol.to_string(),
        }
        .into()),
    }
}

fn determine_root(options: &LaunchOptions) -> Result<PathBuf, LaunchError> {
    if let Some(root) = &options.root {
        return Ok(root.clone());
    }
    let cwd = std::env::current_dir().map_err(|e| LaunchError::RootUnavailable {
        reason: e.to_string(),
    })?;
    // The launcher starts inside the install's working directory; the level
    // above holds the weights tree. The filesystem root has no parent to
    // climb to, so it stands in for itself.
    Ok(cwd.parent().map(Path::to_path_buf).unwrap_or(cwd))
}
