//! Workspace directory preparation and the workspace declaration guard.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ecosystem_ci_core::Result;
use tracing::{debug, warn};

/// Workspace declaration at the engine root that breaks suite installs.
pub const WORKSPACE_DECLARATION: &str = "pnpm-workspace.yaml";

/// Name the declaration is parked under while a suite runs.
pub const PARKED_DECLARATION: &str = "_pnpm-workspace.yaml";

/// Create the workspace root and stop tool config lookups from leaving it.
///
/// Existing files are left untouched.
pub fn init_workspace(workspace: &Path) -> Result<()> {
    std::fs::create_dir_all(workspace)?;
    write_if_absent(&workspace.join(".eslintrc.json"), "{\"root\":true}\n")?;
    write_if_absent(&workspace.join(".editorconfig"), "root = true\n")?;
    Ok(())
}

fn write_if_absent(path: &Path, contents: &str) -> Result<()> {
    if !path.exists() {
        std::fs::write(path, contents)?;
    }
    Ok(())
}

/// Holds the root workspace declaration aside for the duration of a suite run.
///
/// Call [`release`](Self::release) to restore it and observe failures; if the
/// guard is dropped without being released the declaration is still restored
/// and any failure is logged.
#[derive(Debug)]
pub struct WorkspaceDeclarationGuard {
    original: PathBuf,
    parked: PathBuf,
    parked_file: bool,
}

impl WorkspaceDeclarationGuard {
    /// Move `<root>/pnpm-workspace.yaml` aside. A missing file is not an error.
    pub fn acquire(root: &Path) -> Result<Self> {
        let original = root.join(WORKSPACE_DECLARATION);
        let parked = root.join(PARKED_DECLARATION);
        let parked_file = match std::fs::rename(&original, &parked) {
            Ok(()) => {
                debug!("parked {}", original.display());
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            original,
            parked,
            parked_file,
        })
    }

    /// Put the declaration back.
    pub fn release(mut self) -> Result<()> {
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        if !self.parked_file {
            return Ok(());
        }
        self.parked_file = false;
        match std::fs::rename(&self.parked, &self.original) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for WorkspaceDeclarationGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(
                "failed to restore {}: {e}",
                self.original.display()
            );
        }
    }
}
