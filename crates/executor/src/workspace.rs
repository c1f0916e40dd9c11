use std::path::{Path, PathBuf};

use base64::Engine as _;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ExecError, Result};
use crate::types::InputFile;

/// An ephemeral, exclusively-owned directory tree for one execution:
/// `<base>/<uuid>/` with a `plots/` subdirectory for intercepted figures.
pub struct Workspace {
    id: Uuid,
    root: PathBuf,
    plots_dir: PathBuf,
}

impl Workspace {
    pub async fn create(base: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let root = base.join(id.to_string());
        let plots_dir = root.join("plots");
        tokio::fs::create_dir_all(&plots_dir)
            .await
            .map_err(ExecError::Workspace)?;
        Ok(Self {
            id,
            root,
            plots_dir,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plots_dir(&self) -> &Path {
        &self.plots_dir
    }

    /// Write caller-supplied input files into the workspace root.
    ///
    /// Filenames must be bare names — anything that could escape the
    /// workspace (separators, `..`) is rejected.
    pub async fn stage_files(&self, files: &[InputFile]) -> Result<()> {
        for file in files {
            let name = sanitize_filename(&file.filename)?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&file.data)
                .map_err(|e| ExecError::InvalidInput {
                    message: format!("{}: {e}", file.filename),
                })?;
            tokio::fs::write(self.root.join(name), bytes)
                .await
                .map_err(ExecError::Workspace)?;
        }
        Ok(())
    }

    /// Recursively remove the workspace tree. Failures are logged, not
    /// propagated — cleanup must never mask the primary result.
    pub async fn destroy(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
            warn!(workspace = %self.id, error = %e, "workspace cleanup failed");
        }
    }
}

fn sanitize_filename(name: &str) -> Result<&str> {
    let safe = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');
    if safe {
        Ok(name)
    } else {
        Err(ExecError::InvalidInput {
            message: format!("unsafe filename: {name:?}"),
        })
    }
}
