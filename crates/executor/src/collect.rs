use std::path::{Path, PathBuf};

use base64::Engine as _;
use tracing::{info, warn};

use crate::prepare::PLOT_MARKER;
use crate::process::SCRIPT_NAME;
use crate::types::{FileArtifact, Plot};
use crate::workspace::Workspace;

const PLOT_FORMAT: &str = "png";

/// Scan the workspace for plots and generated files after execution.
///
/// Plots are collected from `plots/` first, then from the workspace root
/// (user code may save figures directly instead of calling `show()`). Every
/// other regular file in the root becomes a `FileArtifact`, excluding the
/// prepared script and image/bytecode leftovers. Listings are sorted by
/// filename so the response order is deterministic. A single unreadable
/// file is logged and skipped, never failing the whole collection.
pub(crate) async fn collect_artifacts(workspace: &Workspace) -> (Vec<Plot>, Vec<FileArtifact>) {
    let mut plots = Vec::new();
    for dir in [workspace.plots_dir(), workspace.root()] {
        for path in list_sorted(dir, |p| has_ext(p, PLOT_FORMAT)).await {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    plots.push(Plot {
                        format: PLOT_FORMAT.into(),
                        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                    });
                    info!(path = %path.display(), "collected plot");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable plot"),
            }
        }
    }

    let mut files = Vec::new();
    let keep = |p: &Path| {
        !has_ext(p, PLOT_FORMAT) && !has_ext(p, "pyc") && file_name(p) != Some(SCRIPT_NAME)
    };
    for path in list_sorted(workspace.root(), keep).await {
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let filename = file_name(&path).unwrap_or_default().to_string();
                info!(filename = %filename, size = bytes.len(), "collected file");
                files.push(FileArtifact {
                    filename,
                    size: bytes.len(),
                    data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                });
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }

    (plots, files)
}

/// Remove internal plot-marker lines from captured stdout.
pub(crate) fn strip_plot_markers(stdout: &str) -> String {
    if !stdout.contains(PLOT_MARKER) {
        return stdout.to_string();
    }
    stdout
        .split('\n')
        .filter(|line| !line.starts_with(PLOT_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn list_sorted(dir: &Path, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to list directory");
            return out;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file && keep(&path) {
            out.push(path);
        }
    }
    out.sort();
    out
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn workspace() -> (tempfile::TempDir, Workspace) {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path()).await.unwrap();
        (base, ws)
    }

    fn write(dir: &Path, name: &str, content: &[u8]) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn empty_workspace_yields_nothing() {
        let (_base, ws) = workspace().await;
        let (plots, files) = collect_artifacts(&ws).await;
        assert!(plots.is_empty());
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn plots_come_from_plots_dir_then_root_in_name_order() {
        let (_base, ws) = workspace().await;
        write(ws.plots_dir(), "plot_2.png", b"two");
        write(ws.plots_dir(), "plot_1.png", b"one");
        write(ws.root(), "direct.png", b"root");

        let (plots, files) = collect_artifacts(&ws).await;
        assert!(files.is_empty());
        let decoded: Vec<Vec<u8>> = plots
            .iter()
            .map(|p| {
                assert_eq!(p.format, "png");
                base64::engine::general_purpose::STANDARD
                    .decode(&p.data)
                    .unwrap()
            })
            .collect();
        assert_eq!(decoded, vec![b"one".to_vec(), b"two".to_vec(), b"root".to_vec()]);
    }

    #[tokio::test]
    async fn files_exclude_script_plots_and_bytecode() {
        let (_base, ws) = workspace().await;
        write(ws.root(), SCRIPT_NAME, b"print()");
        write(ws.root(), "image.png", b"png");
        write(ws.root(), "cached.pyc", b"pyc");
        write(ws.root(), "output.csv", b"a,b");
        write(ws.root(), "notes.txt", b"hello");

        let (plots, files) = collect_artifacts(&ws).await;
        assert_eq!(plots.len(), 1);
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["notes.txt", "output.csv"]);
        let csv = files.get(1).unwrap();
        assert_eq!(csv.size, 3);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&csv.data)
            .unwrap();
        assert_eq!(decoded, b"a,b");
    }

    #[tokio::test]
    async fn subdirectories_are_not_collected() {
        let (_base, ws) = workspace().await;
        std::fs::create_dir(ws.root().join("nested")).unwrap();
        write(&ws.root().join("nested"), "deep.txt", b"x");

        let (_plots, files) = collect_artifacts(&ws).await;
        assert!(files.is_empty());
    }

    #[test]
    fn strip_removes_marker_lines_only() {
        let stdout = format!("hello\n{PLOT_MARKER}/tmp/p/plot_1.png\nworld\n");
        assert_eq!(strip_plot_markers(&stdout), "hello\nworld\n");
    }

    #[test]
    fn strip_leaves_clean_output_untouched() {
        assert_eq!(strip_plot_markers("hello\n"), "hello\n");
        assert_eq!(strip_plot_markers(""), "");
    }

    #[test]
    fn strip_keeps_markers_mid_line() {
        let stdout = format!("prefix {PLOT_MARKER} not a marker line\n");
        assert_eq!(strip_plot_markers(&stdout), stdout);
    }
}
