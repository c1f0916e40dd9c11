use crate::workspace::Workspace;

/// Sentinel line prefix the preamble prints for every intercepted figure
/// save. Stripped from stdout before the response is returned.
pub(crate) const PLOT_MARKER: &str = "[PLOT_SAVED]";

/// Wrap user code with a preamble that redirects plot output into the
/// workspace and pins the working directory to the workspace root.
///
/// The matplotlib setup is guarded so code that never plots still runs on
/// interpreters without matplotlib installed. `plt.show()` is replaced with
/// a save into `plots/plot_<n>.png` plus a marker line on stdout; the
/// non-interactive Agg backend is selected before pyplot is imported.
pub(crate) fn wrap(code: &str, workspace: &Workspace) -> String {
    let root = py_str(&workspace.root().to_string_lossy());
    let plot_dir = py_str(&workspace.plots_dir().to_string_lossy());
    format!(
        r#"import os

try:
    import matplotlib
    matplotlib.use('Agg')
    import matplotlib.pyplot as plt

    _plot_dir = {plot_dir}
    _plot_counter = [0]

    def _save_figure(*args, **kwargs):
        _plot_counter[0] += 1
        _path = os.path.join(_plot_dir, f"plot_{{_plot_counter[0]}}.png")
        plt.savefig(_path, format='png', dpi=100, bbox_inches='tight')
        print(f"{PLOT_MARKER}{{_path}}")
        plt.close()

    plt.show = _save_figure
except ImportError:
    pass

os.chdir({root})

{code}
"#
    )
}

/// Quote a string as a Python single-quoted literal.
fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
