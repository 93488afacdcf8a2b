pub mod add;
pub mod check;
pub mod export;
pub mod frame;
pub mod info;
pub mod init;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shortcraft_common::config::RenderDefaults;
use shortcraft_project_model::Project;
use shortcraft_render_engine::{BlockRasterizer, Compositor, RustTypeRasterizer, TextRasterizer};

pub const PROJECT_FILE: &str = "project.json";

/// Accept either a project file or the directory holding one.
pub fn project_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(PROJECT_FILE)
    } else {
        path.to_path_buf()
    }
}

pub fn load_project(path: &Path) -> anyhow::Result<(PathBuf, Project)> {
    let file = project_file(path);
    let project =
        Project::load(&file).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;
    Ok((file, project))
}

/// Compositor using the configured or a discovered font. Without any font
/// text is drawn as blocks so previews and exports still work.
pub fn compositor(render: &RenderDefaults) -> Compositor {
    let rasterizer: Arc<dyn TextRasterizer> =
        match RustTypeRasterizer::discover(render.font_path.as_deref()) {
            Ok(font) => Arc::new(font),
            Err(e) => {
                tracing::warn!(error = %e, "No usable font; drawing text as blocks");
                Arc::new(BlockRasterizer)
            }
        };
    Compositor::new(rasterizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_file_accepts_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(project_file(dir.path()), dir.path().join(PROJECT_FILE));

        let file = dir.path().join("custom.json");
        assert_eq!(project_file(&file), file);
    }
}
