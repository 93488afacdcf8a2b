//! Initialize a new Shortcraft project.

use std::path::PathBuf;

use shortcraft_project_model::Project;

use super::PROJECT_FILE;

pub fn run(name: String, output: PathBuf) -> anyhow::Result<()> {
    let project_dir = output.join(&name);
    let file = project_dir.join(PROJECT_FILE);
    println!("Creating project '{}' at {}", name, project_dir.display());

    let project = Project::create(&file, &name)
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;

    let (width, height) = project.settings.dimensions();
    println!("Project created successfully:");
    println!("  File: {}", file.display());
    println!(
        "  Aspect ratio: {} ({}x{})",
        project.settings.aspect_ratio.label(), width, height
    );
    println!();
    println!("Next: shortcraft add {} --images ... --audio ...", project_dir.display());

    Ok(())
}
