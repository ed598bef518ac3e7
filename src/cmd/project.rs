//! Project initialization: `testsmith init`.

use anyhow::Result;

pub fn cmd_init(project_dir: &std::path::Path) -> Result<()> {
    use testsmith::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized testsmith project at {}",
            result.testsmith_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .testsmith/");
        println!("  ├── testsmith.toml  # Configuration");
        println!("  ├── runs/           # Saved pipeline runs");
        println!("  ├── logs/           # Daily log files");
        println!("  └── clones/         # Remote repositories");
        println!();
        println!("Next steps:");
        println!("  1. Set [generation] command in testsmith.toml");
        println!("  2. Run `testsmith commits` to pick commits");
        println!("  3. Run `testsmith run` to generate tests");
    } else if was_initialized {
        println!(
            "Testsmith project already initialized at {}",
            result.testsmith_dir.display()
        );
        if result.wrote_config {
            println!("Restored missing testsmith.toml with defaults.");
        }
        println!("Directory structure verified.");
    } else {
        println!(
            "Completed testsmith initialization at {}",
            result.testsmith_dir.display()
        );
    }

    Ok(())
}
