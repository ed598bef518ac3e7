//! Configuration view and validation commands: `testsmith config`.

use anyhow::Result;

use super::super::ConfigCommands;

fn print_sections(toml: &testsmith::testsmith_config::TestsmithToml) {
    if toml.project.name.is_some() || toml.project.language.is_some() {
        println!("[project]");
        if let Some(name) = &toml.project.name {
            println!("  name = \"{}\"", name);
        }
        if let Some(language) = &toml.project.language {
            println!("  language = \"{}\"", language);
        }
        println!();
    }

    if toml.repository.path.is_some()
        || toml.repository.url.is_some()
        || toml.repository.branch.is_some()
    {
        println!("[repository]");
        if let Some(path) = &toml.repository.path {
            println!("  path = \"{}\"", path.display());
        }
        if let Some(url) = &toml.repository.url {
            println!("  url = \"{}\"", url);
        }
        if let Some(branch) = &toml.repository.branch {
            println!("  branch = \"{}\"", branch);
        }
        println!();
    }

    let agg = &toml.aggregation;
    println!("[aggregation]");
    println!("  max_commits = {}", agg.max_commits);
    println!("  lookback = {}", agg.lookback);
    println!("  sample_files = {}", agg.sample_files);
    println!("  sample_file_chars = {}", agg.sample_file_chars);
    println!("  sample_total_chars = {}", agg.sample_total_chars);
    println!("  max_patch_chars = {}", agg.max_patch_chars);
    println!("  exclude_merges = {}", agg.exclude_merges);
    println!("  exclude_test_commits = {}", agg.exclude_test_commits);
    println!();

    println!("[generation]");
    match &toml.generation.command {
        Some(cmd) => println!("  command = \"{}\"", cmd),
        None => println!("  command = (not set)"),
    }
    println!("  timeout_secs = {}", toml.generation.timeout_secs);
    println!();

    println!("[pipeline]");
    println!("  skipped_strategy = \"{}\"", toml.pipeline.skipped_strategy);
    println!("  store_timeout_secs = {}", toml.pipeline.store_timeout_secs);
    println!("  auto_confirm = {}", toml.pipeline.auto_confirm);
    println!();
}

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use testsmith::init::get_testsmith_dir;
    use testsmith::testsmith_config::{CONFIG_FILE, TestsmithConfig, TestsmithToml};

    let testsmith_dir = get_testsmith_dir(project_dir);
    let config_path = testsmith_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Testsmith Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_sections(&TestsmithToml::load(&config_path)?);
            } else {
                println!("No testsmith.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_sections(&TestsmithToml::default());
                println!("Run 'testsmith config init' to create a testsmith.toml file.");
                println!();
            }

            println!("Effective values (with env/CLI overrides):");
            let config = TestsmithConfig::new(project_dir.to_path_buf())?;
            println!(
                "  generation.command = {}",
                config
                    .generator_command()
                    .map(|c| format!("\"{}\"", c))
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!(
                "  generation.timeout_secs = {}",
                config.toml.generation.timeout_secs
            );
            println!("  aggregation.max_commits = {}", config.toml.aggregation.max_commits);
            println!("  repository = {}", config.local_repo_path().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let toml = if config_path.exists() {
                TestsmithToml::load(&config_path)?
            } else {
                println!("No testsmith.toml found. Checking defaults.");
                TestsmithToml::default()
            };
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("testsmith.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !testsmith_dir.exists() {
                std::fs::create_dir_all(&testsmith_dir)?;
            }

            TestsmithToml::default().save(&config_path)?;

            println!("Created testsmith.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [repository] path, url, branch");
            println!("  - [generation] command, timeout_secs");
            println!("  - [pipeline] skipped_strategy, auto_confirm");
            println!();
        }
    }

    Ok(())
}
