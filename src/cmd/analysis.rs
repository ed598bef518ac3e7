//! Read-only history commands: `commits`, `branches`, `search`, `diff`,
//! `analyze`, `related` and `show`.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use console::style;
use serde::Serialize;
use std::path::Path;
use testsmith::changes::{ChangeAggregator, CommitRecord, FileDelta};
use testsmith::tracker::CommitFilter;
use testsmith::ui::icons::COMMIT;
use testsmith::ui::progress::change_icon;

use super::super::Cli;
use super::repo::{load_config, resolve_repository, with_store};

/// Filters for `testsmith commits`.
pub struct CommitQuery {
    pub max: usize,
    pub branch: Option<String>,
    pub author: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub no_merges: bool,
    pub exclude_tests: bool,
}

/// Parse `YYYY-MM-DD` (start of day, UTC) or an RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected YYYY-MM-DD or RFC 3339", value))?;
    match date.and_hms_opt(0, 0, 0) {
        Some(dt) => Ok(dt.and_utc()),
        None => bail!("Invalid date '{}'", value),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn print_commit(commit: &CommitRecord) {
    let marker = if commit.is_test_commit {
        style(" [test]").dim().to_string()
    } else {
        String::new()
    };
    println!(
        "{}{} {} {} {}{}",
        COMMIT,
        style(&commit.short_id).yellow(),
        style(commit.timestamp.format("%Y-%m-%d")).dim(),
        style(&commit.author).cyan(),
        commit.subject(),
        marker
    );
}

fn print_files(files: &[FileDelta]) {
    for file in files {
        let path = match file.old_path {
            Some(ref old) => format!("{} -> {}", old, file.path),
            None => file.path.clone(),
        };
        let mut line = format!(
            "  {}{} {} {}",
            change_icon(file.change_kind),
            path,
            style(format!("+{}", file.additions)).green(),
            style(format!("-{}", file.deletions)).red()
        );
        if let Some(ref language) = file.language {
            line.push_str(&format!(" {}", style(format!("[{}]", language)).dim()));
        }
        if !file.changed_symbols.is_empty() {
            line.push_str(&format!(
                " {}",
                style(file.changed_symbols.join(", ")).magenta()
            ));
        }
        println!("{}", line);
    }
}

pub async fn cmd_commits(cli: &Cli, project_dir: &Path, query: CommitQuery, json: bool) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let repo_path = resolve_repository(&config).await?;
    let filter = CommitFilter {
        since: query.since.as_deref().map(parse_date).transpose()?,
        until: query.until.as_deref().map(parse_date).transpose()?,
        author: query.author,
        exclude_merges: query.no_merges,
        exclude_test_commits: query.exclude_tests,
    };
    let branch = query.branch.or_else(|| config.toml.repository.branch.clone());
    let max = query.max;

    let commits = with_store(repo_path, move |store| {
        Ok(ChangeAggregator::new(store).list_commits(branch.as_deref(), max, &filter)?)
    })
    .await?;

    if json {
        return print_json(&commits);
    }
    if commits.is_empty() {
        println!("No commits match.");
        return Ok(());
    }
    for commit in &commits {
        print_commit(commit);
    }
    Ok(())
}

pub async fn cmd_branches(cli: &Cli, project_dir: &Path, json: bool) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let repo_path = resolve_repository(&config).await?;
    let branches = with_store(repo_path, |store| {
        Ok(ChangeAggregator::new(store).list_branches()?)
    })
    .await?;

    if json {
        return print_json(&branches);
    }
    for branch in &branches {
        let marker = if branch.is_current { "*" } else { " " };
        let upstream = branch
            .upstream
            .as_deref()
            .map(|u| style(format!(" -> {}", u)).dim().to_string())
            .unwrap_or_default();
        println!("{} {}{}", style(marker).green(), branch.name, upstream);
    }
    Ok(())
}

pub async fn cmd_search(
    cli: &Cli,
    project_dir: &Path,
    query: &str,
    lookback: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let repo_path = resolve_repository(&config).await?;
    let lookback = lookback.unwrap_or(config.toml.aggregation.lookback);
    let needle = query.to_string();

    let commits = with_store(repo_path, move |store| {
        Ok(ChangeAggregator::new(store).search_commits(&needle, lookback)?)
    })
    .await?;

    if json {
        return print_json(&commits);
    }
    if commits.is_empty() {
        println!("No commits in the last {} match '{}'.", lookback, query);
        return Ok(());
    }
    for commit in &commits {
        print_commit(commit);
    }
    Ok(())
}

pub async fn cmd_diff(
    cli: &Cli,
    project_dir: &Path,
    commits: &[String],
    base: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let repo_path = resolve_repository(&config).await?;
    let limits = config.toml.aggregation.limits();
    let ids = commits.to_vec();
    let base = base.map(str::to_string);

    let set = with_store(repo_path, move |store| {
        Ok(ChangeAggregator::new(store)
            .with_limits(limits)
            .aggregate_changes(&ids, base.as_deref())?)
    })
    .await?;

    if json {
        return print_json(&set);
    }
    println!(
        "{} {}..{}",
        style("Window").bold(),
        style(&set.base_revision[..set.base_revision.len().min(8)]).dim(),
        style(&set.head_revision[..set.head_revision.len().min(8)]).yellow()
    );
    println!();
    println!("{}", style("Selected commits").underlined());
    for commit in &set.commits {
        println!(
            "  {} {}",
            style(&commit.short_id).yellow(),
            commit.message.lines().next().unwrap_or("")
        );
    }
    println!();
    println!("{}", style("Files").underlined());
    print_files(&set.files);
    println!();
    println!(
        "{} files, {} {} (net {})",
        set.totals.files,
        style(format!("+{}", set.totals.additions)).green(),
        style(format!("-{}", set.totals.deletions)).red(),
        set.totals.net
    );
    if cli.verbose {
        for entry in &set.sample.entries {
            println!();
            println!("{}", style(&entry.path).bold());
            println!("{}", entry.excerpt);
        }
    }
    Ok(())
}

pub async fn cmd_analyze(cli: &Cli, project_dir: &Path, commit: &str, json: bool) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let repo_path = resolve_repository(&config).await?;
    let limits = config.toml.aggregation.limits();
    let id = commit.to_string();

    let analysis = with_store(repo_path, move |store| {
        Ok(ChangeAggregator::new(store)
            .with_limits(limits)
            .analyze_commit(&id)?)
    })
    .await?;

    if json {
        return print_json(&analysis);
    }
    println!(
        "{}{} {} {}",
        COMMIT,
        style(&analysis.commit.short_id).yellow(),
        style(&analysis.commit.author).cyan(),
        analysis.commit.message.lines().next().unwrap_or("")
    );
    print_files(&analysis.files);
    println!(
        "{} files, {} {}",
        analysis.totals.files,
        style(format!("+{}", analysis.totals.additions)).green(),
        style(format!("-{}", analysis.totals.deletions)).red()
    );
    Ok(())
}

pub async fn cmd_related(
    cli: &Cli,
    project_dir: &Path,
    path: &str,
    lookback: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let repo_path = resolve_repository(&config).await?;
    let lookback = lookback.unwrap_or(config.toml.aggregation.lookback);
    let target = path.to_string();

    let related = with_store(repo_path, move |store| {
        Ok(ChangeAggregator::new(store).find_related_files(&target, lookback)?)
    })
    .await?;

    if json {
        return print_json(&related);
    }
    if related.is_empty() {
        println!("No files changed together with {}.", path);
        return Ok(());
    }
    for file in &related {
        println!("{:>4}  {}", style(file.co_changes).cyan(), file.path);
    }
    Ok(())
}

pub async fn cmd_show(cli: &Cli, project_dir: &Path, revision: &str, path: &str) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let repo_path = resolve_repository(&config).await?;
    let rev = revision.to_string();
    let file = path.to_string();

    let content = with_store(repo_path, move |store| {
        Ok(ChangeAggregator::new(store).file_at_revision(&rev, &file)?)
    })
    .await?;

    match content {
        Some(text) => print!("{}", text),
        None => bail!("{} does not exist at {}", path, revision),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_plain_day() {
        let ts = parse_date("2024-03-05").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-05T00:00:00+00:00");
    }

    #[test]
    fn test_parse_date_rfc3339_is_normalized() {
        let ts = parse_date("2024-03-05T10:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-05T08:00:00+00:00");
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("last tuesday").is_err());
    }
}
