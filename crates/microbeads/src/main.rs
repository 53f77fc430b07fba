//! Microbeads issue tracker
//!
//! File-per-record issue tracking with dependency-driven ready/blocked
//! views and a field-level merge driver for concurrent branches.

use anyhow::{Context, Result};
use clap::Parser;
use microbeads::cli::{Cli, Commands, DepCommands};
use microbeads::commands::merge_driver::{run_merge_driver, MergeOutcome};
use microbeads::commands::{import, CommandExecutor, DependencyChange, ImportSummary, IssueUpdate};
use microbeads::domain::{Issue, IssueType, NewIssue, Priority, Status};
use microbeads::errors::find_tracker_error;
use microbeads::output::{
    BlockedIssueSummary, BlockedListResponse, DependencyChangeResponse, ErrorCode, ExitCode,
    IssueListResponse, IssueShowResponse, IssueSummary, JsonError, OutputContext,
};
use microbeads::repository::IssueFilter;
use microbeads::storage::JsonFileStorage;
use microbeads::{telemetry, TrackerConfig};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Environment variable overriding the store location, relative to the cwd
const DATA_DIR_ENV: &str = "MB_DATA_DIR";
const DEFAULT_DATA_DIR: &str = ".microbeads";
const BEADS_BIN_ENV: &str = "MB_BEADS_BIN";

/// Pick an exit code by walking the error chain.
fn error_to_exit_code(error: &anyhow::Error) -> ExitCode {
    if let Some(err) = find_tracker_error(error) {
        return err.exit_code();
    }
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            return match io_error.kind() {
                std::io::ErrorKind::NotFound => ExitCode::NotFound,
                _ => ExitCode::ExternalError,
            };
        }
    }
    ExitCode::GenericError
}

fn error_to_json(error: &anyhow::Error, command: &str) -> JsonError {
    if let Some(err) = find_tracker_error(error) {
        return JsonError::from_tracker_error(err, command);
    }
    let code = match error_to_exit_code(error) {
        ExitCode::NotFound | ExitCode::ExternalError => ErrorCode::IO_ERROR,
        _ => ErrorCode::GENERIC_ERROR,
    };
    JsonError::new(code, format!("{:#}", error), command)
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Init { .. } => "init",
        Commands::Create { .. } => "create",
        Commands::Show { .. } => "show",
        Commands::List { .. } => "list",
        Commands::Update { .. } => "update",
        Commands::Close { .. } => "close",
        Commands::Reopen { .. } => "reopen",
        Commands::Ready => "ready",
        Commands::Blocked => "blocked",
        Commands::Dep(DepCommands::Add { .. }) => "dep add",
        Commands::Dep(DepCommands::Rm { .. }) => "dep rm",
        Commands::Dep(DepCommands::Tree { .. }) => "dep tree",
        Commands::Schema => "schema",
        Commands::MergeDriver { .. } => "merge-driver",
    }
}

fn main() {
    let cli = Cli::parse();
    let output = OutputContext::new(cli.quiet, cli.json);
    let command = command_name(&cli.command);

    let exit_code = match run(cli, &output) {
        Ok(code) => code,
        Err(e) => {
            let code = error_to_exit_code(&e);
            if output.is_json() {
                let json_error = error_to_json(&e, command);
                match json_error.to_json_string() {
                    Ok(text) => println!("{}", text),
                    Err(_) => eprintln!("Error: {:#}", e),
                }
            } else {
                let _ = output.print_error(format!("{:#}", e));
            }
            code
        }
    };

    if exit_code != ExitCode::Success {
        std::process::exit(exit_code.code());
    }
}

fn data_dir() -> Result<PathBuf> {
    let current_dir = env::current_dir()?;
    Ok(match env::var(DATA_DIR_ENV) {
        Ok(custom_dir) => current_dir.join(custom_dir),
        Err(_) => current_dir.join(DEFAULT_DATA_DIR),
    })
}

fn run(cli: Cli, output: &OutputContext) -> Result<ExitCode> {
    // Commands that never touch the store
    match &cli.command {
        Commands::Schema => {
            let schema = schemars::schema_for!(Issue);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(ExitCode::Success);
        }
        Commands::MergeDriver { base, ours, theirs } => {
            telemetry::init(cli.verbose, "warn");
            return match run_merge_driver(base, ours, theirs)? {
                MergeOutcome::Merged => Ok(ExitCode::Success),
                MergeOutcome::Fallback(reason) => {
                    eprintln!("mb merge-driver: falling back to textual merge: {}", reason);
                    Ok(ExitCode::GenericError)
                }
            };
        }
        _ => {}
    }

    let data_dir = data_dir()?;
    let config = TrackerConfig::load(&data_dir)?;
    telemetry::init(cli.verbose, &config.log_level());

    let storage = JsonFileStorage::new(&data_dir).with_cache(config.cache_enabled());
    if !matches!(cli.command, Commands::Init { .. }) {
        storage.validate()?;
    }
    let executor = CommandExecutor::new(storage, config)?;

    match cli.command {
        Commands::Init {
            prefix,
            import_beads,
            import_beads_file,
        } => {
            let prefix = executor.init(prefix.as_deref())?;
            let records = if let Some(path) = import_beads_file {
                let bytes = fs::read(&path)
                    .with_context(|| format!("Failed to read beads export {}", path.display()))?;
                Some(import::parse_beads_export(&bytes)?)
            } else if import_beads {
                let program = env::var(BEADS_BIN_ENV).unwrap_or_else(|_| "bd".to_string());
                Some(import::fetch_beads_export(&program)?)
            } else {
                None
            };
            let summary = match records {
                Some(records) => executor.import_beads(records)?,
                None => ImportSummary::default(),
            };

            if output.is_json() {
                output.print_json(
                    serde_json::json!({
                        "path": data_dir.display().to_string(),
                        "prefix": prefix,
                        "imported": summary.imported,
                        "skipped": summary.skipped,
                        "rejected": summary.rejected,
                    }),
                    "init",
                )?;
            } else {
                output.print_success(format!(
                    "Initialized microbeads store in {} (prefix: {})",
                    data_dir.display(),
                    prefix
                ))?;
                if summary.imported > 0 {
                    output.print_success(format!(
                        "Imported {} issues from beads.",
                        summary.imported
                    ))?;
                }
                if summary.skipped > 0 {
                    output.print_success(format!("Skipped {} existing issues.", summary.skipped))?;
                }
                for id in &summary.rejected {
                    output.print_warning(format!("Skipped invalid beads issue {}", id))?;
                }
            }
        }
        Commands::Create {
            title,
            description,
            issue_type,
            priority,
            labels,
        } => {
            let mut fields = NewIssue::new(title)
                .with_description(description)
                .with_type(issue_type.parse::<IssueType>()?)
                .with_priority(priority.parse::<Priority>()?);
            for label in labels {
                fields = fields.with_label(label);
            }
            let issue = executor.create_issue(fields)?;
            if output.is_json() {
                output.print_json(&issue, "create")?;
            } else if output.is_quiet() {
                output.print_data(&issue.id)?;
            } else {
                output.print_success(format!("Created issue: {}", issue.id))?;
            }
        }
        Commands::Show { id } => {
            let (issue, dependents) = executor.show_issue(&id)?;
            if output.is_json() {
                output.print_json(IssueShowResponse { issue, dependents }, "show")?;
            } else {
                print_issue(output, &issue, &dependents)?;
            }
        }
        Commands::List {
            status,
            priority,
            issue_type,
            labels,
        } => {
            let filter = IssueFilter {
                status: status.as_deref().map(str::parse::<Status>).transpose()?,
                priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
                issue_type: issue_type.as_deref().map(str::parse::<IssueType>).transpose()?,
                labels,
            };
            let issues = executor.list_issues(&filter)?;
            print_issue_list(output, &issues, "list")?;
        }
        Commands::Update {
            id,
            status,
            priority,
            title,
            description,
            issue_type,
            labels,
            add_labels,
            remove_labels,
        } => {
            let update = IssueUpdate {
                status: status.as_deref().map(str::parse::<Status>).transpose()?,
                priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
                title,
                description,
                issue_type: issue_type.as_deref().map(str::parse::<IssueType>).transpose()?,
                labels,
                add_labels,
                remove_labels,
            };
            let issue = executor.update_issue(&id, update)?;
            print_mutation(output, &issue, "Updated", "update")?;
        }
        Commands::Close { id, reason } => {
            let issue = executor.close_issue(&id, &reason)?;
            print_mutation(output, &issue, "Closed", "close")?;
        }
        Commands::Reopen { id } => {
            let issue = executor.reopen_issue(&id)?;
            print_mutation(output, &issue, "Reopened", "reopen")?;
        }
        Commands::Ready => {
            let issues = executor.ready_issues()?;
            print_issue_list(output, &issues, "ready")?;
        }
        Commands::Blocked => {
            let blocked = executor.blocked_issues()?;
            if output.is_json() {
                let summaries = blocked
                    .into_iter()
                    .map(|b| BlockedIssueSummary {
                        issue: IssueSummary::from(&b.issue),
                        blocked_by: b.blocked_by,
                    })
                    .collect();
                output.print_json(BlockedListResponse::new(summaries), "blocked")?;
            } else if blocked.is_empty() {
                output.print_success("No blocked issues")?;
            } else {
                for b in &blocked {
                    output.print_data(IssueSummary::from(&b.issue))?;
                    output.print_data(format!("  blocked by: {}", b.blocked_by.join(", ")))?;
                }
            }
        }
        Commands::Dep(dep_cmd) => match dep_cmd {
            DepCommands::Add { child, parent } => {
                let (child, parent, change) = executor.add_dependency(&child, &parent)?;
                print_dependency_change(output, &child, &parent, change, "dep add")?;
            }
            DepCommands::Rm { child, parent } => {
                let (child, parent, change) = executor.remove_dependency(&child, &parent)?;
                print_dependency_change(output, &child, &parent, change, "dep rm")?;
            }
            DepCommands::Tree { id } => {
                let tree = executor.dependency_tree(&id)?;
                let has_cycle = !tree.cycles.is_empty();
                if output.is_json() {
                    output.print_json(&tree, "dep tree")?;
                } else {
                    for line in tree.render_lines() {
                        output.print_data(line)?;
                    }
                    for cycle in &tree.cycles {
                        output.print_warning(format!("Dependency cycle: {}", cycle.join(" -> ")))?;
                    }
                }
                if has_cycle {
                    return Ok(ExitCode::ValidationFailed);
                }
            }
        },
        Commands::Schema | Commands::MergeDriver { .. } => {
            // Already handled above
        }
    }

    Ok(ExitCode::Success)
}

fn print_issue(output: &OutputContext, issue: &Issue, dependents: &[String]) -> Result<()> {
    output.print_data(format!("{}: {}", issue.id, issue.title))?;
    output.print_data(format!("Status:   {}", issue.status))?;
    output.print_data(format!("Priority: {}", issue.priority))?;
    output.print_data(format!("Type:     {}", issue.issue_type))?;
    output.print_data(format!("Created:  {}", issue.created_at.to_rfc3339()))?;
    output.print_data(format!("Updated:  {}", issue.updated_at.to_rfc3339()))?;
    if let Some(closed_at) = issue.closed_at {
        output.print_data(format!(
            "Closed:   {} ({})",
            closed_at.to_rfc3339(),
            issue.closed_reason.as_deref().unwrap_or_default()
        ))?;
    }
    if !issue.labels.is_empty() {
        let labels: Vec<&str> = issue.labels.iter().map(String::as_str).collect();
        output.print_data(format!("Labels:   {}", labels.join(", ")))?;
    }
    if !issue.dependencies.is_empty() {
        let deps: Vec<&str> = issue.dependencies.iter().map(String::as_str).collect();
        output.print_data(format!("Depends on: {}", deps.join(", ")))?;
    }
    if !dependents.is_empty() {
        output.print_data(format!("Blocks:     {}", dependents.join(", ")))?;
    }
    if !issue.description.is_empty() {
        output.print_data("")?;
        output.print_data(&issue.description)?;
    }
    Ok(())
}

fn print_issue_list(output: &OutputContext, issues: &[Issue], command: &str) -> Result<()> {
    if output.is_json() {
        let summaries = issues.iter().map(IssueSummary::from).collect();
        output.print_json(IssueListResponse::new(summaries), command)?;
    } else if issues.is_empty() {
        output.print_success("No issues found")?;
    } else {
        for issue in issues {
            output.print_data(IssueSummary::from(issue))?;
        }
    }
    Ok(())
}

fn print_mutation(output: &OutputContext, issue: &Issue, verb: &str, command: &str) -> Result<()> {
    if output.is_json() {
        output.print_json(issue, command)?;
    } else {
        output.print_success(format!("{} issue: {}", verb, issue.id))?;
    }
    Ok(())
}

fn print_dependency_change(
    output: &OutputContext,
    child: &str,
    parent: &str,
    change: DependencyChange,
    command: &str,
) -> Result<()> {
    if output.is_json() {
        let response = DependencyChangeResponse {
            from_id: child.to_string(),
            to_id: parent.to_string(),
            changed: change != DependencyChange::Unchanged,
        };
        return output.print_json(response, command);
    }
    let message = match change {
        DependencyChange::Added => format!("Added dependency: {} -> {}", child, parent),
        DependencyChange::Removed => format!("Removed dependency: {} -> {}", child, parent),
        DependencyChange::Unchanged => format!("No change: {} -> {}", child, parent),
    };
    output.print_success(message)?;
    Ok(())
}
