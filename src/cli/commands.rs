//! Command dispatch
//!
//! Every command returns the process exit code on success; errors are
//! mapped to exit codes by [`CliError::exit_code`].

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::application::services::{BatchSummary, CheckOutcome, FitOutcome};
use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands, ConfigCommands, IdentArgs};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, OutputFormat, Settings};
use crate::domain::record::BranchCategory;
use crate::domain::{delta_col, parse_newick, IdentCheckRes, PhyloTree};
use crate::exitcode;
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;
use crate::tree_traits::TreeNodeConvert;

pub fn execute_command(cli: &Cli) -> CliResult<i32> {
    match &cli.command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(exitcode::OK)
        }
        Commands::Config { command } => cmd_config(cli, command),
        command => {
            let settings = load_settings(cli)?;
            let container = ServiceContainer::new(settings);
            match command {
                Commands::Check { fits, .. } => cmd_check(&container, fits),
                Commands::Classify { fit, .. } => cmd_classify(&container, fit),
                Commands::Record { inputs, output, .. } => {
                    cmd_record(&container, inputs, output.as_deref())
                }
                Commands::Boundary { fit, .. } => cmd_boundary(&container, fit),
                Commands::Tree {
                    fit,
                    newick,
                    reroot,
                    as_newick,
                } => cmd_tree(&container, fit.as_deref(), newick.as_deref(), reroot.as_deref(), *as_newick),
                Commands::Completion { .. } | Commands::Config { .. } => Ok(exitcode::OK),
            }
        }
    }
}

/// Layered settings with the command's flags applied last.
pub fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(format) = cli.format {
        settings.output.format = format;
    }
    let apply_ident = |settings: &mut Settings, ident: &IdentArgs| {
        if ident.strict {
            settings.identifiability.strict = true;
        }
        if let Some(strategy) = ident.strategy {
            settings.identifiability.strategy = strategy;
        }
    };
    match &cli.command {
        Commands::Check { ident, .. } => apply_ident(&mut settings, ident),
        Commands::Record { ident, jobs, .. } => {
            apply_ident(&mut settings, ident);
            if jobs.is_some() {
                settings.output.jobs = *jobs;
            }
        }
        Commands::Classify { rtol, atol, .. } => {
            if let Some(rtol) = rtol {
                settings.classify.rtol = *rtol;
            }
            if let Some(atol) = atol {
                settings.classify.atol = *atol;
            }
        }
        Commands::Boundary {
            tolerance: Some(tolerance),
            ..
        } => settings.boundary.tolerance = *tolerance,
        _ => {}
    }
    settings.validate()?;
    debug!("effective settings: {:?}", settings);
    Ok(settings)
}

fn print_json<T: Serialize + ?Sized>(what: &str, value: &T) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| InfraError::render(what, e))?;
    output::info(&json);
    Ok(())
}

fn print_ident(res: &IdentCheckRes) {
    let mode = if res.strict { "strict" } else { "non-strict" };
    if res.identifiable {
        output::verdict(true, &format!("{}: identifiable ({mode})", res.source));
    } else {
        let cause = res.cause.map(|c| c.to_string()).unwrap_or_default();
        output::verdict(false, &format!("{}: not identifiable ({mode}), cause {cause}", res.source));
        if let Some(nodes) = &res.bad_nodes {
            let nodes: Vec<&str> = nodes.iter().map(String::as_str).collect();
            output::detail(&format!("bad nodes: {}", nodes.join(", ")));
        }
    }
    for notice in &res.notices {
        output::warning(notice);
    }
}

#[instrument(skip(container))]
fn cmd_check(container: &ServiceContainer, inputs: &[PathBuf]) -> CliResult<i32> {
    let batch = container.batch();
    let files = batch.collect_fits(inputs)?;

    if let [path] = files.as_slice() {
        let diagnostics = container.diagnostics();
        let res = diagnostics.check(&diagnostics.load(path)?)?;
        match container.settings.output.format {
            OutputFormat::Json => print_json("check result", &res)?,
            OutputFormat::Text => print_ident(&res),
        }
        return Ok(exitcode::verdict(0, usize::from(!res.identifiable)));
    }

    let outcomes = batch.check(&files)?;
    match container.settings.output.format {
        OutputFormat::Json => print_json("check results", &outcomes)?,
        OutputFormat::Text => {
            for outcome in &outcomes {
                match outcome {
                    CheckOutcome::Completed { result, .. } => print_ident(result),
                    CheckOutcome::Failed { path, error } => {
                        output::error(&format!("{}: {}", path.display(), error))
                    }
                }
            }
        }
    }

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, CheckOutcome::Failed { .. }))
        .count();
    let non_identifiable = outcomes
        .iter()
        .filter(|o| matches!(o, CheckOutcome::Completed { result, .. } if !result.identifiable))
        .count();
    Ok(exitcode::verdict(failed, non_identifiable))
}

#[derive(Serialize)]
struct ClassifyOutput {
    source: String,
    categories: Vec<BranchCategoryDelta>,
}

#[derive(Serialize)]
struct BranchCategoryDelta {
    #[serde(flatten)]
    entry: BranchCategory,
    delta_col: f64,
}

#[instrument(skip(container))]
fn cmd_classify(container: &ServiceContainer, path: &Path) -> CliResult<i32> {
    let diagnostics = container.diagnostics();
    let fit = diagnostics.load(path)?;
    let mcats = diagnostics.classify(&fit)?;

    let categories: Vec<BranchCategoryDelta> = mcats
        .iter()
        .map(|(branch, category)| BranchCategoryDelta {
            entry: BranchCategory {
                branch: branch.clone(),
                category,
            },
            delta_col: fit.psubs.get(branch).map(|p| delta_col(&p.view())).unwrap_or(f64::NAN),
        })
        .collect();

    match container.settings.output.format {
        OutputFormat::Json => print_json("categories", &ClassifyOutput {
            source: fit.source.clone(),
            categories,
        })?,
        OutputFormat::Text => {
            output::header(&fit.source);
            for c in &categories {
                output::detail(&format!(
                    "{:<24} {} delta_col={:.6}",
                    c.entry.branch.to_string(),
                    output::category(c.entry.category, 12),
                    c.delta_col
                ));
            }
            let counts: Vec<String> = mcats
                .counts()
                .iter()
                .map(|(category, n)| format!("{category}={n}"))
                .collect();
            output::info(&counts.join(" "));
        }
    }
    Ok(exitcode::OK)
}

#[instrument(skip(container))]
fn cmd_record(container: &ServiceContainer, inputs: &[PathBuf], output_dir: Option<&Path>) -> CliResult<i32> {
    let batch = container.batch();
    let files = batch.collect_fits(inputs)?;
    let outcomes = batch.run(&files)?;
    let summary = BatchSummary::from_outcomes(&outcomes);

    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| container.settings.output.dir.clone());
    if let Some(dir) = dir {
        for written in batch.write_records(&outcomes, &dir)? {
            output::action("Wrote", &written.display());
        }
        for outcome in &outcomes {
            if let FitOutcome::Failed { path, error } = outcome {
                output::error(&format!("{}: {error}", path.display()));
            }
        }
    } else {
        match container.settings.output.format {
            OutputFormat::Json => print_json("records", &outcomes)?,
            OutputFormat::Text => {
                for outcome in &outcomes {
                    match outcome {
                        FitOutcome::Completed { record, .. } => {
                            let line = format!(
                                "{}: identifiable={} non_dlc={} boundary_values={}",
                                record.source,
                                record.identifiable,
                                record.iscl_mcats.len(),
                                record.boundary_values.len()
                            );
                            output::verdict(record.identifiable, &line);
                        }
                        FitOutcome::Failed { path, error } => {
                            output::error(&format!("{}: {error}", path.display()))
                        }
                    }
                }
            }
        }
    }

    output::header(&format!(
        "{} fits: {} completed ({} identifiable, {} not, {} with boundary values), {} failed",
        outcomes.len(),
        summary.completed,
        summary.identifiable,
        summary.non_identifiable,
        summary.with_boundary_values,
        summary.failed
    ));
    Ok(if summary.failed > 0 {
        exitcode::PARTIAL
    } else {
        exitcode::OK
    })
}

#[instrument(skip(container))]
fn cmd_boundary(container: &ServiceContainer, path: &Path) -> CliResult<i32> {
    let diagnostics = container.diagnostics();
    let fit = diagnostics.load(path)?;
    let bounds = diagnostics.boundary(&fit);
    match container.settings.output.format {
        OutputFormat::Json => print_json("boundary values", &bounds)?,
        OutputFormat::Text if bounds.is_empty() => {
            output::verdict(true, &format!("{}: no parameters on a bound", bounds.source))
        }
        OutputFormat::Text => {
            output::header(&bounds.source);
            for v in &bounds.violations {
                let edge = v.edge.as_deref().map(|e| format!(" [{e}]")).unwrap_or_default();
                output::detail(&format!("{}{edge} = {:e}", v.par_name, v.value));
            }
        }
    }
    Ok(exitcode::OK)
}

#[instrument(skip(container))]
fn cmd_tree(
    container: &ServiceContainer,
    fit: Option<&Path>,
    newick: Option<&str>,
    reroot: Option<&str>,
    as_newick: bool,
) -> CliResult<i32> {
    let diagnostics = container.diagnostics();
    let (mut tree, mcats): (PhyloTree, _) = match (fit, newick) {
        (Some(path), _) => {
            let fit = diagnostics.load(path)?;
            let mcats = diagnostics.classify(&fit)?;
            (fit.tree, Some(mcats))
        }
        (None, Some(text)) => (parse_newick(text).map_err(ApplicationError::from)?, None),
        (None, None) => return Err(CliError::Usage("a fit file or --newick is required".into())),
    };
    if let Some(node) = reroot {
        tree.reroot(node).map_err(ApplicationError::from)?;
    }

    if as_newick {
        output::info(&tree.to_newick());
    } else {
        let rendered = match &mcats {
            Some(mcats) => tree.to_labelled_tree(mcats),
            None => tree.to_tree_string(),
        };
        output::info(&rendered);
    }
    Ok(exitcode::OK)
}

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<i32> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => {
            let global =
                global_config_path().ok_or(InfraError::NoHomeDir("global config directory"))?;
            let state = if global.exists() { "" } else { " (not present)" };
            output::action("global", &format!("{}{state}", global.display()));
            if let Some(local) = &cli.config {
                output::action("file", &local.display());
            }
        }
    }
    Ok(exitcode::OK)
}
