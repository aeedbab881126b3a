use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use doctool_core::config::{DocsConfig, load_config};
use doctool_core::labels::{LabelAuditReport, audit_plan};
use doctool_core::links::{RepairOptions, RepairReport, repair_tree};
use doctool_core::prompts::{
    PromptSyncReport, PromptVerifyReport, SyncOptions, sync_prompts, verify_prompts,
};
use doctool_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, embedded_prompt_template,
    init_layout, inspect_runtime, resolve_paths,
};
use doctool_core::scan::{ScanStats, find_plan_files, scan_stats};

#[derive(Debug, Parser)]
#[command(
    name = "doctool",
    version,
    about = "Maintenance toolbox for a documentation content tree"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    docs_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    docs_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            docs_dir: cli.docs_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    Status(StatusArgs),
    #[command(name = "fix-links")]
    FixLinks(FixLinksArgs),
    #[command(name = "check-labels")]
    CheckLabels(CheckLabelsArgs),
    #[command(name = "verify-prompts")]
    VerifyPrompts(VerifyPromptsArgs),
    #[command(name = "sync-prompts")]
    SyncPrompts(SyncPromptsArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite existing config/template files")]
    force: bool,
    #[arg(long, help = "Skip writing .doctool/config.toml")]
    no_config: bool,
    #[arg(long, help = "Skip writing .doctool/prompt-template.md")]
    no_template: bool,
}

#[derive(Debug, Args)]
struct StatusArgs {
    #[arg(value_name = "DIR", help = "Docs subdirectories to inspect")]
    dirs: Vec<String>,
}

#[derive(Debug, Args)]
struct FixLinksArgs {
    #[arg(value_name = "DIR", help = "Docs subdirectories to repair")]
    dirs: Vec<String>,
    #[arg(long, help = "Report rewrites and show diffs without writing")]
    dry_run: bool,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct CheckLabelsArgs {
    #[arg(long, value_name = "PATH", help = "Audit a single plan file")]
    plan: Option<PathBuf>,
    #[arg(value_name = "DIR", help = "Docs subdirectories to search for plans")]
    dirs: Vec<String>,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct VerifyPromptsArgs {
    #[arg(long, value_name = "PATH", help = "Verify against a single plan file")]
    plan: Option<PathBuf>,
    #[arg(value_name = "DIR", help = "Docs subdirectories to search for plans")]
    dirs: Vec<String>,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct SyncPromptsArgs {
    #[arg(long, value_name = "PATH", help = "Sync against a single plan file")]
    plan: Option<PathBuf>,
    #[arg(value_name = "DIR", help = "Docs subdirectories to search for plans")]
    dirs: Vec<String>,
    #[arg(long, help = "Report actions without touching any file")]
    dry_run: bool,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status(args)) => run_status(&runtime, args),
        Some(Commands::FixLinks(args)) => run_fix_links(&runtime, args),
        Some(Commands::CheckLabels(args)) => run_check_labels(&runtime, args),
        Some(Commands::VerifyPrompts(args)) => run_verify_prompts(&runtime, args),
        Some(Commands::SyncPrompts(args)) => run_sync_prompts(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            materialize_template: !args.no_template,
            force: args.force,
        },
    )?;

    println!("Initialized doctool runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("docs_dir: {}", normalize_path(&paths.docs_dir));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("template_path: {}", normalize_path(&paths.template_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    println!("wrote_template: {}", report.wrote_template);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions, args: StatusArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);
    let config = load_config(&paths.config_path)?;
    let dirs = config.effective_dirs(&args.dirs);
    let scan = scan_stats(&paths.docs_dir, &config, &dirs)?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("docs_dir: {}", normalize_path(&paths.docs_dir));
    println!("docs_dir_exists: {}", format_flag(status.docs_dir_exists));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("template_exists: {}", format_flag(status.template_exists));
    print_scan_stats("scan", &scan);
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_fix_links(runtime: &RuntimeOptions, args: FixLinksArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let dirs = config.effective_dirs(&args.dirs);
    let options = RepairOptions {
        dry_run: args.dry_run,
    };

    let targets: Vec<PathBuf> = if dirs.is_empty() {
        vec![paths.docs_dir.clone()]
    } else {
        dirs.iter().map(|dir| paths.docs_dir.join(dir)).collect()
    };

    let mut reports: Vec<RepairReport> = Vec::new();
    for target in targets {
        if !args.json {
            println!("Processing {}...", normalize_path(&target));
        }
        let report = repair_tree(&target, &config, &options)?;
        if !args.json {
            print_repair_report(&report);
        }
        reports.push(report);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn print_repair_report(report: &RepairReport) {
    if !report.root_exists {
        println!("Error: directory {} not found.", report.root);
        return;
    }
    for rewrite in &report.rewrites {
        println!(
            "Fixing in {}: {} -> {}",
            rewrite.file, rewrite.from, rewrite.to
        );
    }
    for diff in &report.diffs {
        print!("{}", diff.diff);
    }
    println!("documents_scanned: {}", report.documents_scanned);
    println!("documents_modified: {}", report.documents_modified);
    println!("rewrites: {}", report.rewrites.len());
    println!(
        "skipped_missing_picture_dir: {}",
        report.skipped_missing_picture_dir
    );
    println!("unrecognized_filenames: {}", report.unrecognized_filenames);
    println!("unmatched_prefixes: {}", report.unmatched_prefixes);
    if report.dry_run {
        println!("dry_run: true (no files written)");
    }
    if !report.errors.is_empty() {
        println!("errors:");
        for error in &report.errors {
            println!("  - {error}");
        }
    }
}

fn run_check_labels(runtime: &RuntimeOptions, args: CheckLabelsArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let plans = select_plans(&paths, &config, args.plan.as_deref(), &args.dirs)?;

    let mut reports: Vec<LabelAuditReport> = Vec::new();
    for plan in &plans {
        reports.push(audit_plan(plan)?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        print_diagnostics(runtime, &paths);
        return Ok(());
    }

    println!("check-labels");
    if reports.is_empty() {
        println!("plans: <none>");
    }
    for report in &reports {
        println!("plan: {}", report.plan);
        println!("prompt_lines: {}", report.prompt_lines);
        if report.clean {
            println!("issues: <none>");
        } else {
            for issue in &report.issues {
                println!("  line {}: {}", issue.line, issue.kind.describe());
                println!("    {}", issue.content);
            }
            println!("issues: {}", report.issues.len());
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_verify_prompts(runtime: &RuntimeOptions, args: VerifyPromptsArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let plans = select_plans(&paths, &config, args.plan.as_deref(), &args.dirs)?;

    let mut reports: Vec<PromptVerifyReport> = Vec::new();
    for plan in &plans {
        let dir = plan_dir(plan)?;
        reports.push(verify_prompts(plan, dir, &config)?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        print_diagnostics(runtime, &paths);
        return Ok(());
    }

    println!("verify-prompts");
    if reports.is_empty() {
        println!("plans: <none>");
    }
    for report in &reports {
        println!("plan: {}", report.plan);
        println!("planned: {}", report.planned);
        println!("generated: {}", report.generated);
        print_name_list("missing", &report.missing);
        print_name_list("extra", &report.extra);
        println!("in_sync: {}", format_flag(report.in_sync));
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_sync_prompts(runtime: &RuntimeOptions, args: SyncPromptsArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let plans = select_plans(&paths, &config, args.plan.as_deref(), &args.dirs)?;
    let template = load_template(&paths)?;
    let options = SyncOptions {
        dry_run: args.dry_run,
    };

    let mut reports: Vec<PromptSyncReport> = Vec::new();
    for plan in &plans {
        let dir = plan_dir(plan)?;
        reports.push(sync_prompts(plan, dir, &config, &template, &options)?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        print_diagnostics(runtime, &paths);
        return Ok(());
    }

    println!("sync-prompts");
    if reports.is_empty() {
        println!("plans: <none>");
    }
    for report in &reports {
        println!("plan: {}", report.plan);
        for action in &report.actions {
            println!("  {} {}", action.action, action.file);
        }
        println!("planned: {}", report.planned);
        println!("created: {}", report.created);
        println!("deleted: {}", report.deleted);
        println!("unchanged: {}", report.unchanged);
        println!(
            "skipped_missing_prompt: {}",
            report.skipped_missing_prompt
        );
        if report.dry_run {
            println!("dry_run: true (no files written)");
        }
        if !report.errors.is_empty() {
            println!("errors:");
            for error in &report.errors {
                println!("  - {error}");
            }
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn select_plans(
    paths: &ResolvedPaths,
    config: &DocsConfig,
    explicit: Option<&Path>,
    cli_dirs: &[String],
) -> Result<Vec<PathBuf>> {
    if let Some(plan) = explicit {
        if !plan.exists() {
            bail!("plan file not found: {}", normalize_path(plan));
        }
        return Ok(vec![plan.to_path_buf()]);
    }
    let dirs = config.effective_dirs(cli_dirs);
    find_plan_files(&paths.docs_dir, config, &dirs)
}

fn plan_dir(plan: &Path) -> Result<&Path> {
    plan.parent()
        .ok_or_else(|| anyhow::anyhow!("plan path has no parent: {}", plan.display()))
}

fn load_template(paths: &ResolvedPaths) -> Result<String> {
    if paths.template_path.exists() {
        return fs::read_to_string(&paths.template_path)
            .with_context(|| format!("failed to read {}", paths.template_path.display()));
    }
    Ok(embedded_prompt_template().to_string())
}

fn print_scan_stats(prefix: &str, stats: &ScanStats) {
    println!("{prefix}.total_documents: {}", stats.total_documents);
    println!(
        "{prefix}.documents_with_images: {}",
        stats.documents_with_images
    );
    println!("{prefix}.image_refs: {}", stats.image_refs);
    println!("{prefix}.picture_dirs: {}", stats.picture_dirs);
    println!("{prefix}.picture_files: {}", stats.picture_files);
    if stats.by_dir.is_empty() {
        println!("{prefix}.by_dir: <empty>");
    } else {
        for (dir, count) in &stats.by_dir {
            println!("{prefix}.dir.{dir}: {count}");
        }
    }
    for missing in &stats.missing_dirs {
        println!("{prefix}.missing_dir: {missing}");
    }
}

fn print_name_list(label: &str, names: &[String]) {
    if names.is_empty() {
        println!("{label}: <none>");
    } else {
        for name in names {
            println!("{label}: {name}");
        }
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        docs_dir: runtime.docs_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
