//! aemport - AEM component to React component conversion
//!
//! ## Commands
//!
//! - `convert`: Run the generate/review/repair loop for one component
//! - `deps`: Print a component's dependency tree
//! - `styles`: Print the style cascade resolution for a component
//! - `registry`: List or remove previously generated artifacts
//! - `report`: Print a recorded run report

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aemport_agents::{
    model_collaborators, ChatModel, CommandValidator, OpenAiChatClient, ServiceConfig,
};
use aemport_core::config::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_ITERATIONS};
use aemport_core::reporting::run_dir;
use aemport_core::{
    read_report, ArtifactRegistry, ComponentNode, DependencyResolver, PipelineOrchestrator,
    PortConfig, PortError, ResourceLocator, RetryPolicy, Severity, StyleCascadeResolver,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "aemport")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Convert AEM components into reviewed React components", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Root of the AEM source repository
    #[arg(long, global = true, env = "AEMPORT_REPO_ROOT")]
    repo_root: Option<PathBuf>,

    /// Directory receiving generated components, the registry and run reports
    #[arg(long, global = true, env = "AEMPORT_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// How many levels of included components to follow
    #[arg(long, global = true, env = "AEMPORT_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a component and review it until it passes or the repair budget runs out
    Convert {
        /// Component identifier, e.g. `mysite/components/card`
        component: String,

        /// Repair cycles allowed after the first review
        #[arg(
            short = 'n',
            long,
            env = "AEMPORT_MAX_ITERATIONS",
            default_value_t = DEFAULT_MAX_ITERATIONS
        )]
        max_iterations: u32,

        /// Findings at or above this severity fail the review
        #[arg(long, env = "AEMPORT_SEVERITY_THRESHOLD", default_value = "high")]
        severity_threshold: Severity,

        /// Chat completion base URL (default: AEMPORT_API_BASE or OpenAI)
        #[arg(long)]
        api_base: Option<String>,

        /// API key (default: AEMPORT_API_KEY or OPENAI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Model name (default: AEMPORT_MODEL or gpt-4)
        #[arg(long)]
        model: Option<String>,

        /// Sampling temperature for every model call, 0 to 2 (default: 0.1)
        #[arg(long, env = "AEMPORT_TEMPERATURE")]
        temperature: Option<f32>,

        /// Design-library checkout searched for suggested components
        #[arg(long, env = "AEMPORT_DESIGN_LIBRARY")]
        design_library: Option<PathBuf>,

        /// Build command run against the output directory as an extra review check
        #[arg(long, env = "AEMPORT_BUILD_COMMAND")]
        build_command: Option<String>,

        /// Do not retry transient collaborator failures
        #[arg(long)]
        no_retry: bool,
    },

    /// Print the dependency tree of a component
    Deps {
        /// Component identifier
        component: String,
    },

    /// Print where each CSS class used by a component was found
    Styles {
        /// Component identifier
        component: String,
    },

    /// Manage the registry of generated artifacts
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// Print a recorded run report after verifying its digest
    Report {
        /// Run ID printed by `convert`
        run_id: String,

        /// Print the stored JSON instead of markdown
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Subcommand)]
enum RegistryAction {
    /// List registered artifacts
    List,
    /// Forget one component's artifact (the files are left in place)
    Remove {
        /// Component identifier
        component: String,
    },
}

/// Settings shared by `convert` that are not part of [`PortConfig`].
struct ServiceOverrides {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
}

impl ServiceOverrides {
    fn apply(self, mut config: ServiceConfig) -> ServiceConfig {
        if let Some(base) = self.api_base {
            config.api_base = base;
        }
        if let Some(key) = self.api_key {
            config.api_key = key;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    aemport_core::init_tracing(cli.json, level);

    let mut config = PortConfig::new(cli.repo_root.clone().unwrap_or_default(), &cli.output_dir);
    config.max_dependency_depth = cli.max_depth;

    match cli.command {
        Commands::Convert {
            component,
            max_iterations,
            severity_threshold,
            api_base,
            api_key,
            model,
            temperature,
            design_library,
            build_command,
            no_retry,
        } => {
            config.max_iterations = max_iterations;
            config.severity_threshold = severity_threshold;
            config.design_library = design_library;
            if no_retry {
                config.retry = RetryPolicy::NONE;
            }
            let service = ServiceOverrides {
                api_base,
                api_key,
                model,
                temperature,
            }
            .apply(ServiceConfig::from_env());
            cmd_convert(config, service, build_command.as_deref(), &component).await
        }
        Commands::Deps { component } => cmd_deps(&config, &component),
        Commands::Styles { component } => cmd_styles(&config, &component),
        Commands::Registry { action } => match action {
            RegistryAction::List => cmd_registry_list(&config.output_dir),
            RegistryAction::Remove { component } => {
                cmd_registry_remove(&config.output_dir, &component)
            }
        },
        Commands::Report { run_id, raw } => cmd_report(&config.output_dir, &run_id, raw),
    }
}

// ---------------------------------------------------------------------------
// convert
// ---------------------------------------------------------------------------

/// Port and service problems, reported together.
fn startup_problems(config: &PortConfig, service: &ServiceConfig) -> Vec<String> {
    let mut problems = config.problems();
    problems.extend(service.problems());
    problems
}

async fn cmd_convert(
    config: PortConfig,
    service: ServiceConfig,
    build_command: Option<&str>,
    component: &str,
) -> Result<()> {
    let problems = startup_problems(&config, &service);
    if !problems.is_empty() {
        return Err(PortError::Config { problems }.into());
    }

    info!(
        model = %service.model,
        api_base = %service.api_base,
        temperature = service.temperature,
        "using chat completion service"
    );
    let temperature = service.temperature;
    let client = OpenAiChatClient::new(service).context("Failed to create chat client")?;
    let model: Arc<dyn ChatModel> = Arc::new(client);
    let build = build_command.and_then(CommandValidator::from_command_line);

    let output_dir = config.output_dir.clone();
    let collaborators = model_collaborators(model, &config, temperature, build)?;
    let mut orchestrator = PipelineOrchestrator::new(config, collaborators)?;
    let report = orchestrator
        .run(component)
        .await
        .with_context(|| format!("Conversion of {component} failed"))?;

    println!("{}", report.summary_line());
    for finding in report.findings.iter().filter(|f| !f.passed || f.severity > Severity::None) {
        println!(
            "  {} [{}] {}",
            finding.check_name,
            finding.severity,
            finding.issues.join("; ")
        );
    }
    if !report.unresolved_dependencies.is_empty() {
        println!("  unresolved: {}", report.unresolved_dependencies.join(", "));
    }
    println!("Artifact: {}", report.artifact_path.display());
    if let Some(style) = &report.style_path {
        println!("Styles:   {}", style.display());
    }
    println!("Run:      {}", report.run_id);
    println!("Report:   {}", run_dir(&output_dir, &report.run_id).display());
    Ok(())
}

// ---------------------------------------------------------------------------
// deps / styles
// ---------------------------------------------------------------------------

fn locator(config: &PortConfig) -> Result<ResourceLocator> {
    if !config.repo_root.is_dir() {
        anyhow::bail!(
            "Repository root is not a directory: {:?} (set --repo-root or AEMPORT_REPO_ROOT)",
            config.repo_root
        );
    }
    Ok(ResourceLocator::new(&config.repo_root))
}

fn tree_lines(
    node: &ComponentNode,
    locator: &ResourceLocator,
    depth: usize,
    out: &mut Vec<String>,
) {
    out.push(format!(
        "{}{} ({}, {} files)",
        "  ".repeat(depth),
        node.id,
        locator.display_path(&node.path),
        node.files.len()
    ));
    for dep in node.dependencies.values() {
        tree_lines(dep, locator, depth + 1, out);
    }
}

fn cmd_deps(config: &PortConfig, component: &str) -> Result<()> {
    let locator = locator(config)?;
    let resolver = DependencyResolver::new(locator.clone());
    let resolution = resolver.resolve_id(component, config.max_dependency_depth)?;

    let mut lines = Vec::new();
    tree_lines(&resolution.root, &locator, 0, &mut lines);
    for line in lines {
        println!("{line}");
    }
    for unresolved in &resolution.unresolved {
        println!(
            "unresolved: {} (from {}): {}",
            unresolved.id, unresolved.referenced_by, unresolved.reason
        );
    }
    for id in &resolution.truncated {
        println!("truncated:  {id} (depth limit {})", config.max_dependency_depth);
    }
    for cycle in &resolution.cycles {
        println!("cycle:      {}", cycle.path.join(" -> "));
    }
    Ok(())
}

fn cmd_styles(config: &PortConfig, component: &str) -> Result<()> {
    let locator = locator(config)?;
    let path = locator
        .locate(component)
        .ok_or_else(|| PortError::ComponentNotFound(component.to_string()))?;
    let styles = StyleCascadeResolver::new(locator.clone());
    let used = styles.used_classes(&path);
    let resolution = styles.resolve(&path, &used);

    println!("{} classes used", used.len());
    for (class, sources) in &resolution.rules {
        let step = resolution
            .found_by
            .get(class)
            .map(|s| format!("{s:?}"))
            .unwrap_or_default();
        let labels: Vec<&str> = sources.keys().map(String::as_str).collect();
        println!(".{class} [{step}] {}", labels.join(", "));
    }
    for class in &resolution.dynamic_classes {
        println!("dynamic:  .{class}");
    }
    for label in resolution.inline_styles.keys() {
        println!("injected: {label}");
    }
    if !resolution.missing_classes.is_empty() {
        let missing: Vec<&str> = resolution.missing_classes.iter().map(String::as_str).collect();
        println!("missing:  {}", missing.join(", "));
    }
    if !resolution.visited_categories.is_empty() {
        let visited: Vec<&str> = resolution.visited_categories.iter().map(String::as_str).collect();
        println!("bundles:  {}", visited.join(", "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// registry / report
// ---------------------------------------------------------------------------

fn cmd_registry_list(output_dir: &Path) -> Result<()> {
    let registry = ArtifactRegistry::in_output_dir(output_dir)
        .with_context(|| format!("Failed to open registry in {:?}", output_dir))?;
    let entries = registry.entries();
    if entries.is_empty() {
        println!("No registered artifacts in {}", output_dir.display());
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}\t{}\t{}{}",
            entry.component_id,
            entry.display_name,
            entry.artifact_path.display(),
            if entry.is_live() { "" } else { "\t(missing)" }
        );
    }
    Ok(())
}

fn cmd_registry_remove(output_dir: &Path, component: &str) -> Result<()> {
    let mut registry = ArtifactRegistry::in_output_dir(output_dir)
        .with_context(|| format!("Failed to open registry in {:?}", output_dir))?;
    if registry.remove(component)? {
        println!("Removed {component}");
    } else {
        println!("{component} is not registered");
    }
    Ok(())
}

fn cmd_report(output_dir: &Path, run_id: &str, raw: bool) -> Result<()> {
    let report = read_report(output_dir, run_id)
        .with_context(|| format!("Failed to load report for run {run_id}"))?;
    if raw {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_markdown());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_convert_arguments() {
        let cli = Cli::try_parse_from([
            "aemport",
            "--repo-root",
            "/tmp/repo",
            "convert",
            "site/components/card",
            "-n",
            "2",
            "--severity-threshold",
            "critical",
            "--build-command",
            "npm run build",
            "--temperature",
            "0.4",
            "--design-library",
            "/tmp/design-lib",
        ])
        .unwrap();
        assert_eq!(cli.repo_root, Some(PathBuf::from("/tmp/repo")));
        match cli.command {
            Commands::Convert {
                component,
                max_iterations,
                severity_threshold,
                build_command,
                temperature,
                design_library,
                no_retry,
                ..
            } => {
                assert_eq!(component, "site/components/card");
                assert_eq!(max_iterations, 2);
                assert_eq!(severity_threshold, Severity::Critical);
                assert_eq!(build_command.as_deref(), Some("npm run build"));
                assert_eq!(temperature, Some(0.4));
                assert_eq!(design_library, Some(PathBuf::from("/tmp/design-lib")));
                assert!(!no_retry);
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_unknown_severity_is_rejected() {
        let parsed = Cli::try_parse_from([
            "aemport",
            "convert",
            "site/components/card",
            "--severity-threshold",
            "severe",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_overrides_replace_environment_values() {
        let base = ServiceConfig::new("https://api.openai.com/v1", "from-env", "gpt-4");
        let config = ServiceOverrides {
            api_base: Some("http://localhost:8080/v1".to_string()),
            api_key: None,
            model: Some("local".to_string()),
            temperature: Some(0.7),
        }
        .apply(base);
        assert_eq!(config.api_base, "http://localhost:8080/v1");
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.model, "local");
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn test_startup_problems_are_merged() {
        let config = PortConfig::new("/definitely/not/here", "/tmp/aemport-out");
        let service = ServiceConfig::new("ftp://example", "", "gpt-4");
        let problems = startup_problems(&config, &service);
        assert!(problems.iter().any(|p| p.contains("repository root")));
        assert!(problems.len() >= 3, "{problems:?}");
    }
}
