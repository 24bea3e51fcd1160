//! Gen3 Validator CLI
//!
//! Resolves dictionaries and validates metadata submissions against them.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use gen3_validator::config::OutputFormat;
use gen3_validator::graph::{self, NodeGraph};
use gen3_validator::loader;
use gen3_validator::validate::report::{collapse, sorted_rows};
use gen3_validator::{
    DataMap, Linkage, LinkReport, ResolvedSchema, ResultFilter, StructuralValidator,
    TabularConverter, ValidatorConfig,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gen3-validator")]
#[command(about = "Resolve Gen3 dictionaries and validate metadata submissions")]
struct Cli {
    /// Configuration file (defaults to validator.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Compact JSON output
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every $ref in a dictionary
    Resolve {
        /// Bundled dictionary (JSON)
        #[arg(short, long)]
        schema: PathBuf,
        /// Write the resolved dictionary here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print entities in dependency order
    Order {
        /// Bundled dictionary (JSON)
        #[arg(short, long)]
        schema: PathBuf,
        /// Print the relationship graph as GraphViz DOT instead
        #[arg(long)]
        dot: bool,
    },

    /// Check primary/foreign key linkage of a submission
    Links {
        #[command(flatten)]
        data: DataArgs,
        /// Hand-written linkage config (inferred from the data when omitted)
        #[arg(long)]
        linkage: Option<PathBuf>,
    },

    /// Validate a submission against a dictionary
    Validate {
        /// Bundled dictionary (JSON)
        #[arg(short, long)]
        schema: PathBuf,
        #[command(flatten)]
        data: DataArgs,
        /// Report shape
        #[arg(short, long, value_enum, default_value_t = ReportKind::Summary)]
        report: ReportKind,
        /// Outcomes included in flat and collapsed reports (PASS, FAIL, ALL)
        #[arg(long, default_value = "FAIL")]
        filter: ResultFilter,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Write a default config file here
        #[arg(long)]
        init: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct DataArgs {
    /// Folder of <entity>.json files
    #[arg(short, long, required_unless_present = "workbook")]
    data: Option<PathBuf>,
    /// Workbook exported as {"<sheet>": [rows]}
    #[arg(short, long, conflicts_with = "data")]
    workbook: Option<PathBuf>,
    /// Leading rows to drop from each sheet
    #[arg(long, default_value_t = 0)]
    skip_rows: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    /// Per-entity error counts
    Summary,
    /// One row per outcome
    Flat,
    /// One row per distinct error message
    Collapsed,
    /// The full result tree
    Tree,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

/// Returns false when the submission failed a check
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = ValidatorConfig::load_from(cli.config.as_deref().and_then(Path::to_str))
        .context("loading configuration")?;
    if cli.compact {
        config.output.format = OutputFormat::Compact;
    }
    let format = config.output.format;

    match cli.command {
        Commands::Resolve { schema, output } => {
            let resolved = resolve(&schema, &config)?;
            for warning in &resolved.warnings {
                eprintln!("⚠️  {} skipped: {}", warning.node, warning.message);
            }

            let bundle = resolved.resolved.to_suffixed_map();
            match output {
                Some(path) => {
                    loader::write_json(&path, &bundle, format)?;
                    println!(
                        "✅ Resolved {} nodes (version {}, fingerprint {})",
                        resolved.resolved.len(),
                        resolved.version,
                        resolved.fingerprint.short()
                    );
                    println!("   Output: {}", path.display());
                }
                None => println!("{}", format.render(&bundle)?),
            }
            Ok(true)
        }

        Commands::Order { schema, dot } => {
            let document = loader::load_schema(&schema)?;
            let pairs = graph::build_edges(&document, &config.schema.excluded_nodes);
            let node_graph = NodeGraph::from_pairs(&pairs);
            eprintln!(
                "📊 {} entities, {} links",
                node_graph.node_count(),
                node_graph.edge_count()
            );
            if dot {
                print!("{}", node_graph.to_dot());
            } else {
                for node in graph::order(&pairs, config.schema.aggregation_node.as_deref())? {
                    println!("{}", node);
                }
            }
            Ok(true)
        }

        Commands::Links { data, linkage } => {
            let data = load_data(&data, &config)?;
            let mut checker = Linkage::new(&config.linkage);
            let linkage_config = match linkage {
                Some(path) => loader::load_linkage_config(&path)
                    .with_context(|| format!("reading linkage config {}", path.display()))?,
                None => checker.generate_config(&data),
            };

            let report = checker.validate_links(&data, &linkage_config)?;
            println!(
                "{}",
                format.render(&json!({"config": linkage_config, "report": report}))?
            );

            match report {
                LinkReport::BrokenConfig(links) => {
                    eprintln!("❌ Linkage config has {} broken link(s)", links.len());
                    Ok(false)
                }
                LinkReport::Checked(_) if report.is_clean() => {
                    eprintln!("✅ All foreign keys resolve");
                    Ok(true)
                }
                LinkReport::Checked(_) => {
                    eprintln!("❌ {} orphaned foreign key value(s)", report.orphan_count());
                    Ok(false)
                }
            }
        }

        Commands::Validate {
            schema,
            data,
            report,
            filter,
            output,
        } => {
            let resolved = resolve(&schema, &config)?;
            let data = load_data(&data, &config)?;

            let tree = StructuralValidator::new(config.validation.leading_error)
                .validate(&data, &resolved.resolved);
            let total = tree.total_validation_errors();

            let body = match report {
                ReportKind::Summary => serde_json::to_value(tree.summary_stats())?,
                ReportKind::Flat => serde_json::to_value(sorted_rows(tree.flatten(filter)))?,
                ReportKind::Collapsed => serde_json::to_value(collapse(&tree.flatten(filter)))?,
                ReportKind::Tree => serde_json::to_value(&tree)?,
            };
            let document = json!({
                "generated_at": Utc::now().to_rfc3339(),
                "dictionary_version": resolved.version,
                "fingerprint": resolved.fingerprint,
                "leading_error": config.validation.leading_error,
                "total_validation_errors": total,
                "results": body,
            });

            match output {
                Some(path) => loader::write_json(&path, &document, format)?,
                None => println!("{}", format.render(&document)?),
            }

            if total == 0 {
                eprintln!("✅ {} entities validated, no errors", tree.len());
                Ok(true)
            } else {
                eprintln!("❌ {} validation error(s) across {} entities", total, tree.len());
                Ok(false)
            }
        }

        Commands::Config { init } => {
            if let Some(path) = init {
                if path.exists() {
                    bail!("{} already exists", path.display());
                }
                let path_str = path.to_str().context("config path is not valid UTF-8")?;
                ValidatorConfig::default().save(path_str)?;
                println!("✅ Wrote default configuration to {}", path.display());
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(true)
        }
    }
}

fn resolve(schema: &Path, config: &ValidatorConfig) -> anyhow::Result<ResolvedSchema> {
    let document = loader::load_schema(schema)
        .with_context(|| format!("reading dictionary {}", schema.display()))?;
    Ok(ResolvedSchema::from_document(&document, &config.schema)?)
}

fn load_data(args: &DataArgs, config: &ValidatorConfig) -> anyhow::Result<DataMap> {
    match (&args.data, &args.workbook) {
        (_, Some(workbook)) => {
            let sheets = loader::load_sheets(workbook)
                .with_context(|| format!("reading workbook {}", workbook.display()))?;
            Ok(TabularConverter::new(args.skip_rows, &config.linkage).convert(&sheets))
        }
        (Some(dir), None) => loader::load_data_dir(dir)
            .with_context(|| format!("reading data folder {}", dir.display())),
        (None, None) => bail!("either --data or --workbook is required"),
    }
}
