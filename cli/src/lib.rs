use anyhow::{anyhow, Error, Result};
use clap::{Parser, Subcommand};
use log::info;
use rdf2tg::api::{find_config, run_stages};
use rdf2tg::config::{parse_namespace_arg, Config, ConfigBuilder};
use rdf2tg::consts::CONFIG_FILE;
use rdf2tg::options::{AbbreviationMode, Stage};
use rdf2tg::pipeline::RunSummary;
use rdf2tg::schema::{schema_script, LoadingJob, SCHEMA_VERSION};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "rdf2tg")]
#[command(about = "Convert an RDF triple store into a TigerGraph property graph")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
    /// Configuration file, defaults to the nearest rdf2tg.json
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    /// SPARQL endpoint to extract triples from
    #[clap(long, global = true)]
    endpoint: Option<String>,
    /// Directory for the generated files and the run log
    #[clap(long, short, global = true)]
    work_dir: Option<PathBuf>,
    /// TigerGraph host, e.g. https://example.i.tgcloud.io
    #[clap(long, global = true)]
    host: Option<String>,
    /// TigerGraph user name
    #[clap(long, short, global = true)]
    username: Option<String>,
    /// Graph to create and load
    #[clap(long, short, global = true)]
    graph: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Write a configuration file from the current settings.
    Init {
        /// Overwrite an existing file
        #[clap(long, action, default_value = "false")]
        force: bool,
    },
    /// Print the effective configuration.
    Show {
        /// Output JSON instead of text
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a range of stages, by default all of them
    Run {
        /// First stage to run
        #[clap(long, default_value = "extract")]
        from: Stage,
        /// Last stage to run
        #[clap(long, default_value = "benchmark")]
        to: Stage,
        /// Directory holding the basic/ and advanced/ query texts
        #[clap(long)]
        queries_dir: Option<PathBuf>,
    },
    /// Extract the object and datatype files from the SPARQL endpoint
    Extract {
        /// Accept empty result sets
        #[clap(long, action, default_value = "false")]
        allow_empty: bool,
    },
    /// Write abbreviated copies of the extracted files
    Abbreviate {
        /// verbatim or fields
        #[clap(long)]
        mode: Option<AbbreviationMode>,
        /// Extra namespace declaration, as prefix=iri
        #[clap(long = "namespace", short = 'n')]
        namespaces: Vec<String>,
    },
    /// Print the schema and loading job, or create them with --apply
    Schema {
        #[clap(long, action, default_value = "false")]
        apply: bool,
    },
    /// Upload the abbreviated files to the loading job
    Load,
    /// Create and install the benchmark queries
    Install {
        #[clap(long)]
        queries_dir: Option<PathBuf>,
    },
    /// Time one call of each installed query
    Bench {
        #[clap(long)]
        queries_dir: Option<PathBuf>,
    },
    /// Manage the configuration file.
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Prints the version of the rdf2tg binary
    Version,
}

pub fn run() -> Result<()> {
    rdf2tg::api::init_logging();
    let cmd = Cli::parse();
    execute(cmd)
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    rdf2tg::api::init_logging();
    let cmd = Cli::try_parse_from(args).map_err(Error::from)?;
    execute(cmd)
}

fn load_config(cmd: &Cli) -> Result<(Config, Option<PathBuf>)> {
    let path = cmd.config.clone().or_else(find_config);
    let config = match &path {
        Some(path) if path.is_file() => {
            info!("Using configuration {}", path.display());
            Config::from_file(path)?
        }
        Some(path) if cmd.config.is_some() && !matches!(cmd.command, Commands::Config(_)) => {
            return Err(anyhow!("Configuration file {} does not exist", path.display()));
        }
        _ => Config::default(),
    };
    let mut builder = ConfigBuilder::from(config);
    if let Some(endpoint) = &cmd.endpoint {
        builder = builder.sparql_endpoint(endpoint);
    }
    if let Some(dir) = &cmd.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(host) = &cmd.host {
        builder = builder.host(host);
    }
    if let Some(username) = &cmd.username {
        builder = builder.username(username);
    }
    if let Some(graph) = &cmd.graph {
        builder = builder.graph(graph);
    }
    match &cmd.command {
        Commands::Extract { allow_empty: true } => builder = builder.allow_empty(true),
        Commands::Abbreviate { mode, namespaces } => {
            if let Some(mode) = mode {
                builder = builder.abbreviation(*mode);
            }
            for arg in namespaces {
                let (prefix, namespace) = parse_namespace_arg(arg)?;
                builder = builder.namespace(prefix, namespace);
            }
        }
        Commands::Run {
            queries_dir: Some(dir),
            ..
        }
        | Commands::Install {
            queries_dir: Some(dir),
        }
        | Commands::Bench {
            queries_dir: Some(dir),
        } => builder = builder.queries_dir(dir),
        _ => {}
    }
    Ok((builder.build()?, path))
}

fn report(summary: &RunSummary) {
    if let Some(extraction) = &summary.extraction {
        println!(
            "{} object rows, {} datatype rows",
            extraction.object_rows, extraction.datatype_rows
        );
    }
    if let Some(benchmark) = &summary.benchmark {
        benchmark.print();
    }
    for err in &summary.isolated_errors {
        eprintln!("{}", err);
    }
}

fn execute(cmd: Cli) -> Result<()> {
    // The RUST_LOG env var is set by `init_logging` if RDF2TG_LOG is present.
    // CLI flags for verbosity take precedence. If nothing is set, we default to "warn".
    if cmd.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if cmd.verbose {
        std::env::set_var("RUST_LOG", "info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let _ = env_logger::try_init();

    let (config, config_path) = load_config(&cmd)?;
    if cmd.verbose || cmd.debug {
        config.print();
    }

    let stages = match &cmd.command {
        Commands::Run { from, to, .. } => {
            if from > to {
                return Err(anyhow!("--from {} comes after --to {}", from, to));
            }
            Stage::range(*from, *to)
        }
        Commands::Extract { .. } => vec![Stage::Extract],
        Commands::Abbreviate { .. } => vec![Stage::Abbreviate],
        Commands::Schema { apply: true } => vec![Stage::Schema],
        Commands::Schema { apply: false } => {
            let job = LoadingJob::standard(&config.tigergraph.job, &config.tigergraph.graph);
            println!("{}", schema_script(&config.tigergraph.graph));
            println!("{}", job.script()?);
            return Ok(());
        }
        Commands::Load => vec![Stage::Load],
        Commands::Install { .. } => vec![Stage::Install],
        Commands::Bench { .. } => vec![Stage::Benchmark],
        Commands::Config(ConfigCommands::Init { force }) => {
            let path = cmd
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            if path.exists() && !force {
                return Err(anyhow!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                ));
            }
            config.save_to_file(&path)?;
            println!("Wrote {}", path.display());
            return Ok(());
        }
        Commands::Config(ConfigCommands::Show { json }) => {
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                if let Some(path) = &config_path {
                    println!("From {}", path.display());
                }
                config.print();
            }
            return Ok(());
        }
        Commands::Version => {
            println!(
                "rdf2tg {} (schema version {})",
                env!("CARGO_PKG_VERSION"),
                SCHEMA_VERSION
            );
            return Ok(());
        }
    };

    let summary = run_stages(config, &stages)?;
    report(&summary);
    Ok(())
}
