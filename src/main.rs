use anyhow::{bail, Context, Result};
use arrow::util::pretty::pretty_format_batches;
use batchload::{
    batch_counts,
    config::JobConfig,
    stage_raw_files, BatchLoader, ParquetStore, StageOptions, TableProvisioner, TableStore,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Provision warehouse tables and load batch directories into them"
)]
struct Cli {
    /// YAML job file; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or replace an empty table.
    Provision {
        #[command(flatten)]
        job: JobConfig,
        /// Print the rendered DDL.
        #[arg(long)]
        print_ddl: bool,
    },
    /// Full-replace a table from `<root>/sf=<scale>/Batch*/<pattern>`.
    Load {
        #[command(flatten)]
        job: JobConfig,
    },
    /// Provision, then load.
    Run {
        #[command(flatten)]
        job: JobConfig,
    },
    /// Copy a generated `sf=<scale>` tree under the root directory.
    Stage {
        #[command(flatten)]
        job: JobConfig,
        /// Directory holding the generated `Batch*` directories.
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        overwrite: bool,
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Show DDL, row count and rows per batch.
    Inspect {
        #[command(flatten)]
        job: JobConfig,
        /// Also print the first N rows.
        #[arg(long, default_value_t = 0)]
        rows: usize,
    },
}

fn resolve(config: Option<&PathBuf>, flags: JobConfig) -> Result<JobConfig> {
    match config {
        Some(path) => Ok(JobConfig::from_yaml_file(path)
            .with_context(|| format!("loading job file {}", path.display()))?
            .overlay(flags)),
        None => Ok(flags),
    }
}

fn provision(job: &JobConfig, store: &ParquetStore, print_ddl: bool) -> Result<()> {
    let p = job.provision_params()?;
    let def = TableProvisioner::new(store)
        .provision(&p.ident, &p.column_schema, &p.constraints, &p.table_properties)
        .with_context(|| format!("provisioning {}", p.ident))?;
    if print_ddl {
        println!("{}", def.to_ddl());
    }
    Ok(())
}

fn load(job: &JobConfig, store: &ParquetStore) -> Result<()> {
    let p = job.load_params()?;
    let report = BatchLoader::new(store, job.extractor()?)
        .load_batches(
            &p.ident,
            &p.root_directory,
            p.scale_factor,
            &p.filename_pattern,
            &p.column_schema,
        )
        .with_context(|| format!("loading {}", p.ident))?;
    for (batch, rows) in report.rows_per_batch() {
        info!(batch, rows, "loaded");
    }
    println!(
        "{}: {} rows from {} files",
        report.table,
        report.rows,
        report.files.len()
    );
    Ok(())
}

fn inspect(job: &JobConfig, store: &ParquetStore, rows: usize) -> Result<()> {
    let ident = job.ident()?;
    let Some(def) = store.definition(&ident)? else {
        bail!("table {} does not exist", ident);
    };
    println!("{}\n", def.to_ddl());

    let batches = store.scan(&ident)?;
    let total: usize = batches.iter().map(|b| b.num_rows()).sum();
    println!("rows: {}", total);
    for (batch, n) in batch_counts(&batches) {
        println!("  batch {:>3}: {}", batch, n);
    }

    if rows > 0 && total > 0 {
        let mut head = Vec::new();
        let mut left = rows;
        for b in &batches {
            if left == 0 {
                break;
            }
            let take = left.min(b.num_rows());
            head.push(b.slice(0, take));
            left -= take;
        }
        println!("{}", pretty_format_batches(&head)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_ref();

    match cli.command {
        Command::Provision { job, print_ddl } => {
            let job = resolve(config, job)?;
            provision(&job, &ParquetStore::new(job.warehouse()), print_ddl)
        }
        Command::Load { job } => {
            let job = resolve(config, job)?;
            load(&job, &ParquetStore::new(job.warehouse()))
        }
        Command::Run { job } => {
            let job = resolve(config, job)?;
            let store = ParquetStore::new(job.warehouse());
            provision(&job, &store, false)?;
            load(&job, &store)
        }
        Command::Stage {
            job,
            source,
            overwrite,
            threads,
        } => {
            let job = resolve(config, job)?;
            let p = job.stage_params()?;
            let opts = StageOptions { overwrite, threads };
            let report = stage_raw_files(&source, &p.root_directory, p.scale_factor, &opts)
                .context("staging raw files")?;
            if report.skipped {
                println!("{} already populated; skipped", report.target.display());
            } else {
                println!(
                    "staged {}/{} files into {}",
                    report.copied,
                    report.total,
                    report.target.display()
                );
            }
            if report.failed > 0 {
                bail!("{} file(s) failed to copy", report.failed);
            }
            Ok(())
        }
        Command::Inspect { job, rows } => {
            let job = resolve(config, job)?;
            inspect(&job, &ParquetStore::new(job.warehouse()), rows)
        }
    }
}
