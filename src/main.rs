use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use basic_cleaning::app::upload_use_case::UploadUseCase;
use basic_cleaning::app::ports::{ArtifactStorePort, ProvenanceSinkPort};
use basic_cleaning::constants::{DEFAULT_DATA_ROOT, DEFAULT_LOG_DIR};
use basic_cleaning::gateway::provenance_log::NdjsonProvenanceLog;
use basic_cleaning::infra::fs_artifact_store::{ensure_root, FsArtifactStore};
use basic_cleaning::observability;
use basic_cleaning::{ArtifactReference, StepDriver, StepError, StepOptions};

#[derive(Parser)]
#[command(name = "basic-cleaning")]
#[command(about = "A very basic data cleaning step over versioned artifacts")]
#[command(version = "0.1.0")]
struct Cli {
    /// Root directory of the artifact store
    #[arg(long, global = true, env = "BASIC_CLEANING_DATA_ROOT", default_value = DEFAULT_DATA_ROOT)]
    data_root: PathBuf,

    /// Directory for rotated JSON logs
    #[arg(long, global = true, env = "BASIC_CLEANING_LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the input artifact, clean it, publish the result with provenance
    Run(RunArgs),
    /// Publish a local CSV file as a new artifact version
    Upload {
        /// CSV file to publish
        #[arg(long)]
        file: PathBuf,
        /// Artifact name
        #[arg(long)]
        name: String,
        /// Artifact type tag
        #[arg(long = "type")]
        type_tag: String,
        /// Artifact description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List the versions of an artifact
    Versions {
        /// Artifact name
        name: String,
    },
    /// Show provenance records that read or wrote an exact artifact version
    Lineage {
        /// Exact reference, e.g. clean_sample.csv:v0
        reference: String,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML file with a [cleaning] table
    #[arg(long, env = "BASIC_CLEANING_CONFIG")]
    config: Option<PathBuf>,
    /// Input artifact name
    #[arg(long = "input_artifact", alias = "input-artifact")]
    input_artifact: Option<String>,
    /// Output artifact name
    #[arg(long = "output_artifact", alias = "output-artifact")]
    output_artifact: Option<String>,
    /// Output artifact type
    #[arg(long = "output_type", alias = "output-type")]
    output_type: Option<String>,
    /// Description for the output artifact
    #[arg(long = "output_description", alias = "output-description")]
    output_description: Option<String>,
    /// Lower price bound
    #[arg(long = "min_price", alias = "min-price", allow_negative_numbers = true)]
    min_price: Option<f64>,
    /// Upper price bound
    #[arg(long = "max_price", alias = "max-price", allow_negative_numbers = true)]
    max_price: Option<f64>,
}

impl RunArgs {
    fn options(&self) -> basic_cleaning::Result<StepOptions> {
        self.options_with(StepOptions::from_env()?)
    }

    /// File, then environment, then flags; later sources win.
    fn options_with(&self, from_env: StepOptions) -> basic_cleaning::Result<StepOptions> {
        let from_file = match &self.config {
            Some(path) => StepOptions::from_toml_file(path)?,
            None => StepOptions::default(),
        };
        let from_flags = StepOptions {
            input_artifact: self.input_artifact.clone(),
            output_artifact: self.output_artifact.clone(),
            output_type: self.output_type.clone(),
            output_description: self.output_description.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
        };
        Ok(from_file.merge(from_env).merge(from_flags))
    }
}

fn open_store(data_root: &Path) -> anyhow::Result<(Arc<FsArtifactStore>, Arc<NdjsonProvenanceLog>)> {
    ensure_root(data_root)?;
    let store = Arc::new(FsArtifactStore::new(data_root));
    let provenance = Arc::new(NdjsonProvenanceLog::at_root(data_root));
    Ok((store, provenance))
}

fn run_step(data_root: &Path, args: &RunArgs) -> anyhow::Result<()> {
    println!("🧹 Running basic cleaning step...");
    let options = args.options()?;
    let (store, provenance) = open_store(data_root)?;

    let mut driver = StepDriver::new(store, provenance);
    let record = driver.run_with_options(&options)?;

    println!("✅ Published {} from {}", record.output_reference, record.input_reference);
    println!("   Rows read: {}", record.report.rows_in);
    println!("   Rows kept: {}", record.report.rows_kept);
    println!("   Rows dropped: {}", record.report.rows_dropped());
    println!("   Unknown dates: {}", record.report.unknown_dates);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn upload(data_root: &Path, file: &Path, name: &str, type_tag: &str, description: &str) -> anyhow::Result<()> {
    let (store, _) = open_store(data_root)?;
    let manifest = UploadUseCase::new(store)
        .upload_file(file, name, type_tag, description)
        .with_context(|| format!("uploading {}", file.display()))?;
    println!("📦 Uploaded {} ({} rows, sha256 {})", manifest.reference, manifest.row_count, manifest.sha256);
    Ok(())
}

fn list_versions(data_root: &Path, name: &str) -> anyhow::Result<()> {
    let store = FsArtifactStore::new(data_root);
    let versions = store.versions(name)?;
    if versions.is_empty() {
        println!("No versions of '{}'", name);
        return Ok(());
    }
    for m in versions {
        println!(
            "{}\t{}\t{} rows\t{}\t{}",
            m.reference,
            m.type_tag,
            m.row_count,
            &m.sha256[..m.sha256.len().min(12)],
            m.created_at.to_rfc3339()
        );
    }
    Ok(())
}

fn lineage(data_root: &Path, reference: &str) -> anyhow::Result<()> {
    let reference: ArtifactReference = reference.parse()?;
    if reference.exact_version().is_none() {
        anyhow::bail!("lineage needs an exact version such as name:v0, got {}", reference);
    }
    let log = NdjsonProvenanceLog::at_root(data_root);
    let records = log.records_for(&reference)?;
    if records.is_empty() {
        println!("No provenance recorded for {}", reference);
    }
    for r in records {
        println!("{}", serde_json::to_string(&r)?);
    }
    Ok(())
}

fn exit_status(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<StepError>().map_or(1, StepError::exit_code)
}

fn main() -> ExitCode {
    // Best-effort .env load; absence is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = observability::init_logging(&cli.log_dir);

    let result = match &cli.command {
        Commands::Run(args) => run_step(&cli.data_root, args),
        Commands::Upload { file, name, type_tag, description } => {
            upload(&cli.data_root, file, name, type_tag, description)
        }
        Commands::Versions { name } => list_versions(&cli.data_root, name),
        Commands::Lineage { reference } => lineage(&cli.data_root, reference),
    };

    match result {
        Ok(()) => {
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            println!("❌ {:#}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn flags_beat_env_and_env_beats_file() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("cleaning.toml");
        fs::write(
            &config,
            r#"
            [cleaning]
            input_artifact = "sample.csv:v0"
            output_artifact = "from_file.csv"
            output_type = "clean_sample"
            output_description = "from file"
            min_price = 1
            max_price = 100
            "#,
        )
        .unwrap();

        let vars: HashMap<&str, &str> = [
            ("BASIC_CLEANING_OUTPUT_ARTIFACT", "from_env.csv"),
            ("BASIC_CLEANING_MIN_PRICE", "5"),
            ("BASIC_CLEANING_MAX_PRICE", "200"),
        ]
        .into_iter()
        .collect();
        let from_env = StepOptions::from_env_with(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        let args = RunArgs {
            config: Some(config),
            max_price: Some(350.0),
            ..Default::default()
        };
        let options = args.options_with(from_env).unwrap();

        assert_eq!(options.input_artifact.as_deref(), Some("sample.csv:v0"));
        assert_eq!(options.output_description.as_deref(), Some("from file"));
        assert_eq!(options.output_artifact.as_deref(), Some("from_env.csv"));
        assert_eq!(options.min_price, Some(5.0));
        assert_eq!(options.max_price, Some(350.0));
    }

    #[test]
    fn unreadable_config_file_is_a_configuration_error() {
        let args = RunArgs {
            config: Some(PathBuf::from("/nonexistent/cleaning.toml")),
            ..Default::default()
        };
        let err = args.options_with(StepOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn exit_status_follows_the_step_error() {
        let orphaned = anyhow::Error::new(StepError::ProvenanceWrite {
            output: "clean_sample.csv:v0".parse().unwrap(),
            source: Box::new(StepError::Store("disk full".into())),
        });
        assert_eq!(exit_status(&orphaned), 3);
        assert_eq!(exit_status(&anyhow::Error::new(StepError::Configuration("min > max".into()))), 2);
        assert_eq!(exit_status(&anyhow::Error::new(StepError::Store("down".into()))), 1);
        assert_eq!(exit_status(&anyhow::anyhow!("lineage needs an exact version")), 1);
    }
}
