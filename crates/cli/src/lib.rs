use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use hyperball_protocol::{
    output_schema, serialize_json, EntryOutput, ErrorEnvelope, GetOutput, IngestOutput,
    QuantizeOutput, RejectedRecord, Response, SearchHitOutput, SearchOutput, StatsOutput,
    VerifyMismatch, VerifyOutput, OUTPUT_SCHEMA_VERSION,
};
use hyperball_vector_store::{
    BallTreeIndex, IndexConfig, IndexSnapshot, Metadata, Metric, QuantizedVector, SearchMode,
    SearchResult, VectorEncoding, VectorStoreError,
};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

mod records;

const CONFIG_LOAD_CONTEXT: &str = "Failed to load config";

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "hyperball")]
#[command(about = "Ball-tree nearest neighbor index over snapshot files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    #[command(flatten)]
    index: ConfigArgs,
}

/// Settings for a newly created index. An existing snapshot keeps the settings it
/// was built with.
#[derive(Args, Clone, Default)]
struct ConfigArgs {
    /// TOML file with `dimension`, `max_leaf_size` and `search_mode`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vector dimension (overrides config file and HYPERBALL_DIMENSION)
    #[arg(long, global = true)]
    dimension: Option<usize>,

    /// Leaf capacity before a split (overrides config file and HYPERBALL_MAX_LEAF_SIZE)
    #[arg(long, global = true)]
    max_leaf_size: Option<usize>,
}

impl ConfigArgs {
    /// Defaults, then the config file, then `HYPERBALL_*` variables, then flags.
    fn resolve(&self) -> Result<IndexConfig> {
        let base = match &self.config {
            Some(path) => IndexConfig::load(path)
                .with_context(|| format!("{CONFIG_LOAD_CONTEXT} {}", path.display()))?,
            None => IndexConfig::default(),
        };
        let mut config = base.with_env_overrides();
        if let Some(dimension) = self.dimension {
            config.dimension = dimension;
        }
        if let Some(max_leaf_size) = self.max_leaf_size {
            config.max_leaf_size = max_leaf_size;
        }
        config.validate()?;
        Ok(config)
    }

    fn warn_if_ignored(&self, config: &IndexConfig) {
        if self.dimension.is_some_and(|d| d != config.dimension) {
            log::warn!(
                "--dimension ignored: snapshot was built with dimension {}",
                config.dimension
            );
        }
        if self.max_leaf_size.is_some_and(|m| m != config.max_leaf_size) {
            log::warn!(
                "--max-leaf-size ignored: snapshot was built with max_leaf_size {}",
                config.max_leaf_size
            );
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Insert JSONL records into a snapshot, creating it if needed
    Ingest(IngestArgs),

    /// Find the nearest stored vectors to a query
    Search(SearchArgs),

    /// Fetch every entry stored under an id
    Get(GetArgs),

    /// Show index and tree statistics
    Stats(StatsArgs),

    /// Quantize a vector to i8 codes and report the reconstruction error
    Quantize(QuantizeArgs),

    /// Check that pruned search returns the brute-force ranking for every query
    Verify(VerifyArgs),

    /// Print the JSON Schema of a command's output
    Schema(SchemaArgs),
}

impl Commands {
    const fn json(&self) -> bool {
        match self {
            Commands::Ingest(args) => args.json,
            Commands::Search(args) => args.json,
            Commands::Get(args) => args.json,
            Commands::Stats(args) => args.json,
            Commands::Quantize(args) => args.json,
            Commands::Verify(args) => args.json,
            Commands::Schema(_) => true,
        }
    }
}

#[derive(Args)]
struct IngestArgs {
    /// JSONL file, one `{"id", "vector", "metadata"?}` object per line
    records: PathBuf,

    /// Snapshot file to create or extend
    #[arg(long)]
    snapshot: PathBuf,

    /// Store vectors as i8 codes (lossy)
    #[arg(long)]
    quantized: bool,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct VectorArgs {
    /// Vector as a JSON array, e.g. '[0.1, 0.2]'
    #[arg(long, conflicts_with = "vector_file", required_unless_present = "vector_file")]
    vector: Option<String>,

    /// File holding the vector as a JSON array
    #[arg(long)]
    vector_file: Option<PathBuf>,
}

impl VectorArgs {
    async fn read(&self) -> Result<Vec<f32>> {
        match (&self.vector, &self.vector_file) {
            (Some(raw), _) => records::parse_vector(raw),
            (None, Some(path)) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read vector file {}", path.display()))?;
                records::parse_vector(&raw)
            }
            (None, None) => anyhow::bail!("Missing --vector or --vector-file"),
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum MetricFlag {
    Euclidean,
    Poincare,
}

impl MetricFlag {
    const fn as_domain(self) -> Metric {
        match self {
            MetricFlag::Euclidean => Metric::Euclidean,
            MetricFlag::Poincare => Metric::Poincare,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum ModeFlag {
    BruteForce,
    Pruned,
}

impl ModeFlag {
    const fn as_domain(self) -> SearchMode {
        match self {
            ModeFlag::BruteForce => SearchMode::BruteForce,
            ModeFlag::Pruned => SearchMode::Pruned,
        }
    }
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    snapshot: PathBuf,

    #[command(flatten)]
    vector: VectorArgs,

    /// Number of results
    #[arg(short = 'k', long = "limit", default_value_t = 10)]
    k: usize,

    #[arg(long, value_enum, default_value_t = MetricFlag::Euclidean)]
    metric: MetricFlag,

    /// Search mode (defaults to the one stored in the snapshot)
    #[arg(long, value_enum)]
    mode: Option<ModeFlag>,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct GetArgs {
    #[arg(long)]
    snapshot: PathBuf,

    #[arg(long)]
    id: String,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatsArgs {
    #[arg(long)]
    snapshot: PathBuf,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct QuantizeArgs {
    #[command(flatten)]
    vector: VectorArgs,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long)]
    snapshot: PathBuf,

    /// JSONL file, one query per line (bare array or `{"vector": [...]}`)
    #[arg(long)]
    queries: PathBuf,

    #[arg(short = 'k', long = "limit", default_value_t = 10)]
    k: usize,

    #[arg(long, value_enum, default_value_t = MetricFlag::Euclidean)]
    metric: MetricFlag,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum SchemaTarget {
    Response,
    Ingest,
    Search,
    Get,
    Stats,
    Quantize,
    Verify,
}

#[derive(Args)]
struct SchemaArgs {
    #[arg(value_enum)]
    target: SchemaTarget,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // stdout is reserved for the JSON document
    let json_output = cli.command.json();
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let result = match cli.command {
        Commands::Ingest(args) => run_ingest(args, &cli.index).await,
        Commands::Search(args) => run_search(args).await,
        Commands::Get(args) => run_get(args).await,
        Commands::Stats(args) => run_stats(args).await,
        Commands::Quantize(args) => run_quantize(args).await,
        Commands::Verify(args) => run_verify(args).await,
        Commands::Schema(args) => run_schema(&args),
    };

    match result {
        Err(err) if json_output => {
            let response = Response::<()>::error(classify_error(&err));
            print_stdout(&serialize_json(&response)?)?;
            std::process::exit(1);
        }
        other => other,
    }
}

fn emit<T: Serialize>(json: bool, data: &T, render: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        print_stdout(&serialize_json(&Response::ok(data))?)
    } else {
        print_stdout(&render(data))
    }
}

async fn load_index(path: &Path) -> Result<(BallTreeIndex, VectorEncoding)> {
    let snapshot = IndexSnapshot::load(path)
        .await
        .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
    let encoding = snapshot.encoding;
    Ok((snapshot.into_index()?, encoding))
}

fn metadata_value(metadata: Metadata) -> serde_json::Value {
    serde_json::Value::Object(metadata.into_iter().collect())
}

async fn run_ingest(args: IngestArgs, overrides: &ConfigArgs) -> Result<()> {
    let existing = tokio::fs::try_exists(&args.snapshot)
        .await
        .with_context(|| format!("Failed to inspect {}", args.snapshot.display()))?;
    let (mut index, previous_encoding) = if existing {
        let (index, encoding) = load_index(&args.snapshot).await?;
        overrides.warn_if_ignored(index.config());
        (index, Some(encoding))
    } else {
        let config = overrides.resolve()?;
        log::info!(
            "Creating index (dimension={}, max_leaf_size={}, search_mode={})",
            config.dimension,
            config.max_leaf_size,
            config.search_mode.as_str()
        );
        (BallTreeIndex::new(config)?, None)
    };

    let raw = tokio::fs::read_to_string(&args.records)
        .await
        .with_context(|| format!("Failed to read records {}", args.records.display()))?;

    let mut inserted = 0;
    let mut rejected = Vec::new();
    for (line, text) in records::numbered_lines(&raw) {
        let outcome = records::parse_record(text)
            .and_then(|entry| index.insert_entry(entry).map_err(Into::into));
        match outcome {
            Ok(()) => inserted += 1,
            Err(err) => {
                log::warn!("Skipping record on line {line}: {err:#}");
                rejected.push(RejectedRecord {
                    line,
                    reason: format!("{err:#}"),
                });
            }
        }
    }

    let encoding = if args.quantized {
        VectorEncoding::QuantizedI8
    } else {
        previous_encoding.unwrap_or_default()
    };
    IndexSnapshot::capture(&index, encoding)
        .save(&args.snapshot)
        .await
        .with_context(|| format!("Failed to save snapshot {}", args.snapshot.display()))?;

    let output = IngestOutput {
        schema_version: OUTPUT_SCHEMA_VERSION,
        inserted,
        rejected,
        total_vectors: index.len(),
        snapshot: args.snapshot.display().to_string(),
        encoding: encoding.as_str().to_string(),
    };
    emit(args.json, &output, |out| {
        let mut text = format!(
            "Inserted {} records ({} rejected); {} vectors in {} [{}]",
            out.inserted,
            out.rejected.len(),
            out.total_vectors,
            out.snapshot,
            out.encoding
        );
        for record in &out.rejected {
            text.push_str(&format!("\n  line {}: {}", record.line, record.reason));
        }
        text
    })
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let query = args.vector.read().await?;
    let (index, _) = load_index(&args.snapshot).await?;
    let metric = args.metric.as_domain();
    let mode = args
        .mode
        .map_or(index.config().search_mode, ModeFlag::as_domain);

    let results = index.search_with_mode(&query, args.k, metric, mode)?;
    log::debug!("{} hits ({}, {})", results.len(), metric.as_str(), mode.as_str());

    let output = SearchOutput {
        schema_version: OUTPUT_SCHEMA_VERSION,
        metric: metric.as_str().to_string(),
        mode: mode.as_str().to_string(),
        k: args.k,
        hits: results
            .into_iter()
            .enumerate()
            .map(|(idx, result)| SearchHitOutput {
                rank: idx + 1,
                id: result.entry.id,
                distance: result.distance,
                score: result.score,
                metadata: result.entry.metadata.map(metadata_value),
            })
            .collect(),
    };
    emit(args.json, &output, |out| {
        if out.hits.is_empty() {
            return "No results".to_string();
        }
        out.hits
            .iter()
            .map(|hit| {
                format!(
                    "{}. {} (distance: {:.6}, score: {:.4})",
                    hit.rank, hit.id, hit.distance, hit.score
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

async fn run_get(args: GetArgs) -> Result<()> {
    let (index, _) = load_index(&args.snapshot).await?;
    let entries: Vec<EntryOutput> = index
        .get_all(&args.id)
        .map(|entry| EntryOutput {
            id: entry.id.clone(),
            vector: entry.vector.clone(),
            metadata: entry.metadata.clone().map(metadata_value),
        })
        .collect();
    if entries.is_empty() {
        anyhow::bail!("No entry with id '{}'", args.id);
    }

    let output = GetOutput {
        schema_version: OUTPUT_SCHEMA_VERSION,
        id: args.id,
        entries,
    };
    emit(args.json, &output, |out| {
        out.entries
            .iter()
            .map(|entry| {
                let vector = serde_json::to_string(&entry.vector).unwrap_or_default();
                match &entry.metadata {
                    Some(metadata) => format!("{} {vector} {metadata}", entry.id),
                    None => format!("{} {vector}", entry.id),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

async fn run_stats(args: StatsArgs) -> Result<()> {
    let (index, _) = load_index(&args.snapshot).await?;
    let stats = index.stats();
    let output = StatsOutput {
        schema_version: OUTPUT_SCHEMA_VERSION,
        dimension: stats.dimension,
        total_nodes: stats.total_nodes,
        total_vectors: stats.total_vectors,
        max_leaf_size: stats.max_leaf_size,
        root_radius: stats.root_radius,
        root_child_count: stats.root_child_count,
        leaf_count: stats.leaf_count,
        depth: stats.depth,
        largest_leaf: stats.largest_leaf,
        degenerate_leaves: stats.degenerate_leaves,
        search_mode: index.config().search_mode.as_str().to_string(),
    };
    emit(args.json, &output, |out| {
        [
            format!("dimension: {}", out.dimension),
            format!("total_vectors: {}", out.total_vectors),
            format!("total_nodes: {}", out.total_nodes),
            format!("max_leaf_size: {}", out.max_leaf_size),
            format!("root_radius: {:.6}", out.root_radius),
            format!("root_child_count: {}", out.root_child_count),
            format!("leaf_count: {}", out.leaf_count),
            format!("depth: {}", out.depth),
            format!("largest_leaf: {}", out.largest_leaf),
            format!("degenerate_leaves: {}", out.degenerate_leaves),
            format!("search_mode: {}", out.search_mode),
        ]
        .join("\n")
    })
}

async fn run_quantize(args: QuantizeArgs) -> Result<()> {
    let vector = args.vector.read().await?;
    let quantized = QuantizedVector::encode(&vector);
    let output = QuantizeOutput {
        schema_version: OUTPUT_SCHEMA_VERSION,
        codes: quantized.codes().to_vec(),
        restored: quantized.dequantize(),
        error: quantized.error_against(&vector),
    };
    emit(args.json, &output, |out| {
        format!(
            "codes: {}\nrestored: {}\nerror: {:.6}",
            serde_json::to_string(&out.codes).unwrap_or_default(),
            serde_json::to_string(&out.restored).unwrap_or_default(),
            out.error
        )
    })
}

fn same_ranking(left: &[SearchResult], right: &[SearchResult]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).all(|(a, b)| {
            a.entry.id == b.entry.id && a.distance.to_bits() == b.distance.to_bits()
        })
}

fn ranked_ids(results: &[SearchResult]) -> Vec<String> {
    results.iter().map(|r| r.entry.id.clone()).collect()
}

async fn run_verify(args: VerifyArgs) -> Result<()> {
    let (index, _) = load_index(&args.snapshot).await?;
    let raw = tokio::fs::read_to_string(&args.queries)
        .await
        .with_context(|| format!("Failed to read queries {}", args.queries.display()))?;
    let metric = args.metric.as_domain();

    let mut queries = 0;
    let mut mismatches = Vec::new();
    for (line, text) in records::numbered_lines(&raw) {
        let query = records::parse_query(text).with_context(|| format!("Query on line {line}"))?;
        let brute = index
            .search_with_mode(&query, args.k, metric, SearchMode::BruteForce)
            .with_context(|| format!("Query on line {line}"))?;
        let pruned = index
            .search_with_mode(&query, args.k, metric, SearchMode::Pruned)
            .with_context(|| format!("Query on line {line}"))?;
        queries += 1;
        if !same_ranking(&brute, &pruned) {
            log::warn!("Query on line {line} ranks differently under pruned search");
            mismatches.push(VerifyMismatch {
                query_line: line,
                brute_force: ranked_ids(&brute),
                pruned: ranked_ids(&pruned),
            });
        }
    }

    let output = VerifyOutput {
        schema_version: OUTPUT_SCHEMA_VERSION,
        queries,
        k: args.k,
        mismatches,
    };
    let render = |out: &VerifyOutput| {
        let mut text = format!(
            "{} queries, k={}: {} mismatches",
            out.queries,
            out.k,
            out.mismatches.len()
        );
        for mismatch in &out.mismatches {
            text.push_str(&format!(
                "\n  line {}: brute_force={:?} pruned={:?}",
                mismatch.query_line, mismatch.brute_force, mismatch.pruned
            ));
        }
        text
    };
    if output.passed() {
        return emit(args.json, &output, render);
    }

    let message = format!(
        "{} of {} queries ranked differently under pruned search",
        output.mismatches.len(),
        output.queries
    );
    if args.json {
        let response = Response::<()>::error(ErrorEnvelope {
            code: "verify_mismatch".to_string(),
            message,
            details: Some(serde_json::to_value(&output)?),
            hint: None,
        });
        print_stdout(&serialize_json(&response)?)?;
        std::process::exit(1);
    }
    print_stdout(&render(&output))?;
    anyhow::bail!(message)
}

fn run_schema(args: &SchemaArgs) -> Result<()> {
    let schema = match args.target {
        SchemaTarget::Response => output_schema::<Response>()?,
        SchemaTarget::Ingest => output_schema::<IngestOutput>()?,
        SchemaTarget::Search => output_schema::<SearchOutput>()?,
        SchemaTarget::Get => output_schema::<GetOutput>()?,
        SchemaTarget::Stats => output_schema::<StatsOutput>()?,
        SchemaTarget::Quantize => output_schema::<QuantizeOutput>()?,
        SchemaTarget::Verify => output_schema::<VerifyOutput>()?,
    };
    print_stdout(&serialize_json(&schema)?)
}

fn classify_error(err: &anyhow::Error) -> ErrorEnvelope {
    let message = format!("{err:#}");
    let store_error = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<VectorStoreError>());

    let (code, hint) = match store_error {
        Some(VectorStoreError::InvalidDimension { expected, .. }) => (
            "invalid_dimension",
            Some(format!("Vectors for this index must have {expected} components.")),
        ),
        Some(VectorStoreError::NonFiniteComponent { .. }) => ("invalid_vector", None),
        Some(VectorStoreError::InvalidConfig(_) | VectorStoreError::ConfigParse(_)) => (
            "config_error",
            Some(
                "Check --config, --dimension, --max-leaf-size and HYPERBALL_* variables."
                    .to_string(),
            ),
        ),
        Some(
            VectorStoreError::UnsupportedSchema { .. }
            | VectorStoreError::CorruptSnapshot(_)
            | VectorStoreError::SerializationError(_),
        ) => (
            "snapshot_corrupt",
            Some("Rebuild the snapshot with `hyperball ingest`.".to_string()),
        ),
        Some(VectorStoreError::IoError(io_err))
            if io_err.kind() == io::ErrorKind::NotFound
                && message.starts_with(CONFIG_LOAD_CONTEXT) =>
        {
            (
                "config_missing",
                Some("Check the path passed to --config.".to_string()),
            )
        }
        Some(VectorStoreError::IoError(io_err)) if io_err.kind() == io::ErrorKind::NotFound => (
            "snapshot_missing",
            Some("Create the snapshot first with `hyperball ingest`.".to_string()),
        ),
        Some(VectorStoreError::IoError(_)) => ("io_error", None),
        None if message.starts_with("No entry with id") => ("not_found", None),
        None if err
            .chain()
            .any(|cause| cause.downcast_ref::<serde_json::Error>().is_some()) =>
        {
            ("invalid_request", None)
        }
        None if err.chain().any(|cause| {
            cause
                .downcast_ref::<io::Error>()
                .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
        }) =>
        {
            ("file_missing", None)
        }
        None => ("internal", None),
    };

    ErrorEnvelope {
        code: code.to_string(),
        message,
        details: None,
        hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn dimension_errors_are_classified_through_context() {
        let err = anyhow::Error::new(VectorStoreError::InvalidDimension {
            expected: 3,
            actual: 2,
        })
        .context("Query on line 4");
        let envelope = classify_error(&err);
        assert_eq!(envelope.code, "invalid_dimension");
        assert!(envelope.message.contains("line 4"));
        assert!(envelope.hint.unwrap().contains('3'));
    }

    #[test]
    fn missing_snapshot_is_reported_as_such() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = anyhow::Error::new(VectorStoreError::from(io_err)).context("Failed to load");
        assert_eq!(classify_error(&err).code, "snapshot_missing");
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.toml");
        std::fs::write(&path, "dimension = 8\nmax_leaf_size = 5\n").unwrap();

        let args = ConfigArgs {
            config: Some(path),
            dimension: None,
            max_leaf_size: Some(3),
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.max_leaf_size, 3);
        // HYPERBALL_DIMENSION may be set by the environment running the tests.
        if std::env::var(hyperball_vector_store::ENV_DIMENSION).is_err() {
            assert_eq!(config.dimension, 8);
        }
    }

    #[test]
    fn missing_config_file_is_not_a_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            config: Some(dir.path().join("absent.toml")),
            dimension: None,
            max_leaf_size: None,
        };
        let envelope = classify_error(&args.resolve().unwrap_err());
        assert_eq!(envelope.code, "config_missing");
        assert!(envelope.hint.unwrap().contains("--config"));
    }

    #[test]
    fn invalid_flag_values_fail_validation() {
        let args = ConfigArgs {
            config: None,
            dimension: Some(4),
            max_leaf_size: Some(1),
        };
        let err = args.resolve().unwrap_err();
        assert_eq!(classify_error(&err).code, "config_error");
    }
}
