//! CLI interface for the IVF-Flat index

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ivf_flat::persistence;
use ivf_flat::{
    DistanceMetric, IndexParams, IvfFlatIndex, Resources, ResourcesConfig, SearchParams,
    SENTINEL_ID,
};
use ndarray::Array2;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ivf-flat")]
#[command(about = "Build and query IVF-Flat approximate nearest neighbor indexes", long_about = None)]
struct Cli {
    /// Worker threads (0 = one per core)
    #[arg(long, global = true, default_value = "0")]
    threads: usize,

    /// Rows assigned per internal chunk when inserting
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an index on a vector file and write it to disk
    Build {
        /// Vector file: one comma-separated vector per line
        #[arg(short, long)]
        data: PathBuf,
        /// Output index file
        #[arg(short, long)]
        output: PathBuf,
        /// JSON file with index parameters; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        n_lists: Option<usize>,
        /// One of sqeuclidean, euclidean, inner_product, cosine
        #[arg(long)]
        metric: Option<DistanceMetric>,
        #[arg(long)]
        trainset_fraction: Option<f64>,
        #[arg(long)]
        n_iters: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Train centroids only, leaving every list empty
        #[arg(long)]
        no_add_data: bool,
    },
    /// Append vectors to an existing index
    Extend {
        /// Index file, rewritten in place unless --output is given
        #[arg(short, long)]
        index: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Id of the first new vector; defaults to the current index size
        #[arg(long)]
        first_id: Option<u64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Search an index with a file of query vectors
    Search {
        #[arg(short, long)]
        index: PathBuf,
        /// Query file: one comma-separated vector per line
        #[arg(short, long)]
        queries: PathBuf,
        /// Number of neighbors per query
        #[arg(short, default_value = "10")]
        k: usize,
        #[arg(long)]
        n_probes: Option<usize>,
        /// JSON file with search parameters
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a summary of an index
    Describe {
        #[arg(short, long)]
        index: PathBuf,
    },
}

/// Parse one comma-separated vector per non-empty line. Lines starting with
/// `#` are skipped.
fn read_vectors(path: &Path) -> Result<Array2<f32>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let mut dim = None;
    let mut rows = 0;
    let mut data = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let before = data.len();
        for field in line.split(',') {
            let value: f32 = field.trim().parse().with_context(|| {
                format!("{}:{}: invalid float {:?}", path.display(), lineno + 1, field)
            })?;
            data.push(value);
        }
        let width = data.len() - before;
        match dim {
            None => dim = Some(width),
            Some(d) if d != width => bail!(
                "{}:{}: expected {} components, got {}",
                path.display(),
                lineno + 1,
                d,
                width
            ),
            Some(_) => {}
        }
        rows += 1;
    }

    Ok(Array2::from_shape_vec((rows, dim.unwrap_or(0)), data)?)
}

fn run_build(
    resources: &Resources,
    data: &Path,
    output: &Path,
    params: IndexParams,
) -> Result<()> {
    let dataset = read_vectors(data)?;
    let index = IvfFlatIndex::build(resources, &params, dataset.view())?;
    persistence::save_file(&index, output)?;
    println!(
        "Built index with {} vectors in {} lists ({}) -> {}",
        index.len(),
        index.n_lists(),
        index.metric(),
        output.display()
    );
    Ok(())
}

fn run_extend(
    resources: &Resources,
    index_path: &Path,
    data: &Path,
    first_id: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let mut index = persistence::load_file(index_path)?;
    let vectors = read_vectors(data)?;
    let ids = first_id
        .map(|start| sequential_ids(start, vectors.nrows()))
        .transpose()?;

    index.extend(resources, vectors.view(), ids.as_deref())?;
    let output = output.unwrap_or(index_path);
    persistence::save_file(&index, output)?;
    println!(
        "Added {} vectors; index now holds {}",
        vectors.nrows(),
        index.len()
    );
    Ok(())
}

/// `count` consecutive ids starting at `start`.
fn sequential_ids(start: u64, count: usize) -> Result<Vec<u64>> {
    let Some(end) = start.checked_add(count as u64) else {
        bail!(
            "first id {} leaves no room for {} new vectors",
            start,
            count
        );
    };
    Ok((start..end).collect())
}

fn run_search(
    resources: &Resources,
    index_path: &Path,
    queries: &Path,
    k: usize,
    params: &SearchParams,
    json: bool,
) -> Result<()> {
    let index = persistence::load_file(index_path)?;
    let queries = read_vectors(queries)?;
    let results = index.search(resources, params, queries.view(), k)?;

    if json {
        let rows: Vec<serde_json::Value> = (0..results.n_queries())
            .map(|i| {
                let (distances, ids) = results.row(i);
                let neighbors: Vec<serde_json::Value> = ids
                    .iter()
                    .zip(distances.iter())
                    .filter(|(&id, _)| id != SENTINEL_ID)
                    .map(|(id, d)| serde_json::json!({"id": id, "distance": d}))
                    .collect();
                serde_json::json!({"query": i, "neighbors": neighbors})
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for i in 0..results.n_queries() {
        let (distances, ids) = results.row(i);
        println!("Query {}:", i);
        let found: Vec<_> = ids
            .iter()
            .zip(distances.iter())
            .filter(|(&id, _)| id != SENTINEL_ID)
            .collect();
        if found.is_empty() {
            println!("  No results found");
        }
        for (rank, (id, distance)) in found.into_iter().enumerate() {
            println!("  {}. {} (distance: {:.4})", rank + 1, id, distance);
        }
    }
    Ok(())
}

fn run_describe(index_path: &Path) -> Result<()> {
    let index = persistence::load_file(index_path)?;
    println!("{}", index.describe());

    let sizes = index.list_sizes();
    let min = sizes.iter().min().copied().unwrap_or(0);
    let max = sizes.iter().max().copied().unwrap_or(0);
    let empty = sizes.iter().filter(|&&s| s == 0).count();
    println!(
        "List sizes: min={}, max={}, mean={:.1}, empty={}",
        min,
        max,
        index.len() as f64 / sizes.len().max(1) as f64,
        empty
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ResourcesConfig::default().with_num_threads(cli.threads);
    if let Some(batch_size) = cli.batch_size {
        config = config.with_insert_batch_size(batch_size);
    }
    let resources = Resources::with_config(&config)?;

    match cli.command {
        Commands::Build {
            data,
            output,
            config,
            n_lists,
            metric,
            trainset_fraction,
            n_iters,
            seed,
            no_add_data,
        } => {
            let mut params = match config {
                Some(path) => IndexParams::from_json_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => IndexParams::default(),
            };
            if let Some(n) = n_lists {
                params = params.with_n_lists(n);
            }
            if let Some(m) = metric {
                params = params.with_metric(m);
            }
            if let Some(f) = trainset_fraction {
                params = params.with_trainset_fraction(f);
            }
            if let Some(n) = n_iters {
                params = params.with_n_iters(n);
            }
            if let Some(s) = seed {
                params = params.with_seed(s);
            }
            if no_add_data {
                params = params.with_add_data_on_build(false);
            }
            run_build(&resources, &data, &output, params)
        }
        Commands::Extend {
            index,
            data,
            first_id,
            output,
        } => run_extend(&resources, &index, &data, first_id, output.as_deref()),
        Commands::Search {
            index,
            queries,
            k,
            n_probes,
            config,
            json,
        } => {
            let mut params = match config {
                Some(path) => SearchParams::from_json_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SearchParams::default(),
            };
            if let Some(n) = n_probes {
                params.n_probes = n;
            }
            run_search(&resources, &index, &queries, k, &params, json)
        }
        Commands::Describe { index } => run_describe(&index),
    }
}
