use std::{io::Write, path::PathBuf, time::Instant};

use clap::Parser;
use eyre::{bail, Result, WrapErr};
use human_repr::HumanDuration;
use tiled_qr::{
    io::{write_matrix, write_r, MatrixSource},
    linalg::qr::tiled::{TiledQr, TiledQrParams},
    sched::Observer,
    trace::TraceRecorder,
    Parallelism,
};
use tracing_subscriber::filter::LevelFilter;

/// Tiled QR factorization of a dense matrix.
///
/// Examples:
///   tiled-qr matrix.mtx 64
///   tiled-qr 1024 128 42 10
#[derive(Parser)]
#[command(name = "tiled-qr")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Matrix Market file, or the size of the generated square matrix when SEED and MIN_MAX are
    /// given
    #[arg(value_name = "MATRIX")]
    matrix: String,

    /// Tile size
    #[arg(value_name = "BLOCK_SIZE")]
    block_size: usize,

    /// Seed of the generated matrix
    #[arg(value_name = "SEED", requires = "min_max")]
    seed: Option<u64>,

    /// Generated entries lie in [-MIN_MAX, MIN_MAX)
    #[arg(value_name = "MIN_MAX", requires = "seed")]
    min_max: Option<i64>,

    /// Number of workers, 0 for one per hardware thread
    #[arg(short, long, default_value = "0")]
    workers: usize,

    /// Write tasks.csv, dag.csv and counters.csv to this directory
    #[arg(long, value_name = "DIR")]
    trace: Option<PathBuf>,

    /// Print the input matrix and the R factor
    #[arg(long)]
    print: bool,

    /// Report the relative residual |A - QR| / |A|
    #[arg(long)]
    check: bool,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn source(&self) -> Result<MatrixSource> {
        Ok(match (self.seed, self.min_max) {
            (Some(seed), Some(min_max)) => MatrixSource::Random {
                size: self
                    .matrix
                    .parse()
                    .wrap_err_with(|| format!("invalid matrix size `{}`", self.matrix))?,
                seed,
                min_max,
            },
            _ => MatrixSource::File(PathBuf::from(&self.matrix)),
        })
    }

    fn parallelism(&self) -> Parallelism {
        match self.workers {
            1 => Parallelism::None,
            n => Parallelism::Rayon(n),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = cli.source()?;
    let a = source.load()?;
    let (m, n) = (a.nrows(), a.ncols());
    let b = cli.block_size;
    if b == 0 || b > Ord::min(m, n) {
        bail!("block size must be between 1 and {}, got {b}", Ord::min(m, n));
    }
    log::info!("factorizing {m}x{n} matrix from {source} with tiles of size {b}");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if cli.print {
        write_matrix(&mut out, a.as_ref(), "A")?;
    }

    let recorder = cli.trace.as_ref().map(|_| TraceRecorder::new());
    let mut params = TiledQrParams::default();
    params.observer = recorder.as_ref().map(|r| r as &dyn Observer);

    let parallelism = cli.parallelism();
    let qr = TiledQr::with_params(a.as_ref(), b, parallelism, params)?;

    if cli.print {
        write_r(&mut out, qr.factors(), "R")?;
    }
    if let (Some(dir), Some(recorder)) = (&cli.trace, &recorder) {
        recorder
            .trace()
            .write_csv(dir)
            .wrap_err("failed to write the execution trace")?;
    }
    if cli.check {
        writeln!(out, "relative residual: {:e}", qr.backward_error(a.as_ref()))?;
    }

    let info = qr.info();
    writeln!(out, "total time: {}", start.elapsed().human_duration())?;
    writeln!(out, "compute time: {}", info.compute_time.human_duration())?;
    writeln!(out, "workers: {}", info.workers)?;
    writeln!(out, "number of tasks: {}", info.task_count)?;
    Ok(())
}
