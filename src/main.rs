use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use d3survey::io::{load_site, save_site};
use d3survey::optimizer::{OptimizerConfig, SolverMethod};
use d3survey::system::{OptimizerHandle, shared_site};

const USAGE: &str = "usage: d3survey <site.json> [out.json] [--nelder-mead] [--max-iterations N] [--suggest]";

struct Args {
    input: PathBuf,
    output: Option<PathBuf>,
    config: OptimizerConfig,
    suggest: bool,
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut output = None;
    let mut config = OptimizerConfig::default();
    let mut suggest = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--nelder-mead" => config.method = SolverMethod::NelderMead,
            "--max-iterations" => {
                let value = args.next().context("--max-iterations needs a value")?;
                config.max_iterations = value
                    .parse()
                    .with_context(|| format!("Invalid iteration count '{}'", value))?;
            }
            "--suggest" => suggest = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("Unknown option {}\n{}", flag, USAGE),
            path if input.is_none() => input = Some(PathBuf::from(path)),
            path if output.is_none() => output = Some(PathBuf::from(path)),
            extra => bail!("Unexpected argument {}\n{}", extra, USAGE),
        }
    }

    Ok(Args {
        input: input.context(USAGE)?,
        output,
        config,
        suggest,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let site = load_site(&args.input)?;
    println!(
        "Site '{}': {} points, {} lines, {} rangefinders, {} tripods, {} cameras",
        site.name,
        site.points().len(),
        site.lines().len(),
        site.rangefinders().len(),
        site.tripods().len(),
        site.cameras().len()
    );

    let shared = shared_site(site);
    let handle = OptimizerHandle::new(shared.clone(), args.config);
    handle.start().context("Cannot optimize site")?;

    // Report the live objective while the worker syncs into it.
    while handle.is_running() {
        thread::sleep(Duration::from_secs(1));
        if handle.is_running() {
            info!("Live objective {:.6e}", shared.read().objective());
        }
    }

    let report = match handle.wait() {
        Some(result) => result?,
        None => bail!("Optimizer worker did not finish"),
    };
    println!("{}", report);

    let mut site = shared.write();
    if args.suggest {
        let stats = site.refresh_all_suggestions();
        println!(
            "Suggestions: {} added, {} updated, {} removed",
            stats.added, stats.updated, stats.removed
        );
    }

    let output = args.output.unwrap_or(args.input);
    save_site(&output, &site)?;
    println!("Wrote {}", output.display());

    Ok(())
}
