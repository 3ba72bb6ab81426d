//! Runs one worker for each cell of the Game of Life grid.
//!
//! ```text
//! gameoflife [options]
//!
//!   -s, --size <N>       grid edge length            (default: 32)
//!   -l, --speed <F>      max generations per second  (default: 1.0)
//!   -n, --steps <N>      stop after N generations    (default: run forever)
//!   -p, --pattern <FILE> initial state of the grid   (default: random seed)
//!   -C, --no-center      do not center the pattern in the grid
//!   -W, --no-wrap        do not wrap around the grid edges
//!       --url <URL>      server root                 (default: ws://localhost:8000)
//! ```

use tracing_subscriber::EnvFilter;

use c10k_life::error::{Error, Result};
use c10k_life::life::{Edges, GridConfig, Pattern, reset, run_grid};

const DEFAULT_URL: &str = "ws://localhost:8000";

struct Options {
    size: u16,
    speed: f64,
    steps: Option<u64>,
    pattern: Option<String>,
    center: bool,
    edges: Edges,
    url: String,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        size: 32,
        speed: 1.0,
        steps: None,
        pattern: None,
        center: true,
        edges: Edges::Wrap,
        url: DEFAULT_URL.to_owned(),
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| Error::sequencing(format!("{name} requires a value")))
        };
        match arg.as_str() {
            "-s" | "--size" => {
                options.size = value(&arg)?
                    .parse()
                    .map_err(|_| Error::sequencing("size must be a positive integer"))?;
            }
            "-l" | "--speed" => {
                options.speed = value(&arg)?
                    .parse()
                    .map_err(|_| Error::sequencing("speed must be a number"))?;
            }
            "-n" | "--steps" => {
                let steps = value(&arg)?
                    .parse()
                    .map_err(|_| Error::sequencing("steps must be a positive integer"))?;
                options.steps = Some(steps);
            }
            "-p" | "--pattern" => options.pattern = Some(value(&arg)?),
            "-C" | "--no-center" => options.center = false,
            "-W" | "--no-wrap" => options.edges = Edges::Clip,
            "--url" => options.url = value(&arg)?,
            other => {
                return Err(Error::sequencing(format!("unknown option: {other}")));
            }
        }
    }

    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("c10k_life=info")),
        )
        .with_target(false)
        .init();

    let options = parse_args()?;

    let pattern = match &options.pattern {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Some(Pattern::parse(&text, options.size, options.center)?)
        }
        None => None,
    };

    reset(&options.url, options.size).await?;
    run_grid(GridConfig {
        base_url: options.url,
        size: options.size,
        edges: options.edges,
        speed: options.speed,
        steps: options.steps,
        pattern,
    })
    .await
}
