use anyhow::bail;
use clap::Parser;
use core::{num::NonZeroU32, time::Duration};
use fetchpool::{Job, PoolConfig, RetryPolicy, UniformDelay};

/// Runtime configuration for the `fetchpool` binary.
///
/// These settings control the size of the pool, the request each client job
/// carries, how often the client produces a job, and how workers retry. All
/// values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fetchpool",
    version,
    about = "Floods a worker pool with ranged HTTP requests until interrupted"
)]
pub struct CliArgs {
    /// Number of workers, each owning its own HTTP session.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 10)]
    pub num_workers: usize,

    /// URL every client job requests.
    ///
    /// Environment variable: `FETCH_URL`
    #[arg(long, env = "FETCH_URL", default_value_t = String::from("http://www.example.com/index.html"))]
    pub url: String,

    /// First byte of the requested range (inclusive).
    ///
    /// Environment variable: `RANGE_START`
    #[arg(long, env = "RANGE_START", default_value_t = 0)]
    pub range_start: u64,

    /// Last byte of the requested range (inclusive).
    ///
    /// Environment variable: `RANGE_END`
    #[arg(long, env = "RANGE_END", default_value_t = 4095)]
    pub range_end: u64,

    /// Lower bound of the random delay between two client jobs.
    ///
    /// Environment variable: `MIN_INTERVAL_MS`
    #[arg(long, env = "MIN_INTERVAL_MS", default_value_t = 10)]
    pub min_interval_ms: u64,

    /// Upper bound of the random delay between two client jobs.
    ///
    /// Environment variable: `MAX_INTERVAL_MS`
    #[arg(long, env = "MAX_INTERVAL_MS", default_value_t = 300)]
    pub max_interval_ms: u64,

    /// Pause between two attempts of the same job.
    ///
    /// Environment variable: `RETRY_COOLDOWN_MS`
    #[arg(long, env = "RETRY_COOLDOWN_MS", default_value_t = 100)]
    pub retry_cooldown_ms: u64,

    /// Attempts per job before the worker gives up. `0` retries forever.
    ///
    /// Environment variable: `MAX_ATTEMPTS`
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 0)]
    pub max_attempts: u32,

    /// Time limit for a single attempt. `0` disables the limit.
    ///
    /// Environment variable: `ATTEMPT_TIMEOUT_MS`
    #[arg(long, env = "ATTEMPT_TIMEOUT_MS", default_value_t = 0)]
    pub attempt_timeout_ms: u64,

    /// Fail a job on its first 404 instead of retrying it.
    ///
    /// Environment variable: `FAIL_ON_NOT_FOUND`
    #[arg(long, env = "FAIL_ON_NOT_FOUND", default_value_t = false)]
    pub fail_on_not_found: bool,

    /// Capacity of the master's submission queue.
    ///
    /// Submissions beyond this wait while every worker is busy.
    ///
    /// Environment variable: `SUBMISSION_BUFFER`
    #[arg(long, env = "SUBMISSION_BUFFER", default_value_t = 1)]
    pub submission_buffer: usize,

    /// Seed for the interval generator. Unset draws from OS entropy.
    ///
    /// Environment variable: `SEED`
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub job: Job,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub seed: Option<u64>,
}

impl AppConfig {
    /// Builds the client's interval source.
    pub fn delays(&self) -> fetchpool::Result<UniformDelay> {
        match self.seed {
            Some(seed) => UniformDelay::seeded(self.min_interval, self.max_interval, seed),
            None => UniformDelay::new(self.min_interval, self.max_interval),
        }
    }
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.submission_buffer == 0 {
            bail!("SUBMISSION_BUFFER must be greater than 0");
        }

        if args.min_interval_ms > args.max_interval_ms {
            bail!(
                "MIN_INTERVAL_MS ({}) exceeds MAX_INTERVAL_MS ({})",
                args.min_interval_ms,
                args.max_interval_ms
            );
        }

        if args.range_start > args.range_end {
            bail!(
                "RANGE_START ({}) exceeds RANGE_END ({})",
                args.range_start,
                args.range_end
            );
        }

        if args.url.is_empty() {
            bail!("FETCH_URL must not be empty");
        }

        let retry = RetryPolicy {
            cooldown: Duration::from_millis(args.retry_cooldown_ms),
            max_attempts: NonZeroU32::new(args.max_attempts),
            attempt_timeout: (args.attempt_timeout_ms > 0)
                .then(|| Duration::from_millis(args.attempt_timeout_ms)),
            fail_on_not_found: args.fail_on_not_found,
        };

        Ok(Self {
            pool: PoolConfig {
                num_workers: args.num_workers,
                submission_buffer: args.submission_buffer,
                retry,
            },
            job: Job::new(args.url, args.range_start, args.range_end),
            min_interval: Duration::from_millis(args.min_interval_ms),
            max_interval: Duration::from_millis(args.max_interval_ms),
            seed: args.seed,
        })
    }
}
