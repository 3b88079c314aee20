//! Design matrix CLI.
//!
//! Commands:
//! - generate: Build, repair and randomize a design matrix
//! - validate: Re-check an existing design CSV
//! - plan: Print one listener's trials split into blocks

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use counterbalance_kernel::{BalancePolicy, SnrFormat};
use design_matrix::artifact::{load_params, read_design_csv};
use design_matrix::experiment::{DesignRunner, DesignRunnerConfig, validate_design_file};
use design_matrix::plan::SessionPlan;

#[derive(Parser)]
#[command(name = "design-matrix")]
#[command(version)]
#[command(about = "Counterbalanced listening-experiment design generator")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a design matrix
    Generate {
        /// YAML parameter file
        #[arg(long, env = "DESIGN_PARAMS")]
        params: PathBuf,

        /// CSV of unusable recordings (`talker,sentence`)
        #[arg(long)]
        missing: Option<PathBuf>,

        /// Directory of `{talker}_{sentence}.wav` recordings; absent pairs
        /// are treated as missing
        #[arg(long)]
        stimulus_dir: Option<PathBuf>,

        /// Random seed (overrides the parameter file)
        #[arg(long)]
        seed: Option<u64>,

        /// SNR column format: decimal or integer
        #[arg(long)]
        snr_format: Option<String>,

        /// Balance policy: tolerant or strict
        #[arg(long)]
        balance: Option<String>,

        /// Output file for the design matrix
        #[arg(long, default_value = "design-matrix.csv")]
        output: PathBuf,

        /// Output file for the JSON run summary
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Validate an existing design matrix
    Validate {
        /// Design matrix CSV
        #[arg(long)]
        input: PathBuf,

        /// Balance policy: tolerant or strict
        #[arg(long, default_value = "tolerant")]
        balance: String,

        /// Parameter file; when given, listener ids and sentence sets are
        /// checked against it
        #[arg(long)]
        params: Option<PathBuf>,

        /// The design went through missing-stimulus repair: only the
        /// groupings repair preserves are fatal, as in `generate`
        #[arg(long)]
        after_repair: bool,
    },

    /// Print a listener's session plan
    Plan {
        /// Design matrix CSV
        #[arg(long)]
        input: PathBuf,

        /// Listener id
        #[arg(long)]
        listener: usize,

        /// Trials per block (0 = one block)
        #[arg(long, default_value = "0")]
        block_len: usize,

        /// Required trial count for the listener
        #[arg(long)]
        expected: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Generate {
            params,
            missing,
            stimulus_dir,
            seed,
            snr_format,
            balance,
            output,
            summary,
        } => {
            let config = DesignRunnerConfig {
                params_path: params,
                missing_path: missing,
                stimulus_dir,
                output: output.clone(),
                summary,
                seed,
                snr_format: snr_format.as_deref().map(parse_format).transpose()?,
                balance: balance.as_deref().map(parse_policy).transpose()?,
            };

            let runner = DesignRunner::new(config);
            let (outcome, summary) = runner.run()?;

            println!("\n=== Design Matrix ===");
            println!("Design id: {}", summary.design_id);
            println!("Seed: {}", summary.seed);
            println!(
                "Listeners: {}  Sentences: {}  SNRs: {}  Talkers: {}",
                summary.n_listeners, summary.n_sentences, summary.n_snrs, summary.n_talkers
            );
            println!("SNR levels: {}", summary.snr_levels.join(" "));
            println!("Trials: {}", summary.total_trials);

            if let Some(repair) = &outcome.repair {
                println!("\nRepair:");
                println!("  Iterations: {}", repair.iterations);
                println!("  Rows reassigned: {}", repair.repaired_rows());
                for (talker, quota) in &repair.quotas {
                    println!("  Quota {}: {}", talker, quota);
                }
                if !repair.unmatched.is_empty() {
                    println!("  Unmatched records: {}", repair.unmatched.len());
                }
            }

            println!();
            print!("{}", outcome.final_balance);
            println!("\nDesign matrix saved to: {}", output.display());
        }

        Commands::Validate {
            input,
            balance,
            params,
            after_repair,
        } => {
            let policy = parse_policy(&balance)?;
            let params = params.map(load_params).transpose()?;
            let report = validate_design_file(&input, policy, params.as_ref(), after_repair)?;

            info!(input = %input.display(), "Design matrix passed validation");
            println!("\n=== Validation Passed ({}) ===", policy);
            print!("{}", report);
        }

        Commands::Plan {
            input,
            listener,
            block_len,
            expected,
        } => {
            let matrix = read_design_csv(&input)?;
            let plan = SessionPlan::build(&matrix, listener, block_len, expected)?;
            print!("{}", plan);
        }
    }

    Ok(())
}

fn parse_policy(s: &str) -> Result<BalancePolicy> {
    s.parse().map_err(|e: String| anyhow::anyhow!(e))
}

fn parse_format(s: &str) -> Result<SnrFormat> {
    s.parse().map_err(|e: String| anyhow::anyhow!(e))
}
