//! Cloudslot simulator CLI
//!
//! ## Usage
//!
//! ```bash
//! # Condense a task_events CSV into summaries
//! zcat part-*.csv.gz | cloudslot-sim summarize --summaries tasks.json
//!
//! # Run the default policies over one generated input
//! cloudslot-sim run --summaries tasks.json --num-machines 50 --allocation-cost 2
//!
//! # Sweep the number of machines for two policies
//! cloudslot-sim sweep --summaries tasks.json -x num-machines -y objective \
//!     --range 10:100:9 --policy "PQ(v/w)" --policy "PPPQ(0.5:2)"
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{CommandFactory, Parser, Subcommand};
use cloudslot_core::{ModelParameters, PolicySpec, trim_float};
use cloudslot_simulation_engine::{
    AVAILABLE_POLICIES, Aggregation, InputParameters, Metric, ONE_SECOND, ParameterTable, Range,
    SweepConfig, Variable, generate_input, parse_policies, resolve_parameters, run_sweep, simulate,
    render::{build_table, render_table, write_tsv},
    stats::InputStats,
    trace::{read_events, read_summaries, summarize, write_summaries},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Targets are the crate names of the simulator
const DEFAULT_LOG_FILTER: &str =
    "cloudslot_core=info,cloudslot_simulation_engine=info,cloudslot_sim=info,warn";

const DEFAULT_POLICIES: [&str; 7] = [
    "PQ(v/w)",
    "PQ(v)",
    "PQ(-w)",
    "PQ(-d)",
    "NRAP",
    "PPPQ(0:1)",
    "PPPQ(0:1:wc)",
];

/// Cloudslot: cloud job scheduling simulator
#[derive(Parser)]
#[command(name = "cloudslot-sim")]
#[command(about = "Simulate job admission and machine provisioning policies on cluster traces", long_about = None)]
struct Cli {
    /// Duration of a time slot (seconds)
    #[arg(long, global = true, default_value_t = 1)]
    time_slot_duration: i64,

    /// Factor applied to processing times
    #[arg(long, global = true, default_value_t = 1.0)]
    processing_scale: f64,

    /// Factor applied to job values
    #[arg(long, global = true, default_value_t = 1.0)]
    value_scale: f64,

    /// Base for exponential values (value = scale * base^priority)
    #[arg(long, global = true)]
    value_exponent: Option<f64>,

    /// Deadline cushions of the four scheduling classes
    #[arg(long, global = true, num_args = 4, default_values_t = [1.0, 2.0, 4.0, 10.0])]
    deadline_cushions: Vec<f64>,

    /// Factor applied to every deadline cushion
    #[arg(long, global = true, default_value_t = 1.0)]
    deadline_cushions_scale: f64,

    /// Draw each cushion uniformly from [c, 2c)
    #[arg(long, global = true)]
    deadline_random: bool,

    /// Serialized task summaries
    #[arg(long, global = true)]
    summaries: Option<PathBuf>,

    /// Time to provision a machine (seconds)
    #[arg(long, global = true, default_value_t = 0.0)]
    vm_allocation_time: f64,

    /// Maximal number of machines
    #[arg(long, global = true, default_value_t = 0)]
    num_machines: usize,

    /// Cost of allocating one machine
    #[arg(long, global = true, default_value_t = 0.0)]
    allocation_cost: f64,

    /// Cost of keeping one machine for a second
    #[arg(long, global = true, default_value_t = 0.0)]
    maintenance_cost: f64,

    /// Policy to evaluate (repeatable)
    #[arg(long = "policy", global = true)]
    policy_names: Vec<String>,

    /// TSV of precomputed PPPQ parameters by cushion
    #[arg(long, global = true)]
    param_table: Option<PathBuf>,

    /// Print the known policy formats and exit
    #[arg(long)]
    list_policies: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read task_events CSV from stdin and write the summaries file
    #[command(alias = "create-summaries")]
    Summarize,

    /// Run every policy over one generated input
    Run,

    /// Print statistics of the generated input
    #[command(alias = "print-stats")]
    Stats,

    /// Evaluate the policies over a range of one variable
    #[command(alias = "plot")]
    Sweep {
        /// Variable on the x axis
        #[arg(long, short = 'x')]
        variable: String,

        /// Metric on the y axis
        #[arg(long = "value", short = 'y')]
        metric: String,

        /// start:end:num_segments[:exp]
        #[arg(long)]
        range: String,

        /// Directory for the TSV files
        #[arg(long, default_value = "plots")]
        dir: PathBuf,

        /// Runs for each point (inputs differ when deadlines are random)
        #[arg(long, default_value_t = 1)]
        runs_per_input: usize,

        /// Number of worker threads
        #[arg(long, default_value_t = 1)]
        num_threads: usize,

        /// How to combine multiple runs (mean, median)
        #[arg(long, default_value = "mean")]
        run_strategy: String,
    },
}

impl Cli {
    fn input_parameters(&self) -> InputParameters {
        InputParameters {
            time_slot_duration: self.time_slot_duration * ONE_SECOND,
            processing_scale: self.processing_scale,
            value_scale: self.value_scale,
            scheduling_class_cushions: self.deadline_cushions.clone(),
            scheduling_class_cushions_scale: self.deadline_cushions_scale,
            scheduling_cushions_randomized: self.deadline_random,
            value_exp_base: self.value_exponent,
        }
    }

    fn model_parameters(&self, input: &InputParameters) -> ModelParameters {
        ModelParameters::new(
            input.seconds_to_slots(self.vm_allocation_time),
            self.num_machines,
            self.allocation_cost,
            input.per_second_to_per_slot(self.maintenance_cost),
        )
    }

    fn summaries_path(&self) -> anyhow::Result<&Path> {
        self.summaries
            .as_deref()
            .context("--summaries <path> is required")
    }

    fn policies(&self) -> anyhow::Result<Vec<PolicySpec>> {
        let policies = if self.policy_names.is_empty() {
            parse_policies(&DEFAULT_POLICIES[..])?
        } else {
            parse_policies(&self.policy_names)?
        };
        Ok(policies)
    }

    fn param_table(&self) -> anyhow::Result<Option<ParameterTable>> {
        self.param_table
            .as_deref()
            .map(|path| {
                ParameterTable::load(path)
                    .with_context(|| format!("failed to load parameter table {}", path.display()))
            })
            .transpose()
    }

    /// `summaries_dt1_vs1_..._objective(num-machines[10_100_9])`
    fn sweep_file_name(&self, metric: Metric, variable: Variable, range: &Range) -> String {
        let mut parts = vec![
            self.summaries
                .as_deref()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            format!("dt{}", self.time_slot_duration),
            format!("vs{}", trim_float(self.value_scale)),
            format!("ws{}", trim_float(self.processing_scale)),
        ];
        if let Some(exp_base) = self.value_exponent {
            parts.push(format!("vexp{}", trim_float(exp_base)));
        }
        for (class, cushion) in ('a'..='d').zip(&self.deadline_cushions) {
            parts.push(format!("s{}{}", class, trim_float(*cushion)));
        }
        parts.push(format!("ss{}", trim_float(self.deadline_cushions_scale)));
        if self.deadline_random {
            if let Some(Commands::Sweep { runs_per_input, .. }) = &self.command {
                parts.push(format!("ssrnd{}", runs_per_input));
            }
        }
        parts.push(format!("f{}", trim_float(self.vm_allocation_time)));
        parts.push(format!("B{}", self.num_machines));
        parts.push(format!("a{}", trim_float(self.allocation_cost)));
        parts.push(format!("m{}", trim_float(self.maintenance_cost)));
        parts.push(format!(
            "{}({}[{}])",
            metric,
            variable,
            range.to_string().replace(':', "_")
        ));
        parts.join("_")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.list_policies {
        println!("Available policies: {}", AVAILABLE_POLICIES);
        return Ok(());
    }

    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if cli.time_slot_duration <= 0 {
        bail!("--time-slot-duration must be positive");
    }
    let policies = cli.policies()?;
    let input_params = cli.input_parameters();
    input_params.validate()?;
    let model = cli.model_parameters(&input_params);

    match command {
        Commands::Summarize => {
            let path = cli.summaries_path()?;
            let events = read_events(io::stdin().lock())?;
            let summaries = summarize(events);
            write_summaries(path, &summaries)?;
        }

        Commands::Run => {
            let summaries = read_summaries(cli.summaries_path()?)?;
            let table = cli.param_table()?;
            let mut rng = StdRng::seed_from_u64(input_params.seed());
            let input = generate_input(&summaries, &input_params, &mut rng)?;
            info!(jobs = input.num_jobs(), slots = input.time_slots.len(), "Input generated");

            let mut stdout = io::stdout().lock();
            for spec in &policies {
                let pppq = resolve_parameters(spec, table.as_ref(), &input_params, None)?;
                let accounting = simulate(&input, model, spec, pppq)?;
                writeln!(
                    stdout,
                    "{}: objective = {} jobs completed = {}",
                    spec,
                    accounting.objective(),
                    accounting.num_jobs_completed()
                )?;
            }
        }

        Commands::Stats => {
            let summaries = read_summaries(cli.summaries_path()?)?;
            let mut rng = StdRng::seed_from_u64(input_params.seed());
            let input = generate_input(&summaries, &input_params, &mut rng)?;
            print!("{}", InputStats::compute(&input, &model));
        }

        Commands::Sweep {
            variable,
            metric,
            range,
            dir,
            runs_per_input,
            num_threads,
            run_strategy,
        } => {
            let variable: Variable = variable.parse()?;
            let metric: Metric = metric.parse()?;
            let range: Range = range.parse()?;
            let config = SweepConfig {
                variable,
                metric,
                range,
                runs_per_input: *runs_per_input,
                num_workers: *num_threads,
                aggregation: run_strategy.parse::<Aggregation>()?,
            };
            config.validate()?;

            let summaries = Arc::new(read_summaries(cli.summaries_path()?)?);
            let table = cli.param_table()?.map(Arc::new);
            let base_name = cli.sweep_file_name(metric, variable, &range);
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;

            let results = run_sweep(summaries, &input_params, &model, &policies, table, &config).await?;

            let by_policy = build_table(&results, false);
            write_tsv(&dir.join(format!("{}.t.tsv", base_name)), &by_policy)?;
            write_tsv(&dir.join(format!("{}.tsv", base_name)), &build_table(&results, true))?;
            print!("{}", render_table(&by_policy, 2));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_names_crate_targets() {
        let targets: Vec<&str> = DEFAULT_LOG_FILTER
            .split(',')
            .filter_map(|directive| directive.split_once('='))
            .map(|(target, _)| target)
            .collect();
        let engine = env!("CARGO_PKG_NAME").replace('-', "_");

        assert!(targets.contains(&env!("CARGO_CRATE_NAME")));
        assert!(targets.contains(&engine.as_str()));
        assert!(targets.contains(&"cloudslot_core"));
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
