//! Command-line front end for the descent NLP solver.

mod models;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use descent_core::{solve, Options, Problem};

#[derive(Parser)]
#[command(name = "descent")]
#[command(about = "Modular nonlinear programming solver")]
struct Cli {
    /// Bundled model to solve (see --list)
    model: Option<String>,

    /// Preset ingredient combination (ipopt, filtersqp, byrd)
    #[arg(long, short)]
    preset: Option<String>,

    /// Option override, repeatable: --option key=value
    #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Termination tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Outer iteration cap
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Print the per-iteration statistics table
    #[arg(long, short)]
    verbose: bool,

    /// List the bundled models and exit
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list {
        for name in models::available() {
            println!("{name}");
        }
        return Ok(());
    }

    let model_name = cli.model.ok_or_else(|| anyhow!("no model given (try --list)"))?;
    let problem = models::by_name(&model_name)
        .ok_or_else(|| anyhow!("unknown model '{model_name}' (try --list)"))?;

    let mut options = Options::default();
    if let Some(preset) = &cli.preset {
        options.apply_preset(preset)?;
    }
    for entry in &cli.options {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("malformed option '{entry}', expected key=value");
        };
        options.set(key.trim(), value.trim());
    }
    if let Some(tolerance) = cli.tolerance {
        options.set("tolerance", &tolerance.to_string());
    }
    if let Some(max_iterations) = cli.max_iterations {
        options.set("max_iterations", &max_iterations.to_string());
    }
    options.set("verbose", if cli.verbose { "true" } else { "false" });

    println!(
        "Problem {} ({} variables, {} constraints)",
        problem.name(),
        problem.number_variables(),
        problem.number_constraints()
    );

    let result = solve(problem.as_ref(), &options)?;

    println!();
    println!("status:          {}", result.status);
    println!("objective:       {:.8e}", result.iterate.objective);
    println!("infeasibility:   {:.4e}", result.iterate.residuals.infeasibility);
    println!(
        "stationarity:    {:.4e}",
        result
            .iterate
            .residuals
            .optimality_stationarity
            .min(result.iterate.residuals.feasibility_stationarity)
    );
    println!("iterations:      {}", result.iterations);
    println!("subproblems:     {}", result.subproblems_solved);
    println!(
        "evaluations:     {} objective, {} constraints, {} Jacobian, {} Hessian",
        result.objective_evaluations,
        result.constraint_evaluations,
        result.jacobian_evaluations,
        result.hessian_evaluations
    );
    if let Some(penalty) = result.penalty_parameter {
        println!("final penalty:   {penalty:.4e}");
    }
    println!("wall time:       {:.3}s", result.cpu_time.as_secs_f64());
    let primal: Vec<String> = result.iterate.x[..problem.number_variables()]
        .iter()
        .map(|v| format!("{v:.6}"))
        .collect();
    println!("x* = [{}]", primal.join(", "));
    if let Some(message) = &result.message {
        println!("note: {message}");
    }

    Ok(())
}
