//! Long-run behaviour of a bounded birth-death queue.
//!
//! States `0..=capacity` count the jobs in the queue. Jobs arrive with rate
//! `lambda` and are served with rate `mu`. The stationary distribution is
//! geometric with ratio `lambda / mu`, which the solver result is checked
//! against.
//!
//! ```bash
//! cargo run --example steady_state -- 50 --lambda 2 --mu 3 --method power
//! cargo run --example steady_state -- 10 --discrete --tra queue.tra --dot queue.dot
//! ```

use std::rc::Rc;

use clap::{Parser, ValueEnum};
use log::info;

use pmc_rs::ctmc::{default_uniformisation_rate, uniformised_dtmc};
use pmc_rs::dot::{to_dot_with_config, DotConfig};
use pmc_rs::export::{export_tra, ExportConfig};
use pmc_rs::model::Model;
use pmc_rs::simple::{MutableModel, SimpleModel};
use pmc_rs::sparse::SparseModel;
use pmc_rs::steady::{LocalMethod, SolverConfig, SteadyStateSolver};
use pmc_rs::types::ModelType;

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Method {
    Auto,
    Gauss,
    Power,
}

impl From<Method> for LocalMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Auto => LocalMethod::Auto,
            Method::Gauss => LocalMethod::Gauss,
            Method::Power => LocalMethod::Power,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Queue capacity.
    #[arg(value_name = "INT", default_value = "20")]
    capacity: usize,

    /// Arrival rate.
    #[clap(long, value_name = "FLOAT", default_value = "1.0")]
    lambda: f64,

    /// Service rate.
    #[clap(long, value_name = "FLOAT", default_value = "2.0")]
    mu: f64,

    /// Solve the uniformised DTMC instead of the CTMC.
    #[clap(long)]
    discrete: bool,

    /// Local solution method for BSCCs.
    #[clap(long, value_enum, default_value = "auto")]
    method: Method,

    /// Convergence threshold of the iterative parts.
    #[clap(long, value_name = "FLOAT", default_value = "1e-10")]
    epsilon: f64,

    /// Write the solved model in `.tra` format.
    #[clap(long, value_name = "FILE")]
    tra: Option<String>,

    /// Write the solved model in DOT format.
    #[clap(long, value_name = "FILE")]
    dot: Option<String>,
}

fn build_queue(capacity: usize, lambda: f64, mu: f64) -> color_eyre::Result<SimpleModel> {
    let mut m = SimpleModel::new(ModelType::Ctmc, capacity + 1);
    m.add_initial_state(0)?;
    for jobs in 0..=capacity {
        if jobs < capacity {
            m.set_probability(jobs, jobs + 1, lambda)?;
        }
        if jobs > 0 {
            m.set_probability(jobs, jobs - 1, mu)?;
        }
    }
    Ok(m)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let queue: Rc<dyn Model> = Rc::new(build_queue(args.capacity, args.lambda, args.mu)?);
    let model: Rc<dyn Model> = if args.discrete {
        let q = default_uniformisation_rate(queue.as_ref(), None);
        info!("uniformising with rate {}", q);
        Rc::new(uniformised_dtmc(queue, q)?)
    } else {
        queue
    };
    let sparse = SparseModel::from_model(model.as_ref());
    println!("{} {}", sparse.model_type(), sparse.info_string());

    if let Some(path) = &args.tra {
        export_tra(&sparse, path, &ExportConfig::default().with_precision(6))?;
        println!("Wrote {}", path);
    }
    if let Some(path) = &args.dot {
        let config = DotConfig::default().with_precision(3);
        std::fs::write(path, to_dot_with_config(&sparse, &config)?)?;
        println!("Wrote {}", path);
    }

    let config = SolverConfig::default()
        .with_method(args.method.into())
        .with_epsilon(args.epsilon)
        .with_max_iterations(1_000_000);
    let time_solve = std::time::Instant::now();
    let mut solver = SteadyStateSolver::new(config);
    let solution = solver.compute(&sparse)?;
    println!(
        "Solved in {:.3} s: {} BSCC(s), {} iterations",
        time_solve.elapsed().as_secs_f64(),
        solution.probs().num_bsccs(),
        solution.iterations()
    );

    // pi(k) is proportional to rho^k
    let rho = args.lambda / args.mu;
    let norm: f64 = (0..=args.capacity).map(|k| rho.powi(k as i32)).sum();
    let mut max_error = 0.0f64;
    for (k, &p) in solution.distribution().iter().enumerate() {
        let expected = rho.powi(k as i32) / norm;
        max_error = max_error.max((p - expected).abs());
        if k < 5 || k == args.capacity {
            println!("pi[{}] = {:.8} (expected {:.8})", k, p, expected);
        }
    }
    println!("max error = {:e}", max_error);

    let mean: f64 = solution
        .distribution()
        .iter()
        .enumerate()
        .map(|(k, p)| k as f64 * p)
        .sum();
    println!("mean queue length = {:.6}", mean);

    println!("Total time: {:.3} s", time_total.elapsed().as_secs_f64());
    Ok(())
}
