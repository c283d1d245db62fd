//! Tour of the lazy model views.
//!
//! Builds a coin and a small random walk, glues them together, restricts,
//! lumps and extends the result, and prints each step. Nothing is copied
//! until the final `SparseModel::from_model`.
//!
//! ```bash
//! cargo run --example views -- --format tra
//! ```

use std::rc::Rc;

use clap::{Parser, ValueEnum};

use pmc_rs::bitset::StateSet;
use pmc_rs::dot::to_dot;
use pmc_rs::equivalence::EquivalenceRelation;
use pmc_rs::export::{language_string, tra_string, ExportConfig};
use pmc_rs::model::Model;
use pmc_rs::simple::{MutableModel, SimpleModel};
use pmc_rs::sparse::SparseModel;
use pmc_rs::types::ModelType;
use pmc_rs::view::{AdditionalStates, AlteredDistributions, DisjointUnion, Quotient, Restricted, Restriction};

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Format {
    Tra,
    Language,
    Dot,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Output format for every step.
    #[clap(long, value_enum, default_value = "tra")]
    format: Format,

    /// Significant digits of printed weights.
    #[clap(long, value_name = "INT", default_value = "4")]
    precision: usize,
}

/// A coin that is flipped until it shows heads, then stays there.
fn coin(p: f64) -> color_eyre::Result<SimpleModel> {
    let mut m = SimpleModel::new(ModelType::Dtmc, 2);
    m.add_initial_state(0)?;
    m.set_probability(0, 0, 1.0 - p)?;
    m.set_probability(0, 1, p)?;
    m.set_probability(1, 1, 1.0)?;
    m.add_label("heads", StateSet::singleton(1))?;
    Ok(m)
}

/// A three-state random walk with two symmetric ends.
fn walk() -> color_eyre::Result<SimpleModel> {
    let mut m = SimpleModel::new(ModelType::Dtmc, 3);
    m.add_initial_state(1)?;
    m.set_probability(0, 1, 1.0)?;
    m.set_probability(1, 0, 0.5)?;
    m.set_probability(1, 2, 0.5)?;
    m.set_probability(2, 1, 1.0)?;
    Ok(m)
}

fn show(title: &str, model: &dyn Model, args: &Cli) -> color_eyre::Result<()> {
    let config = ExportConfig::default().with_precision(args.precision);
    println!("== {}: {}", title, model.info_string());
    let text = match args.format {
        Format::Tra => tra_string(model, &config)?,
        Format::Language => language_string(model, &config)?,
        Format::Dot => to_dot(model)?,
    };
    print!("{}", text);
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    let first: Rc<dyn Model> = Rc::new(coin(0.5)?);
    let second: Rc<dyn Model> = Rc::new(walk()?);
    let union: Rc<dyn Model> = Rc::new(DisjointUnion::new(Rc::clone(&first), Rc::clone(&second))?);
    show("union", union.as_ref(), &args)?;

    // the walk alone, reached from its initial state
    let transformation = Restricted::transform(Rc::clone(&union), &StateSet::singleton(3), Restriction::TransitiveClosure);
    show("restricted", transformation.transformed().as_ref(), &args)?;
    let projected = transformation.project_to_original(&[1.0, 2.0, 3.0])?;
    println!("projected back: {:?}", projected);

    // the two ends of the walk are indistinguishable
    let ends: StateSet = [2, 4].into_iter().collect();
    let relation = EquivalenceRelation::new([ends], union.num_states())?;
    let lumped = Quotient::transform(Rc::clone(&union), &relation, true, true)?;
    show("lumped", lumped.transformed().as_ref(), &args)?;

    // the walk's centre becomes a self loop
    let trapped: Rc<dyn Model> = Rc::new(AlteredDistributions::trap_states(
        Rc::clone(lumped.transformed()),
        &StateSet::singleton(3),
    ));
    show("trapped", trapped.as_ref(), &args)?;

    let mut extended = AdditionalStates::new(Rc::clone(&trapped), 2, false);
    let deadlocks = extended.find_deadlocks(true)?;
    println!("fixed deadlocks: {}", deadlocks);
    show("extended", &extended, &args)?;

    let stored = SparseModel::from_model(&extended);
    println!("stored copy: {}", stored);
    Ok(())
}
