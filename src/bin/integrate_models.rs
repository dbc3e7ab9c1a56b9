use std::path::PathBuf;

use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use spectral_ratios::{
    report::{write_budget, BudgetRecord},
    DirectColumn, HorizontalBudget, ModelCatalog, ModelReader, Units,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "integrate-models",
    about = "Broadband budget of the model runs on a horizontal plane"
)]
struct Opt {
    /// Root of the model output files tree
    #[structopt(parse(from_os_str))]
    models: PathBuf,
    /// Model output files extension
    #[structopt(long, default_value = "out")]
    extension: String,
    /// Number of header lines in the model output files
    #[structopt(long, default_value = "0")]
    header_lines: usize,
    /// Model irradiance units: W_m2_nm, mW_m2_nm or W_m2_um
    #[structopt(long, default_value = "mW_m2_nm")]
    units: Units,
    /// Direct irradiance column of the model files: horizontal or normal
    #[structopt(long, default_value = "horizontal")]
    direct_column: DirectColumn,
    /// Output CSV file
    #[structopt(short, long, parse(from_os_str), default_value = "model_budget.csv")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let catalog = ModelCatalog::builder(&opt.models, 90.)
        .extension(opt.extension.as_str())
        .build()?;
    let entries: Vec<_> = catalog
        .dates()
        .flat_map(|date| catalog.entries(date))
        .collect();
    println!("Found {} model runs", entries.len());

    let reader = ModelReader::default()
        .header_lines(opt.header_lines)
        .units(opt.units);
    let pb = ProgressBar::new(entries.len() as u64);
    let records: Vec<BudgetRecord> = entries
        .par_iter()
        .progress_with(pb)
        .filter_map(|entry| match reader.read(&entry.path) {
            Ok(spectrum) => {
                let budget = HorizontalBudget::check(&spectrum, entry.angle_deg, opt.direct_column);
                Some(BudgetRecord::new(entry.date, budget))
            }
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        })
        .collect();
    write_budget(&opt.output, &records)?;
    println!(
        "{} model runs integrated into {}",
        records.len(),
        opt.output.display()
    );
    Ok(())
}
