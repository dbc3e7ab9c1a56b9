use std::path::PathBuf;

use itertools::Itertools;
use spectral_ratios::{AngleTag, ModelCatalog};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "lsmodels", about = "Lists the indexed model runs")]
struct Opt {
    /// Root of the model output files tree
    #[structopt(parse(from_os_str))]
    models: PathBuf,
    /// Model output files extension
    #[structopt(long, default_value = "out")]
    extension: String,
    /// Only lists the runs of that date (YYYY-MM-DD)
    #[structopt(short, long)]
    date: Option<chrono::NaiveDate>,
    /// Resolves the run closest to that solar zenith angle [deg]
    #[structopt(short, long, requires = "date")]
    zenith: Option<f64>,
    /// Solar zenith angle tolerance [deg]
    #[structopt(short, long, default_value = "0.5")]
    tolerance: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let catalog = ModelCatalog::builder(&opt.models, opt.tolerance)
        .extension(opt.extension)
        .build()?;
    if let (Some(date), Some(zenith)) = (opt.date, opt.zenith) {
        let entry = catalog.resolve(date, zenith)?;
        println!("{}", entry.path.display());
        return Ok(());
    }
    let dates: Vec<_> = match opt.date {
        Some(date) => vec![date],
        None => catalog.dates().collect(),
    };
    for date in dates {
        let tags = catalog
            .entries(date)
            .iter()
            .map(|entry| AngleTag::from_degrees(entry.angle_deg))
            .join(" ");
        println!("{}: {}", date, tags);
    }
    if !catalog.skipped().is_empty() {
        eprintln!("{} files skipped:", catalog.skipped().len());
        for path in catalog.skipped() {
            eprintln!(" - {}", path.display());
        }
    }
    Ok(())
}
