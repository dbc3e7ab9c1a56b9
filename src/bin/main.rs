use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveTime;
use spectral_ratios::{
    diagnostics::UnitCheck, Config, DirectColumn, Extrapolation, MatchMode, ModelQuantity,
    Pipeline, Report, Units,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "spectral-ratios",
    about = "Model to measurement spectral irradiance ratios"
)]
struct Opt {
    /// Measurement CSV files (optionally gzip compressed)
    #[structopt(parse(from_os_str), required = true)]
    measurements: Vec<PathBuf>,
    /// Root of the model output files tree [env: SPECTRAL_MODEL_ROOT]
    #[structopt(short, long, parse(from_os_str))]
    models: Option<PathBuf>,
    /// Model output files extension
    #[structopt(long, default_value = "out")]
    model_extension: String,
    /// Number of header lines in the model output files
    #[structopt(long, default_value = "0")]
    model_header_lines: usize,
    /// Model irradiance units: W_m2_nm, mW_m2_nm or W_m2_um
    #[structopt(long, default_value = "mW_m2_nm")]
    model_units: Units,
    /// Measurement irradiance units: W_m2_nm, mW_m2_nm or W_m2_um
    #[structopt(long, default_value = "W_m2_nm")]
    measurement_units: Units,
    /// Model quantity: dni, direct_horizontal, dhi or ghi
    #[structopt(short, long, default_value = "dni")]
    quantity: ModelQuantity,
    /// Direct irradiance column of the model files: horizontal or normal
    #[structopt(long, default_value = "horizontal")]
    direct_column: DirectColumn,
    /// Lower bound of the spectral band [nm]
    #[structopt(long, default_value = "350")]
    min_nm: f64,
    /// Upper bound of the spectral band [nm]
    #[structopt(long, default_value = "1100")]
    max_nm: f64,
    /// Solar zenith angle tolerance [deg] [env: SPECTRAL_ANGLE_TOLERANCE_DEG]
    #[structopt(short, long)]
    angle_tolerance: Option<f64>,
    /// Event to measurement time tolerance [minute] [env: SPECTRAL_TIME_TOLERANCE_MIN]
    #[structopt(short, long)]
    time_tolerance: Option<f64>,
    /// Matching strategy: direct, events or minimum-zenith
    #[structopt(long, default_value = "direct")]
    mode: MatchMode,
    /// Start of the minimum zenith angle time window [HH:MM[:SS]]
    #[structopt(long, default_value = "10:00", parse(try_from_str = parse_time))]
    window_start: NaiveTime,
    /// End of the minimum zenith angle time window [HH:MM[:SS]]
    #[structopt(long, default_value = "10:30", parse(try_from_str = parse_time))]
    window_end: NaiveTime,
    /// Directory of the AERONET inversion files
    #[structopt(short, long, parse(from_os_str))]
    events: Option<PathBuf>,
    /// AERONET site name
    #[structopt(long)]
    site: Option<String>,
    /// Extrapolation outside of the model spectra: nan or linear
    #[structopt(long, default_value = "nan")]
    extrapolation: Extrapolation,
    /// Ratios by hour of the day
    #[structopt(long)]
    hourly: bool,
    /// Process the days one after the other
    #[structopt(long)]
    sequential: bool,
    /// Check the units of the measurements against their reported broadband
    #[structopt(long)]
    unit_check: bool,
    /// Output directory
    #[structopt(short, long, parse(from_os_str), default_value = "spectral-ratios")]
    output: PathBuf,
}

fn parse_time(arg: &str) -> chrono::ParseResult<NaiveTime> {
    NaiveTime::parse_from_str(arg, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(arg, "%H:%M"))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut config = Config::default()
        .measurements(opt.measurements)
        .model_extension(opt.model_extension)
        .model_header_lines(opt.model_header_lines)
        .model_units(opt.model_units)
        .measurement_units(opt.measurement_units)
        .quantity(opt.quantity)
        .direct_column(opt.direct_column)
        .band(opt.min_nm, opt.max_nm)
        .match_mode(opt.mode)
        .zenith_window(opt.window_start, opt.window_end)
        .extrapolation(opt.extrapolation)
        .hourly(opt.hourly)
        .parallel(!opt.sequential)
        .output_dir(&opt.output);
    if let Some(arg) = opt.models {
        config = config.model_root(arg);
    }
    if let Some(arg) = opt.angle_tolerance {
        config = config.angle_tolerance(arg);
    }
    if let Some(arg) = opt.time_tolerance {
        config = config.time_tolerance(arg);
    }
    if let Some(arg) = opt.events {
        config = config.event_dir(arg);
    }
    if let Some(arg) = opt.site {
        config = config.site(arg);
    }
    let config = config.with_env()?;
    let output_dir = config.output_dir.clone();

    let pipeline = Pipeline::new(config).context("failed to set up the pipeline")?;
    if opt.unit_check && UnitCheck::run(pipeline.series()).is_none() {
        println!("No reported broadband column, unit check skipped");
    }
    let summary = pipeline.run();
    Report::new(&output_dir)?
        .write(&summary)
        .context("failed to write the outputs")?;
    println!("{}", summary);

    Ok(())
}
