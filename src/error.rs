use crate::{
    catalog::{CatalogError, ModelFileError},
    config::ConfigError,
    events::EventError,
    frame::FrameError,
    measurements::MeasurementError,
    report::ReportError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("error in the `catalog` module")]
    Catalog(#[from] CatalogError),
    #[error("error in the `catalog::model` module")]
    ModelFile(#[from] ModelFileError),
    #[error("error in the `measurements` module")]
    Measurement(#[from] MeasurementError),
    #[error("error in the `events` module")]
    Event(#[from] EventError),
    #[error("error in the `frame` module")]
    Frame(#[from] FrameError),
    #[error("error in the `report` module")]
    Report(#[from] ReportError),
}
pub type Result<T> = std::result::Result<T, Error>;
