use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Alert error: {0}")]
    Alert(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
