use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpindleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Config error: {0}")]
    Config(String),
}
