use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Generated story text is empty")]
    EmptyStory,

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),
}
