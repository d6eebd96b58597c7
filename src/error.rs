use std::fmt::Display;

/// Result for fallible operations in this crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Error from std::io
    IO(std::io::Error),
    /// Error processing json
    Json(serde_json::Error),
    /// Error from http client
    Reqwest(reqwest::Error),
    /// A pyatv helper process failed or produced unusable output
    Helper(String),
    /// Operator input became unavailable mid-prompt
    Input(String),
    /// No Apple TVs were discovered on the network
    NoDevices,
    /// Repeated pairing rounds never produced a connectable device
    PairingStalled,
    #[doc(hidden)]
    Other(String),
}

impl Error {
    pub fn is_io(&self) -> bool {
        matches!(self, Error::IO(_))
    }

    pub fn is_helper(&self) -> bool {
        matches!(self, Error::Helper(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Json(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Reqwest(e)
    }
}

impl From<String> for Error {
    fn from(e: String) -> Error {
        Error::Other(e)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IO(e) => write!(f, "{}", e),
            Self::Json(e) => write!(f, "{}", e),
            Self::Reqwest(e) => write!(f, "{}", e),
            Self::Helper(e) => write!(f, "{}", e),
            Self::Input(e) => write!(f, "{}", e),
            Self::NoDevices => write!(f, "No Apple TVs were found on the network"),
            Self::PairingStalled => {
                write!(f, "Pairing never produced a connectable device after repeated scans")
            }
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IO(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Reqwest(e) => Some(e),
            _ => None,
        }
    }
}
