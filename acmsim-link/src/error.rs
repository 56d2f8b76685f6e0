use thiserror::Error;

/// Link model configuration errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("MODCOD table is empty")]
    EmptyTable,

    #[error("MODCOD '{name}' must have a positive payload and transmission time")]
    InvalidModcod { name: String },

    #[error(
        "MODCOD '{name}' (index {index}) is slower than its predecessor: \
         {bit_rate:.0} bit/s < {previous:.0} bit/s"
    )]
    ModcodOrder {
        index: usize,
        name: String,
        bit_rate: f64,
        previous: f64,
    },

    #[error("unknown DVB-S2 MODCOD '{0}'")]
    UnknownModcod(String),

    #[error("MODCOD '{name}' is not defined for {frame} frames")]
    UnsupportedFrameSize { name: String, frame: &'static str },

    #[error("invalid rate: {0}")]
    InvalidRate(f64),
}
