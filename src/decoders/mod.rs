//! Stream decoder for the one filter this crate's scope ever needs:
//! FlateDecode, optionally followed by a PNG/TIFF predictor.
//!
//! Xref streams and object streams are the only streams this crate
//! materialises, and both are conventionally `/FlateDecode` with an
//! optional `/DecodeParms` predictor (§4.3, §4.6). Any other filter name
//! is a hard error — this crate does not interpret content streams, so it
//! never needs ASCII85/LZW/DCT/CCITT/JBIG2.

use crate::error::{Error, Result};

mod flate;
mod predictor;

pub use predictor::{decode_predictor, DecodeParams, PngPredictor};

/// Decode stream data through the filter chain named in `filters`, then
/// apply a predictor if `params` specifies one.
///
/// # Errors
///
/// Returns `Error::UnsupportedFilter` for anything other than
/// `FlateDecode`.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        match filter_name.as_str() {
            "FlateDecode" => current = flate::decode(&current)?,
            other => return Err(Error::UnsupportedFilter(other.to_string())),
        }
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

/// Convenience wrapper with no decode parameters.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_params(data, filters, None)
}
