//! Zip-code distance.
//!
//! Distance is the absolute difference of the two codes read as integers. It
//! is a cheap ordering proxy, not a geographic measure: `10001` and `10999`
//! may be far apart on a map and still rank as neighbours.

use crate::errors::InvalidZipCode;
use crate::types::Distance;

/// Distance between two raw zip code strings.
///
/// Surrounding whitespace is ignored. Anything else that does not parse as an
/// integer fails with [`InvalidZipCode`].
pub fn distance(zip_a: &str, zip_b: &str) -> Result<Distance, InvalidZipCode> {
    let a = parse(zip_a)?;
    let b = parse(zip_b)?;
    Ok(Distance::new(a.abs_diff(b)))
}

fn parse(zip: &str) -> Result<i64, InvalidZipCode> {
    zip.trim()
        .parse::<i64>()
        .map_err(|_| InvalidZipCode(zip.to_string()))
}
