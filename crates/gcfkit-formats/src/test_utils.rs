//! Helpers shared by section unit tests

use std::fmt::Debug;

use pretty_assertions::assert_eq;

use crate::SteamFormat;

/// Build `original`, parse the bytes back and require an equal value
///
/// Byte-level checks go through [`SteamFormat::verify_round_trip`].
pub fn assert_round_trip<T>(original: &T)
where
    T: SteamFormat + PartialEq + Debug,
{
    let data = original.build().unwrap();
    let parsed = T::parse(&data).unwrap();
    assert_eq!(original, &parsed, "{} bytes did not parse back", data.len());
}

/// Little-endian encoding of a run of u32 fields
pub fn le_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
