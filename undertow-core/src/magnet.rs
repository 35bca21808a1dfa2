//! Magnet link parsing utilities

use crate::engine::{EngineError, InfoHash};

/// Fields of a magnet link that the session layer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
}

/// Parses magnet link to extract torrent information.
///
/// Accepts `xt=urn:btih:` hashes in 40-character hex or 32-character base32
/// form.
///
/// # Errors
/// - `EngineError::InvalidDescriptor` - Malformed magnet URI or info hash
pub fn parse_magnet_link(magnet_url: &str) -> Result<MagnetLink, EngineError> {
    let url = url::Url::parse(magnet_url).map_err(|e| EngineError::InvalidDescriptor {
        reason: format!("Invalid magnet link: {e}"),
    })?;
    if url.scheme() != "magnet" {
        return Err(EngineError::InvalidDescriptor {
            reason: format!("Not a magnet link: {magnet_url}"),
        });
    }

    let mut info_hash = None;
    let mut display_name = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "xt" if info_hash.is_none() => {
                if let Some(hash) = value.strip_prefix("urn:btih:") {
                    info_hash = Some(parse_hash_from_string(hash)?);
                }
            }
            "dn" if display_name.is_none() => display_name = Some(value.into_owned()),
            _ => {}
        }
    }

    let info_hash = info_hash.ok_or_else(|| EngineError::InvalidDescriptor {
        reason: format!("Missing info hash in magnet link: {magnet_url}"),
    })?;

    Ok(MagnetLink {
        info_hash,
        display_name,
    })
}

/// Builds a minimal magnet URI for the given hash and display name.
pub fn magnet_uri(info_hash: InfoHash, display_name: &str) -> String {
    format!(
        "magnet:?xt=urn:btih:{info_hash}&dn={}",
        urlencoding::encode(display_name)
    )
}

fn parse_hash_from_string(hash_str: &str) -> Result<InfoHash, EngineError> {
    match hash_str.len() {
        40 => hash_str.to_ascii_lowercase().parse(),
        32 => decode_base32(hash_str)
            .map(InfoHash::new)
            .ok_or_else(|| EngineError::InvalidDescriptor {
                reason: format!("Invalid base32 info hash: {hash_str}"),
            }),
        len => Err(EngineError::InvalidDescriptor {
            reason: format!("Invalid hash length: {len} (expected 40 or 32)"),
        }),
    }
}

/// RFC 4648 base32 without padding; 32 characters decode to exactly 20 bytes.
fn decode_base32(input: &str) -> Option<[u8; 20]> {
    let mut out = [0u8; 20];
    let mut buffer: u64 = 0;
    let mut bits = 0;
    let mut pos = 0;

    for c in input.bytes() {
        let value = match c.to_ascii_uppercase() {
            c @ b'A'..=b'Z' => c - b'A',
            c @ b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out[pos] = (buffer >> bits) as u8;
            pos += 1;
        }
    }

    (pos == 20).then_some(out)
}
