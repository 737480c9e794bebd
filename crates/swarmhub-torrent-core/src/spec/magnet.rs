//! Magnet URIs to [`TorrentSpec`].

use url::Url;

use crate::error::{TorrentError, TorrentResult};
use crate::model::{InfoHash, TorrentSpec};

const BTIH_PREFIX: &str = "urn:btih:";

pub(crate) fn parse(uri: &str) -> TorrentResult<TorrentSpec> {
    let url = Url::parse(uri.trim()).map_err(|_| TorrentError::InvalidMagnet {
        reason: "malformed_uri",
    })?;
    if url.scheme() != "magnet" {
        return Err(TorrentError::InvalidMagnet {
            reason: "not_a_magnet_uri",
        });
    }

    let mut info_hash = None;
    let mut spec_name = None;
    let mut trackers = Vec::new();
    let mut web_seeds = Vec::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if let Some(encoded) = value.strip_prefix(BTIH_PREFIX) {
                    info_hash = Some(decode_btih(encoded)?);
                }
            }
            "dn" if !value.is_empty() => spec_name = Some(value.into_owned()),
            "tr" if !value.is_empty() => trackers.push(vec![value.into_owned()]),
            "ws" if !value.is_empty() => web_seeds.push(value.into_owned()),
            _ => {}
        }
    }

    let info_hash = info_hash.ok_or(TorrentError::InvalidMagnet {
        reason: "missing_btih",
    })?;
    Ok(TorrentSpec {
        display_name: spec_name,
        trackers,
        web_seeds,
        ..TorrentSpec::from_hash(info_hash)
    })
}

fn decode_btih(encoded: &str) -> TorrentResult<InfoHash> {
    match encoded.len() {
        40 => InfoHash::from_hex(encoded),
        32 => decode_base32(encoded)
            .map(InfoHash::from_bytes)
            .ok_or(TorrentError::InvalidMagnet {
                reason: "invalid_base32_hash",
            }),
        _ => Err(TorrentError::InvalidMagnet {
            reason: "invalid_hash_length",
        }),
    }
}

/// RFC 4648 base32 (no padding) of exactly 20 bytes.
fn decode_base32(encoded: &str) -> Option<[u8; 20]> {
    let mut out = [0_u8; 20];
    let mut buffer: u64 = 0;
    let mut bits = 0_u32;
    let mut written = 0;
    for byte in encoded.bytes() {
        let symbol = match byte.to_ascii_uppercase() {
            upper @ b'A'..=b'Z' => upper - b'A',
            digit @ b'2'..=b'7' => digit - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(symbol);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            *out.get_mut(written)? = u8::try_from((buffer >> bits) & 0xFF).ok()?;
            written += 1;
            buffer &= (1 << bits) - 1;
        }
    }
    (written == out.len()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

    #[test]
    fn parses_hex_magnet_with_name_and_trackers() -> TorrentResult<()> {
        let uri = format!(
            "magnet:?xt=urn:btih:{HEX}&dn=Sintel&tr=udp%3A%2F%2Fexplodie.org%3A6969&tr=wss%3A%2F%2Ftracker.btorrent.xyz&ws=https%3A%2F%2Fseed.example%2F"
        );
        let spec = parse(&uri)?;
        assert_eq!(spec.info_hash.to_hex(), HEX);
        assert_eq!(spec.display_name.as_deref(), Some("Sintel"));
        assert_eq!(
            spec.trackers,
            vec![
                vec!["udp://explodie.org:6969".to_string()],
                vec!["wss://tracker.btorrent.xyz".to_string()]
            ]
        );
        assert_eq!(spec.web_seeds, vec!["https://seed.example/".to_string()]);
        assert!(spec.metadata.is_none());
        Ok(())
    }

    #[test]
    fn parses_base32_hash() -> TorrentResult<()> {
        let spec = parse("magnet:?xt=urn:btih:ZHQVOY7XELZD5GFCTXWN7LRUDOMNKMCW")?;
        assert_eq!(spec.info_hash.to_hex(), HEX);
        let lower = parse("magnet:?xt=urn:btih:zhqvoy7xelzd5gfctxwn7lrudomnkmcw")?;
        assert_eq!(lower.info_hash, spec.info_hash);
        Ok(())
    }

    #[test]
    fn rejects_bad_magnets() {
        for uri in [
            "",
            "http://example.com/?xt=urn:btih:c9e15763f722f23e98a29decdfae341b98d53056",
            "magnet:?dn=nohash",
            "magnet:?xt=urn:btih:1234",
            "magnet:?xt=urn:btih:ZHQVOY7XELZD5GFCTXWN7LRUDOMNKMC1",
        ] {
            assert!(parse(uri).is_err(), "{uri} should be rejected");
        }
    }
}
