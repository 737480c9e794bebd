//! Metainfo (`.torrent`) documents to [`TorrentSpec`].

use std::collections::BTreeMap;

use sha1::{Digest, Sha1};

use super::bencode::{self, Value};
use crate::error::MetainfoError;
use crate::model::{InfoHash, SpecMetadata, TorrentFile, TorrentSpec};

type Dict = BTreeMap<Vec<u8>, Value>;

pub(crate) fn parse(input: &[u8]) -> Result<TorrentSpec, MetainfoError> {
    let decoded = bencode::decode(input)?;
    let root = decoded
        .value
        .as_dict()
        .ok_or(MetainfoError::InvalidField { field: "root" })?;
    let span = decoded
        .info_span
        .ok_or(MetainfoError::MissingField { field: "info" })?;
    let info = field(root, "info")
        .and_then(Value::as_dict)
        .ok_or(MetainfoError::InvalidField { field: "info" })?;

    let mut digest = [0_u8; InfoHash::LEN];
    digest.copy_from_slice(&Sha1::digest(&input[span]));

    let name = text(info, "name.utf-8")
        .or_else(|| text(info, "name"))
        .ok_or(MetainfoError::MissingField { field: "name" })?;
    let piece_length = field(info, "piece length")
        .and_then(Value::as_int)
        .and_then(|value| u64::try_from(value).ok())
        .filter(|value| *value > 0)
        .ok_or(MetainfoError::InvalidField {
            field: "piece length",
        })?;
    let files = files(info, &name)?;

    Ok(TorrentSpec {
        info_hash: InfoHash::from_bytes(digest),
        display_name: None,
        trackers: trackers(root),
        web_seeds: web_seeds(root),
        metadata: Some(SpecMetadata {
            name,
            piece_length,
            files,
        }),
    })
}

fn field<'a>(dict: &'a Dict, key: &str) -> Option<&'a Value> {
    dict.get(key.as_bytes())
}

fn text(dict: &Dict, key: &str) -> Option<String> {
    field(dict, key).and_then(Value::as_text)
}

fn length(value: Option<&Value>) -> Result<u64, MetainfoError> {
    value
        .and_then(Value::as_int)
        .and_then(|raw| u64::try_from(raw).ok())
        .ok_or(MetainfoError::InvalidField { field: "length" })
}

fn files(info: &Dict, name: &str) -> Result<Vec<TorrentFile>, MetainfoError> {
    let Some(entries) = field(info, "files") else {
        return Ok(vec![TorrentFile {
            path: name.to_string(),
            length: length(field(info, "length"))?,
        }]);
    };

    let entries = entries
        .as_list()
        .ok_or(MetainfoError::InvalidField { field: "files" })?;
    entries
        .iter()
        .map(|entry| {
            let entry = entry
                .as_dict()
                .ok_or(MetainfoError::InvalidField { field: "files" })?;
            let segments = field(entry, "path.utf-8")
                .or_else(|| field(entry, "path"))
                .and_then(Value::as_list)
                .ok_or(MetainfoError::InvalidField { field: "path" })?;
            let segments = segments
                .iter()
                .map(|segment| {
                    segment
                        .as_text()
                        .ok_or(MetainfoError::InvalidField { field: "path" })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if segments.is_empty() {
                return Err(MetainfoError::InvalidField { field: "path" });
            }
            Ok(TorrentFile {
                path: format!("{name}/{}", segments.join("/")),
                length: length(field(entry, "length"))?,
            })
        })
        .collect()
}

fn trackers(root: &Dict) -> Vec<Vec<String>> {
    let tiers: Vec<Vec<String>> = field(root, "announce-list")
        .and_then(Value::as_list)
        .map(|tiers| {
            tiers
                .iter()
                .filter_map(Value::as_list)
                .map(|tier| tier.iter().filter_map(Value::as_text).collect::<Vec<_>>())
                .filter(|tier| !tier.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if !tiers.is_empty() {
        return tiers;
    }
    text(root, "announce")
        .filter(|announce| !announce.is_empty())
        .map(|announce| vec![vec![announce]])
        .unwrap_or_default()
}

fn web_seeds(root: &Dict) -> Vec<String> {
    match field(root, "url-list") {
        Some(Value::List(items)) => items.iter().filter_map(Value::as_text).collect(),
        Some(value) => value.as_text().into_iter().collect(),
        None => Vec::new(),
    }
}
