//! Wire types of the repository contents API and the encoding of the
//! snapshot document inside them.

use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use domain::models::RankingSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ContentsResponse {
    pub sha: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ContentsResponse {
    /// The document bytes, if the API inlined them. Large files come back with
    /// an empty body (encoding `none`) and have to be fetched separately.
    pub fn inline_document(&self) -> anyhow::Result<Option<Vec<u8>>> {
        match self.encoding.as_deref() {
            Some("base64") if !self.content.is_empty() => {
                // the API wraps the payload at 60 columns
                let compact: String = self
                    .content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                Ok(Some(B64.decode(compact)?))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateContentsRequest<'a> {
    pub message: &'a str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
    pub branch: &'a str,
}

pub fn encode_document(snapshot: &RankingSnapshot) -> anyhow::Result<String> {
    Ok(B64.encode(serde_json::to_vec_pretty(snapshot)?))
}

pub fn decode_document(document: &[u8]) -> anyhow::Result<RankingSnapshot> {
    if document.iter().all(u8::is_ascii_whitespace) {
        return Ok(RankingSnapshot::default());
    }

    serde_json::from_slice(document).map_err(|e| anyhow!("snapshot document is malformed: {e}"))
}

#[cfg(test)]
mod test {
    use super::*;
    use domain::models::{PlayerIdentifier, Rating};

    const DOCUMENT: &str = r#"{
  "records": {
    "1111-2222-3333": {
      "fc": "1111-2222-3333",
      "ev": 8000,
      "banned": false,
      "lastupdated": 1700000000000,
      "name": "Player"
    }
  },
  "last_refresh": 1700000000000
}"#;

    #[test]
    fn decodes_wrapped_base64_content() {
        let encoded = B64.encode(DOCUMENT);
        let wrapped = encoded
            .as_bytes()
            .chunks(60)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let response = ContentsResponse {
            sha: "abc123".into(),
            content: wrapped,
            encoding: Some("base64".into()),
            download_url: None,
        };

        let snapshot = decode_document(&response.inline_document().unwrap().unwrap()).unwrap();
        let record = snapshot
            .get(&PlayerIdentifier::from_string("1111-2222-3333").unwrap())
            .unwrap();

        assert_eq!(record.rating, Rating::new(8000));
        assert!(snapshot.last_refresh_at.is_some());
    }

    #[test]
    fn large_files_are_not_inlined() {
        let response: ContentsResponse = serde_json::from_str(
            r#"{ "sha": "abc123", "content": "", "encoding": "none", "download_url": "https://raw.local/players.json" }"#,
        )
        .unwrap();

        assert!(response.inline_document().unwrap().is_none());
    }

    #[test]
    fn encoded_document_reads_back_unchanged() {
        let snapshot = decode_document(DOCUMENT.as_bytes()).unwrap();
        let encoded = encode_document(&snapshot).unwrap();

        assert_eq!(decode_document(&B64.decode(encoded).unwrap()).unwrap(), snapshot);
    }

    #[test]
    fn flat_document_keeps_every_player() {
        let snapshot = decode_document(
            br#"{
  "1111-2222-3333": { "fc": "1111-2222-3333", "ev": 8000, "banned": false, "lastupdated": 1700000000000 },
  "last_refresh": 1700000000000
}"#,
        )
        .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot
                .get(&PlayerIdentifier::from_string("1111-2222-3333").unwrap())
                .unwrap()
                .rating,
            Rating::new(8000)
        );
    }

    #[test]
    fn one_odd_record_does_not_spoil_the_document() {
        let snapshot = decode_document(
            br#"{
  "records": {
    "1111-2222-3333": { "fc": "1111-2222-3333", "ev": 2000000, "lastupdated": 1700000000000 },
    "4444-5555-6666": { "fc": "4444-5555-6666", "ev": 8000 }
  }
}"#,
        )
        .unwrap();

        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn unrecognized_layout_is_an_error() {
        assert!(decode_document(br#"{ "records": {}, "players": [] }"#).is_err());
        assert!(decode_document(br#"{ "1111-2222-3333": 8000 }"#).is_err());
    }

    #[test]
    fn empty_document_is_an_empty_snapshot() {
        assert_eq!(decode_document(b"\n").unwrap(), RankingSnapshot::default());
    }

    #[test]
    fn update_request_omits_sha_when_creating() {
        let request = UpdateContentsRequest {
            message: "Refresh player rankings",
            content: String::new(),
            sha: None,
            branch: "main",
        };

        assert!(serde_json::to_value(&request).unwrap().get("sha").is_none());
    }
}
