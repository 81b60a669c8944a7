use encoding_rs::{Encoding, REPLACEMENT, UTF_8, WINDOWS_1252};
use std::fmt;

/// Ordered, de-duplicated list of encodings to try when opening a file.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodingCandidates(Vec<&'static Encoding>);

impl fmt::Debug for EncodingCandidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// `latin1`, `iso-8859-1` and `cp1252` all resolve to the windows-1252 decoder.
impl Default for EncodingCandidates {
    fn default() -> Self {
        Self(vec![UTF_8, WINDOWS_1252])
    }
}

impl EncodingCandidates {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, String> {
        let mut encodings: Vec<&'static Encoding> = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            let encoding = Encoding::for_label(label.trim().as_bytes())
                .filter(|enc| *enc != REPLACEMENT)
                .ok_or_else(|| format!("unknown encoding label '{}'", label))?;
            if !encodings.contains(&encoding) {
                encodings.push(encoding);
            }
        }

        if encodings.is_empty() {
            return Err("at least one encoding must be configured".to_string());
        }
        Ok(Self(encodings))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|enc| enc.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static Encoding> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug)]
pub struct DecodedInput {
    pub text: String,
    pub encoding: &'static Encoding,
}

/// Every candidate produced malformed sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingExhausted {
    pub tried: Vec<String>,
}

/// Decodes `bytes` with the first candidate that yields no malformed
/// sequences. Never substitutes replacement characters.
pub fn decode_with_candidates(
    bytes: &[u8],
    candidates: &EncodingCandidates,
) -> Result<DecodedInput, EncodingExhausted> {
    let mut tried = Vec::new();

    for encoding in candidates.iter() {
        let body = match Encoding::for_bom(bytes) {
            Some((bom_encoding, bom_len)) if bom_encoding == encoding => &bytes[bom_len..],
            _ => bytes,
        };

        match encoding.decode_without_bom_handling_and_without_replacement(body) {
            Some(text) => {
                tracing::debug!("Decoded {} bytes as {}", bytes.len(), encoding.name());
                return Ok(DecodedInput {
                    text: text.into_owned(),
                    encoding,
                });
            }
            None => {
                tracing::debug!("Input is not valid {}, trying next candidate", encoding.name());
                tried.push(encoding.name().to_string());
            }
        }
    }

    Err(EncodingExhausted { tried })
}
