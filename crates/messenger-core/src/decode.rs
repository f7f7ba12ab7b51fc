//! Ordered-trial decoding of loosely typed JSON payloads.
//!
//! The backend sends attachments and thread actions without a reliable
//! discriminant. A [`VariantDecoder`] holds an ordered list of candidate
//! shapes; the first one that accepts the payload wins. Callers list rare,
//! specific shapes before broad ones.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Why a candidate shape rejected a payload.
#[derive(Debug, Error)]
pub enum ShapeMismatch {
    /// Missing fields or fields of the wrong JSON type.
    #[error("structure mismatch: {0}")]
    Structure(#[from] serde_json::Error),
    /// The payload names a different variant.
    #[error("expected discriminant '{expected}', found '{found}'")]
    Discriminant {
        expected: &'static str,
        found: String,
    },
}

impl ShapeMismatch {
    /// Check a discriminant against the accepted values.
    pub fn expect_tag(found: &str, accepted: &[&'static str]) -> Result<(), ShapeMismatch> {
        if accepted.contains(&found) {
            return Ok(());
        }
        Err(ShapeMismatch::Discriminant {
            expected: accepted.first().copied().unwrap_or_default(),
            found: found.to_owned(),
        })
    }
}

/// One typed wire shape a payload may take.
///
/// `validate` only checks structure and discriminants; it never rejects a
/// payload for internally inconsistent values.
pub trait WireShape: DeserializeOwned {
    type Output;

    fn validate(&self) -> Result<(), ShapeMismatch>;

    fn into_output(self) -> Self::Output;
}

type Candidate<T> = Box<dyn Fn(&Value) -> Result<T, ShapeMismatch> + Send + Sync>;

/// Ordered list of candidate shapes producing a `T`.
pub struct VariantDecoder<T> {
    candidates: Vec<(&'static str, Candidate<T>)>,
}

impl<T> Default for VariantDecoder<T> {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }
}

impl<T> std::fmt::Debug for VariantDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantDecoder")
            .field(
                "candidates",
                &self.candidates.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: 'static> VariantDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shape; it is tried after every shape added before it.
    pub fn shape<S>(self, name: &'static str) -> Self
    where
        S: WireShape + 'static,
        S::Output: Into<T>,
    {
        self.candidate(name, |raw| {
            let shape = S::deserialize(raw)?;
            shape.validate()?;
            Ok(shape.into_output().into())
        })
    }

    /// Append an arbitrary validator/constructor pair.
    pub fn candidate<F>(mut self, name: &'static str, decode: F) -> Self
    where
        F: Fn(&Value) -> Result<T, ShapeMismatch> + Send + Sync + 'static,
    {
        self.candidates.push((name, Box::new(decode)));
        self
    }

    /// Return the first accepted value, or `None` when nothing matched.
    pub fn decode(&self, raw: &Value) -> Option<T> {
        for (name, candidate) in &self.candidates {
            match candidate(raw) {
                Ok(value) => return Some(value),
                Err(err) => tracing::trace!(shape = *name, %err, "shape rejected payload"),
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
