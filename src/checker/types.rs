//! Core value types shared by the check loop components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Content hash identifying one processable item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ItemKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Auxiliary fields staged for an item until its batch is committed
///
/// Values are already in their persisted text form.
pub type PendingInfoRecord = BTreeMap<String, String>;

/// Identity of one extraction pipeline configuration
///
/// Scopes the claimed-marker columns and the update sequence counter, so the same
/// item is tracked independently per featurizer/detector/input combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineFingerprint {
    pub featurizer_type: String,
    pub detector_type: String,
    pub input_type: String,
}

impl PipelineFingerprint {
    pub fn new(featurizer_type: &str, detector_type: &str, input_type: &str) -> Self {
        Self {
            featurizer_type: featurizer_type.to_string(),
            detector_type: detector_type.to_string(),
            input_type: input_type.to_string(),
        }
    }

    /// Worker pretty-name used as the `worker` field of every log line
    pub fn pretty_name(&self, discriminator: Option<&str>) -> String {
        let base = format!(
            "ExtractionChecker{}-feat-{}-{}",
            self.featurizer_type, self.detector_type, self.input_type
        );
        match discriminator {
            Some(discriminator) => format!("{base}.{discriminator}"),
            None => base,
        }
    }
}

impl fmt::Display for PipelineFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_feat_{}_{}",
            self.featurizer_type, self.detector_type, self.input_type
        )
    }
}

/// How the assembler treats a candidate whose staged record has disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyMode {
    /// Concurrent workers: a missing record means another worker won the race, drop the key
    Daemon,
    /// Lone worker: every checked key is pushed, with an empty info payload if needed
    Single,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_display() {
        let fingerprint = PipelineFingerprint::new("sbpycaffeimg", "dlibface", "face");
        assert_eq!(fingerprint.to_string(), "sbpycaffeimg_feat_dlibface_face");
        assert_eq!(
            fingerprint.pretty_name(Some("ec4242w1")),
            "ExtractionCheckersbpycaffeimg-feat-dlibface-face.ec4242w1"
        );
    }

    #[test]
    fn test_item_key_serializes_as_plain_string() {
        let key = ItemKey::from("0a1b2c");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"0a1b2c\"");
    }
}
