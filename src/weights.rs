//! Weight store: network topology plus the flat trained-parameter array.
//!
//! The binary weight blob is the one external compatibility contract this
//! crate must honor exactly. It is a sequence of IEEE-754 32-bit
//! little-endian floats, laid out layer by layer in topology order. Within
//! each layer the kernel comes first, row-major as `units x inputs`, followed
//! by the bias (`units` floats). There is no padding and no alignment gap, so
//! the total element count is `sum(units_i * inputs_i + units_i)` where
//! `inputs_i` is the previous layer's unit count (the feature width for the
//! first layer). A blob that is even one element short or long is rejected.
//!
//! The topology itself arrives as a separate JSON structure descriptor, so
//! per-layer offsets are derived rather than hard-coded.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Version prefix for weight blob hashes. Bump when the layout changes.
const WEIGHTS_HASH_VERSION: &str = "v1";

/// Errors while retrieving or decoding the weight artifacts.
///
/// A load failure is fatal to the store but not to the process: the model
/// handle is simply left absent and every scoring call degrades to 0.
#[derive(Debug, Error)]
pub enum LoadError {
    /// An artifact could not be retrieved (transport error or non-2xx status).
    #[error("failed to retrieve weight artifact: {0}")]
    FetchFailed(String),

    /// An artifact was retrieved but could not be decoded: unparseable
    /// structure descriptor, blob byte length not a multiple of 4, or a
    /// weight count that does not match the declared topology.
    #[error("malformed weight artifact: {0}")]
    Malformed(String),
}

/// Per-layer activation declared by the structure descriptor.
///
/// The final sigmoid+scale calibration is *not* part of this table; the
/// engine applies it unconditionally after the last layer (see
/// [`crate::infer::score`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    #[default]
    None,
}

/// One dense layer as declared by the structure descriptor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Output width of the layer.
    pub units: usize,
    /// Activation hint; absent means linear output.
    #[serde(default)]
    pub activation: Activation,
}

/// Ordered layer description the weights were generated for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Model name from the descriptor (informational only).
    #[serde(default)]
    pub name: String,
    /// Feature width the first layer consumes.
    pub input_width: usize,
    /// Layers in evaluation order.
    pub layers: Vec<LayerSpec>,
}

impl Topology {
    /// Parse a structure descriptor from JSON bytes.
    pub fn parse(descriptor: &[u8]) -> Result<Self, LoadError> {
        let topology: Topology = serde_json::from_slice(descriptor)
            .map_err(|e| LoadError::Malformed(format!("structure descriptor: {e}")))?;
        topology.validate()?;
        Ok(topology)
    }

    fn validate(&self) -> Result<(), LoadError> {
        if self.input_width == 0 {
            return Err(LoadError::Malformed("input_width must be nonzero".into()));
        }
        if self.layers.is_empty() {
            return Err(LoadError::Malformed("topology has no layers".into()));
        }
        if let Some(idx) = self.layers.iter().position(|l| l.units == 0) {
            return Err(LoadError::Malformed(format!(
                "layer {idx} declares zero units"
            )));
        }
        Ok(())
    }

    /// Total number of floats the weight blob must contain.
    pub fn expected_len(&self) -> usize {
        let mut prev = self.input_width;
        let mut total = 0;
        for layer in &self.layers {
            total += layer.units * prev + layer.units;
            prev = layer.units;
        }
        total
    }

    /// Width of the final layer's output.
    pub fn output_width(&self) -> usize {
        self.layers.last().map(|l| l.units).unwrap_or(self.input_width)
    }
}

/// Immutable trained parameters plus the topology they were fit to.
///
/// Constructed once, never mutated, and safe to share across any number of
/// concurrent scoring calls.
#[derive(Debug, Clone)]
pub struct WeightStore {
    topology: Topology,
    weights: Vec<f32>,
    hash: String,
}

impl WeightStore {
    /// Decode a weight blob against its topology.
    ///
    /// All-or-nothing: any shape violation leaves no partial store behind.
    pub fn from_parts(topology: Topology, blob: &[u8]) -> Result<Self, LoadError> {
        topology.validate()?;

        if blob.len() % 4 != 0 {
            return Err(LoadError::Malformed(format!(
                "weight blob is {} bytes, not a multiple of 4",
                blob.len()
            )));
        }

        let weights: Vec<f32> = blob
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let expected = topology.expected_len();
        if weights.len() != expected {
            return Err(LoadError::Malformed(format!(
                "weight count {} does not match topology (expected {})",
                weights.len(),
                expected
            )));
        }

        let hash = hash_blob(blob);
        Ok(Self {
            topology,
            weights,
            hash,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Number of trained parameters.
    pub fn param_count(&self) -> usize {
        self.weights.len()
    }

    /// `sha256:`-prefixed digest of the raw blob, for logging and version
    /// pinning in health endpoints.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

fn hash_blob(blob: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(WEIGHTS_HASH_VERSION.as_bytes());
    hasher.update(blob);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_topology() -> Topology {
        Topology {
            name: "phishing-net".into(),
            input_width: 6,
            layers: vec![
                LayerSpec {
                    units: 16,
                    activation: Activation::Relu,
                },
                LayerSpec {
                    units: 8,
                    activation: Activation::Relu,
                },
                LayerSpec {
                    units: 1,
                    activation: Activation::None,
                },
            ],
        }
    }

    fn blob_of_zeros(floats: usize) -> Vec<u8> {
        vec![0u8; floats * 4]
    }

    #[test]
    fn test_expected_len_standard_topology() {
        // 6*16+16 + 16*8+8 + 8*1+1
        assert_eq!(standard_topology().expected_len(), 257);
    }

    #[test]
    fn test_descriptor_round_trip() {
        let json = r#"{
            "name": "phishing-net",
            "input_width": 6,
            "layers": [
                {"units": 16, "activation": "relu"},
                {"units": 8, "activation": "relu"},
                {"units": 1}
            ]
        }"#;
        let topology = Topology::parse(json.as_bytes()).unwrap();
        assert_eq!(topology.input_width, 6);
        assert_eq!(topology.layers.len(), 3);
        assert_eq!(topology.layers[0].activation, Activation::Relu);
        assert_eq!(topology.layers[2].activation, Activation::None);
        assert_eq!(topology.expected_len(), 257);
    }

    #[test]
    fn test_descriptor_rejects_garbage() {
        let err = Topology::parse(b"not json at all").unwrap_err();
        assert!(matches!(err, LoadError::Malformed(_)));
    }

    #[test]
    fn test_descriptor_rejects_empty_layers() {
        let err = Topology::parse(br#"{"input_width": 6, "layers": []}"#).unwrap_err();
        assert!(matches!(err, LoadError::Malformed(_)));
    }

    #[test]
    fn test_store_accepts_exact_blob() {
        let topology = standard_topology();
        let blob = blob_of_zeros(topology.expected_len());
        let store = WeightStore::from_parts(topology, &blob).unwrap();
        assert_eq!(store.param_count(), 257);
        assert!(store.hash().starts_with("sha256:"));
    }

    #[test]
    fn test_store_rejects_short_blob() {
        let topology = standard_topology();
        let blob = blob_of_zeros(topology.expected_len() - 1);
        let err = WeightStore::from_parts(topology, &blob).unwrap_err();
        assert!(matches!(err, LoadError::Malformed(_)));
    }

    #[test]
    fn test_store_rejects_long_blob() {
        let topology = standard_topology();
        let blob = blob_of_zeros(topology.expected_len() + 1);
        let err = WeightStore::from_parts(topology, &blob).unwrap_err();
        assert!(matches!(err, LoadError::Malformed(_)));
    }

    #[test]
    fn test_store_rejects_unaligned_blob() {
        let topology = standard_topology();
        let mut blob = blob_of_zeros(topology.expected_len());
        blob.push(0); // byte length no longer divisible by 4
        let err = WeightStore::from_parts(topology, &blob).unwrap_err();
        assert!(matches!(err, LoadError::Malformed(_)));
    }

    #[test]
    fn test_blob_decodes_little_endian() {
        let topology = Topology {
            name: String::new(),
            input_width: 1,
            layers: vec![LayerSpec {
                units: 1,
                activation: Activation::None,
            }],
        };
        // kernel = [1.5], bias = [-2.0]
        let mut blob = Vec::new();
        blob.extend_from_slice(&1.5f32.to_le_bytes());
        blob.extend_from_slice(&(-2.0f32).to_le_bytes());
        let store = WeightStore::from_parts(topology, &blob).unwrap();
        assert_eq!(store.weights(), &[1.5, -2.0]);
    }

    #[test]
    fn test_hash_deterministic() {
        let topology = standard_topology();
        let blob = blob_of_zeros(topology.expected_len());
        let a = WeightStore::from_parts(topology.clone(), &blob).unwrap();
        let b = WeightStore::from_parts(topology, &blob).unwrap();
        assert_eq!(a.hash(), b.hash());
    }
}
