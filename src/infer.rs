//! Forward pass: feature vector in, calibrated risk score out.
//!
//! One generic evaluation routine serves both the URL branch and the page
//! branch; the branches differ only in which feature encoding they feed in.
//! The pass is a pure function of (features, store), so identical inputs
//! produce bit-identical floats and snapshot tests are meaningful.

use eyre::Result;
use tracing::debug;

use crate::loader::ModelHandle;
use crate::weights::{Activation, WeightStore};

/// Evaluate the network over a feature vector and return a score in [0, 100].
///
/// A width mismatch between the features and the topology's input width is a
/// version-skew bug between the extractor and the weight artifacts; it is
/// rejected before any arithmetic runs. Layers are evaluated strictly in
/// topology order, the offset into the flat weight array advancing by exactly
/// `units * prev + units` floats per layer.
///
/// The declared activations cover the hidden layers; after the final layer
/// the raw logit is unconditionally passed through a sigmoid and scaled by
/// 100. That calibration step is fixed engine behavior, not part of the
/// per-layer activation table.
pub fn score(features: &[f32], store: &WeightStore) -> Result<f32> {
    let topology = store.topology();
    if features.len() != topology.input_width {
        eyre::bail!(
            "feature width {} does not match topology input width {}",
            features.len(),
            topology.input_width
        );
    }

    let weights = store.weights();
    let mut input = features.to_vec();
    let mut offset = 0;

    for layer in &topology.layers {
        let prev = input.len();
        let kernel_len = layer.units * prev;
        let kernel = &weights[offset..offset + kernel_len];
        let bias = &weights[offset + kernel_len..offset + kernel_len + layer.units];
        offset += kernel_len + layer.units;

        let mut output = Vec::with_capacity(layer.units);
        for i in 0..layer.units {
            let mut sum = bias[i];
            for j in 0..prev {
                sum += input[j] * kernel[i * prev + j];
            }
            output.push(match layer.activation {
                Activation::Relu => sum.max(0.0),
                Activation::Sigmoid => sigmoid(sum),
                Activation::None => sum,
            });
        }
        input = output;
    }

    // Calibration: raw logit -> percentage.
    let logit = input[0];
    Ok(sigmoid(logit) * 100.0)
}

/// Score against a possibly-absent store.
///
/// A missing store is an expected runtime condition (load still in flight, or
/// load failed): the call degrades to 0 — "no risk signal" — rather than
/// erroring or blocking. A width mismatch still propagates as an error.
pub fn score_or_zero(features: &[f32], handle: &ModelHandle) -> Result<f32> {
    match handle.get() {
        Some(store) => score(features, store),
        None => {
            debug!("weight store absent, degrading to score 0");
            Ok(0.0)
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{LayerSpec, Topology};

    fn store_from_floats(topology: Topology, floats: &[f32]) -> WeightStore {
        let blob: Vec<u8> = floats.iter().flat_map(|f| f.to_le_bytes()).collect();
        WeightStore::from_parts(topology, &blob).unwrap()
    }

    fn identity_1x1(kernel: f32, bias: f32) -> WeightStore {
        let topology = Topology {
            name: String::new(),
            input_width: 1,
            layers: vec![LayerSpec {
                units: 1,
                activation: Activation::None,
            }],
        };
        store_from_floats(topology, &[kernel, bias])
    }

    #[test]
    fn test_single_unit_logit_path() {
        // logit = 1.0 * x + 0.0, score = sigmoid(x) * 100
        let store = identity_1x1(1.0, 0.0);
        let score_zero = score(&[0.0], &store).unwrap();
        assert!((score_zero - 50.0).abs() < 1e-4);

        let score_pos = score(&[10.0], &store).unwrap();
        assert!(score_pos > 99.0);

        let score_neg = score(&[-10.0], &store).unwrap();
        assert!(score_neg < 1.0);
    }

    #[test]
    fn test_bias_applied_before_activation() {
        // Two layers: relu(2x - 1) then identity.
        let topology = Topology {
            name: String::new(),
            input_width: 1,
            layers: vec![
                LayerSpec {
                    units: 1,
                    activation: Activation::Relu,
                },
                LayerSpec {
                    units: 1,
                    activation: Activation::None,
                },
            ],
        };
        let store = store_from_floats(topology, &[2.0, -1.0, 1.0, 0.0]);

        // x = 0: relu(-1) = 0, logit 0 -> 50.
        assert!((score(&[0.0], &store).unwrap() - 50.0).abs() < 1e-4);
        // x = 1: relu(1) = 1, logit 1 -> sigmoid(1)*100.
        let expected = 100.0 / (1.0 + (-1.0f32).exp());
        assert!((score(&[1.0], &store).unwrap() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_kernel_is_row_major_units_by_inputs() {
        // 2 inputs -> 2 units, no activation, then a summing output unit.
        // kernel rows: unit0 = [1, 0], unit1 = [0, 1]; the output unit weighs
        // them [1, -1], so logit = x0 - x1.
        let topology = Topology {
            name: String::new(),
            input_width: 2,
            layers: vec![
                LayerSpec {
                    units: 2,
                    activation: Activation::None,
                },
                LayerSpec {
                    units: 1,
                    activation: Activation::None,
                },
            ],
        };
        let store = store_from_floats(
            topology,
            &[
                1.0, 0.0, // unit 0 kernel row
                0.0, 1.0, // unit 1 kernel row
                0.0, 0.0, // layer 0 bias
                1.0, -1.0, // output kernel
                0.0, // output bias
            ],
        );

        // x0 == x1 -> logit 0 -> 50
        assert!((score(&[3.0, 3.0], &store).unwrap() - 50.0).abs() < 1e-4);
        // x0 > x1 -> positive logit
        assert!(score(&[5.0, 0.0], &store).unwrap() > 50.0);
        // x0 < x1 -> negative logit
        assert!(score(&[0.0, 5.0], &store).unwrap() < 50.0);
    }

    #[test]
    fn test_width_mismatch_rejected_before_arithmetic() {
        let store = identity_1x1(1.0, 0.0);
        assert!(score(&[1.0, 2.0], &store).is_err());
        assert!(score(&[], &store).is_err());
    }

    #[test]
    fn test_score_saturates_in_range() {
        let store = identity_1x1(1000.0, 0.0);
        for x in [-1e6f32, -100.0, -1.0, 0.0, 1.0, 100.0, 1e6] {
            let s = score(&[x], &store).unwrap();
            assert!((0.0..=100.0).contains(&s), "score {s} out of range for {x}");
        }
    }

    #[test]
    fn test_score_deterministic() {
        let store = identity_1x1(0.37, -0.11);
        let a = score(&[4.2], &store).unwrap();
        let b = score(&[4.2], &store).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_absent_store_degrades_to_zero() {
        let handle = ModelHandle::empty();
        assert_eq!(score_or_zero(&[1.0, 2.0, 3.0], &handle).unwrap(), 0.0);
    }

    #[test]
    fn test_loaded_handle_scores_through() {
        let handle = ModelHandle::with_store(identity_1x1(1.0, 0.0));
        let s = score_or_zero(&[0.0], &handle).unwrap();
        assert!((s - 50.0).abs() < 1e-4);
    }
}
