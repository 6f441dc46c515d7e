//! Multilayer perceptron.
mod base;
mod config;
mod mlp2;
use anyhow::Result;
pub use base::Mlp;
use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};
pub use config::MlpConfig;
pub use mlp2::Mlp2;

/// Returns linear layers `in_dim -> units[0] -> ... -> units[n - 1]`.
fn create_linear_layers(vs: VarBuilder, in_dim: i64, units: &[i64]) -> Result<Vec<Linear>> {
    let mut layers = vec![];
    let mut in_dim = in_dim;
    for (i, &out_dim) in units.iter().enumerate() {
        layers.push(linear(in_dim as _, out_dim as _, vs.pp(format!("ln{}", i)))?);
        in_dim = out_dim;
    }
    Ok(layers)
}

/// Applies the layers with ReLU activations between them.
///
/// The output of the last layer is activated only if `relu_out` is `true`.
fn mlp_forward(xs: Tensor, layers: &[Linear], relu_out: bool) -> Result<Tensor> {
    let n_layers = layers.len();
    let mut xs = xs;

    for (i, layer) in layers.iter().enumerate() {
        xs = layer.forward(&xs)?;
        if i + 1 < n_layers || relu_out {
            xs = xs.relu()?;
        }
    }

    Ok(xs)
}
