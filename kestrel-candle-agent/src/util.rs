//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor, Var};
use candle_nn::VarMap;
use kestrel_core::error::RlError;
use log::{trace, warn};
use std::{collections::HashMap, sync::MutexGuard};

/// Names of running-statistics buffers, e.g. of batch normalization layers.
///
/// Variables whose last name component is one of these are not trained by
/// gradients: they are excluded from optimizers and copied as they are in
/// [`polyak_update`].
pub const BUFFER_NAMES: [&str; 3] = ["running_mean", "running_var", "num_batches_tracked"];

/// Returns `true` if the variable is a running-statistics buffer.
pub fn is_buffer(name: &str) -> bool {
    let last = name.rsplit('.').next().unwrap_or(name);
    BUFFER_NAMES.contains(&last)
}

fn lock(varmap: &VarMap) -> Result<MutexGuard<'_, HashMap<String, Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|e| anyhow!("Failed to lock variables: {}", e))
}

/// Returns the variables of a [`VarMap`] sorted by name.
pub fn named_vars(varmap: &VarMap) -> Result<Vec<(String, Var)>> {
    let mut vars = lock(varmap)?
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<Vec<_>>();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vars)
}

/// Returns the variables trained by gradients, sorted by name.
pub fn trainable_vars(varmap: &VarMap) -> Result<Vec<(String, Var)>> {
    Ok(named_vars(varmap)?
        .into_iter()
        .filter(|(k, _)| !is_buffer(k))
        .collect())
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    soft_update(dest, src, |_| tau)
}

/// Polyak update of a target network.
///
/// Trainable variables are updated with `tau`, running-statistics buffers
/// are copied, i.e. updated with `1.0`.
pub fn polyak_update(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    soft_update(dest, src, |name| if is_buffer(name) { 1.0 } else { tau })
}

fn soft_update(dest: &VarMap, src: &VarMap, tau_of: impl Fn(&str) -> f64) -> Result<()> {
    trace!("soft_update");
    let dest = lock(dest)?;
    let src = lock(src)?;

    for (k_dest, v_dest) in dest.iter() {
        let v_src = src
            .get(k_dest)
            .ok_or_else(|| anyhow!("Variable {} is missing in the source", k_dest))?;
        let tau = tau_of(k_dest);
        let t_src = v_src.as_tensor();
        let t_dest = v_dest.as_tensor();
        let t_dest = ((tau * t_src)? + ((1.0 - tau) * t_dest)?)?;
        v_dest.set(&t_dest)?;
    }

    Ok(())
}

/// Copies the values of all variables, keyed by name.
pub fn export_vars(varmap: &VarMap) -> Result<Vec<(String, Tensor)>> {
    named_vars(varmap)?
        .into_iter()
        .map(|(k, v)| -> Result<(String, Tensor)> { Ok((k, v.as_tensor().copy()?)) })
        .collect()
}

/// Sets variables from tensors keyed by name.
///
/// Variables without a tensor are left unchanged. Tensors without a
/// variable are ignored with a warning.
pub fn import_vars(varmap: &VarMap, tensors: &HashMap<String, Tensor>) -> Result<()> {
    let vars = lock(varmap)?;
    for (k, t) in tensors.iter() {
        match vars.get(k) {
            Some(var) => {
                let t = t.to_device(var.device())?.to_dtype(var.dtype())?;
                var.set(&t)?;
            }
            None => warn!("Ignored unknown variable {}", k),
        }
    }
    Ok(())
}

/// Values whose computation graph can be dropped.
pub trait Detach {
    /// Returns the value detached from the computation graph.
    fn detached(self) -> Self;
}

impl Detach for Tensor {
    fn detached(self) -> Self {
        self.detach()
    }
}

impl<A: Detach, B: Detach> Detach for (A, B) {
    fn detached(self) -> Self {
        (self.0.detached(), self.1.detached())
    }
}

impl<T: Detach> Detach for Vec<T> {
    fn detached(self) -> Self {
        self.into_iter().map(Detach::detached).collect()
    }
}

/// Runs `f` in a scope whose results do not track gradients.
///
/// Tensors computed inside the closure may still be built from variables,
/// but the returned value is detached, so no gradient flows back through
/// it.
pub fn no_grad<T: Detach>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    Ok(f()?.detached())
}

/// Returns the value of a scalar loss, failing if it is NaN or infinite.
pub fn finite_loss(name: &str, loss: &Tensor) -> Result<f32> {
    let v = loss.to_dtype(candle_core::DType::F32)?.to_scalar::<f32>()?;
    if !v.is_finite() {
        return Err(RlError::NonFiniteLoss(format!("{} = {}", name, v)).into());
    }
    Ok(v)
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, v: i64);
}

/// Converts a slice of values to a 1-dimensional tensor.
pub fn to_tensor1(v: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(v, (v.len(),), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::Init;

    fn varmap_with(values: &[(&str, [f32; 3])]) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        for (name, v) in values.iter() {
            vm.get((3,), name, init, DType::F32, &Device::Cpu)?;
            lock(&vm)?[*name].set(&Tensor::from_slice(&v[..], (3,), &Device::Cpu)?)?;
        }
        Ok(vm)
    }

    fn get(vm: &VarMap, name: &str) -> Result<Vec<f32>> {
        let vars = lock(vm)?;
        Ok(vars[name].as_tensor().to_vec1::<f32>()?)
    }

    #[test]
    fn test_track() -> Result<()> {
        let tau = 0.7;
        let vm_src = varmap_with(&[("var1", [1.0, 2.0, 3.0])])?;
        let vm_dest = varmap_with(&[("var1", [4.0, 5.0, 6.0])])?;
        track(&vm_dest, &vm_src, tau)?;

        let expected = [1.0f32, 2.0, 3.0]
            .iter()
            .zip([4.0f32, 5.0, 6.0].iter())
            .map(|(s, d)| tau as f32 * s + (1.0 - tau as f32) * d)
            .collect::<Vec<_>>();
        for (a, b) in get(&vm_dest, "var1")?.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_polyak_update_is_convex() -> Result<()> {
        let src = [("q0.ln0.weight", [1.0, -2.0, 3.0]), ("q0.bn.running_mean", [7.0, 8.0, 9.0])];
        let dest = [("q0.ln0.weight", [0.0, 0.0, 1.0]), ("q0.bn.running_mean", [0.0, 0.0, 0.0])];
        let vm_src = varmap_with(&src)?;
        let vm_dest = varmap_with(&dest)?;
        let tau = 0.005;
        polyak_update(&vm_dest, &vm_src, tau)?;

        // Parameters lie between target and online values.
        let w = get(&vm_dest, "q0.ln0.weight")?;
        for ((w, s), d) in w.iter().zip(src[0].1.iter()).zip(dest[0].1.iter()) {
            let expected = (1.0 - tau as f32) * d + tau as f32 * s;
            assert!((w - expected).abs() < 1e-6);
            assert!(w >= &s.min(*d) && w <= &s.max(*d));
        }

        // Buffers are copied.
        assert_eq!(get(&vm_dest, "q0.bn.running_mean")?, vec![7.0, 8.0, 9.0]);
        Ok(())
    }

    #[test]
    fn test_tau_one_copies() -> Result<()> {
        let vm_src = varmap_with(&[("a", [1.5, 2.5, 3.5]), ("b", [-1.0, 0.0, 1.0])])?;
        let vm_dest = varmap_with(&[("a", [0.0; 3]), ("b", [9.0; 3])])?;
        polyak_update(&vm_dest, &vm_src, 1.0)?;
        assert_eq!(get(&vm_dest, "a")?, get(&vm_src, "a")?);
        assert_eq!(get(&vm_dest, "b")?, get(&vm_src, "b")?);
        Ok(())
    }

    #[test]
    fn test_buffers_are_not_trainable() -> Result<()> {
        let vm = varmap_with(&[
            ("q1.bn.num_batches_tracked", [0.0; 3]),
            ("q1.bn.running_var", [1.0; 3]),
            ("q1.ln0.bias", [0.0; 3]),
        ])?;
        let names = trainable_vars(&vm)?
            .into_iter()
            .map(|(k, _)| k)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["q1.ln0.bias"]);
        assert!(!is_buffer("running_mean_head.weight"));
        Ok(())
    }

    #[test]
    fn test_no_grad_detaches() -> Result<()> {
        let x = Var::new(&[1f32, 2.0], &Device::Cpu)?;
        let y = no_grad(|| Ok((x.as_tensor() * 3.0)?))?;
        let loss = (x.as_tensor().sum_all()? + y.sum_all()?)?;
        let grads = loss.backward()?;
        assert_eq!(grads.get(x.as_tensor()).unwrap().to_vec1::<f32>()?, vec![1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_finite_loss() -> Result<()> {
        let loss = Tensor::new(0.25f32, &Device::Cpu)?;
        assert_eq!(finite_loss("critic_loss", &loss)?, 0.25);

        let loss = Tensor::new(f32::NAN, &Device::Cpu)?;
        let err = finite_loss("critic_loss", &loss).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RlError>(),
            Some(RlError::NonFiniteLoss(_))
        ));
        Ok(())
    }
}
