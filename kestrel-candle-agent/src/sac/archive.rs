//! Checkpoint archive made of named groups of tensors.
//!
//! An archive is a single safetensors file. The tensors of a group are
//! stored under `{group}.{name}`; a group is present in a file if at least
//! one key carries its prefix.
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use kestrel_core::GroupSelection;
use log::{debug, info};
use std::{collections::HashMap, path::Path};

/// Exports the tensors of a group.
pub type SaveFn<S> = fn(&S) -> Result<Vec<(String, Tensor)>>;

/// Restores a group from its tensors, keyed without the group prefix.
pub type LoadFn<S> = fn(&mut S, &HashMap<String, Tensor>) -> Result<()>;

/// A named part of the state of `S`.
pub struct Group<S> {
    /// Name of the group, also the key prefix in archives.
    pub name: &'static str,

    /// Exports the group.
    pub save: SaveFn<S>,

    /// Restores the group.
    pub load: LoadFn<S>,
}

impl<S> Group<S> {
    /// Creates a group.
    pub fn new(name: &'static str, save: SaveFn<S>, load: LoadFn<S>) -> Self {
        Self { name, save, load }
    }
}

/// Saves the selected groups of `state` to `path`.
pub fn save<S>(state: &S, groups: &[Group<S>], selection: &GroupSelection, path: &Path) -> Result<()> {
    let mut tensors = HashMap::new();
    let mut names = vec![];
    for group in groups.iter().filter(|g| selection.contains(g.name)) {
        for (name, t) in (group.save)(state)? {
            tensors.insert(format!("{}.{}", group.name, name), t.to_device(&Device::Cpu)?);
        }
        names.push(group.name);
    }
    candle_core::safetensors::save(&tensors, path)?;
    info!("Save {:?} to {:?}", names, path);
    Ok(())
}

/// Loads the selected groups present in `path` into `state`.
///
/// Groups absent in the file are skipped and leave `state` unchanged.
pub fn load<S>(state: &mut S, groups: &[Group<S>], selection: &GroupSelection, path: &Path) -> Result<()> {
    let tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
    for group in groups.iter().filter(|g| selection.contains(g.name)) {
        let prefix = format!("{}.", group.name);
        let group_tensors = tensors
            .iter()
            .filter_map(|(k, t)| k.strip_prefix(&prefix).map(|k| (k.to_string(), t.clone())))
            .collect::<HashMap<_, _>>();
        if group_tensors.is_empty() {
            debug!("Group {} is not in {:?}", group.name, path);
            continue;
        }
        (group.load)(state, &group_tensors)?;
        info!("Load {} from {:?}", group.name, path);
    }
    Ok(())
}

/// Rank-0 `I64` tensor of a count.
pub fn count_tensor(v: usize) -> Result<Tensor> {
    Ok(Tensor::new(v as i64, &Device::Cpu)?)
}

/// Rank-0 `F64` tensor of a real value.
pub fn real_tensor(v: f64) -> Result<Tensor> {
    Ok(Tensor::new(v, &Device::Cpu)?)
}

/// Rank-0 `U8` tensor of a flag.
pub fn flag_tensor(v: bool) -> Result<Tensor> {
    Ok(Tensor::new(v as u8, &Device::Cpu)?)
}

/// Reads a count stored by [`count_tensor`], if present.
pub fn read_count(tensors: &HashMap<String, Tensor>, name: &str) -> Result<Option<usize>> {
    tensors
        .get(name)
        .map(|t| -> Result<usize> { Ok(t.to_dtype(DType::I64)?.to_scalar::<i64>()? as usize) })
        .transpose()
}

/// Reads a real value stored by [`real_tensor`], if present.
pub fn read_real(tensors: &HashMap<String, Tensor>, name: &str) -> Result<Option<f64>> {
    tensors
        .get(name)
        .map(|t| -> Result<f64> { Ok(t.to_dtype(DType::F64)?.to_scalar::<f64>()?) })
        .transpose()
}

/// Reads a flag stored by [`flag_tensor`], if present.
pub fn read_flag(tensors: &HashMap<String, Tensor>, name: &str) -> Result<Option<bool>> {
    tensors
        .get(name)
        .map(|t| -> Result<bool> { Ok(t.to_dtype(DType::U8)?.to_scalar::<u8>()? != 0) })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[derive(Default)]
    struct Counters {
        a: usize,
        b: f64,
    }

    fn groups() -> Vec<Group<Counters>> {
        vec![
            Group::new(
                "a",
                |s| Ok(vec![("value".to_string(), count_tensor(s.a)?)]),
                |s, t| {
                    if let Some(v) = read_count(t, "value")? {
                        s.a = v;
                    }
                    Ok(())
                },
            ),
            Group::new(
                "b",
                |s| Ok(vec![("value".to_string(), real_tensor(s.b)?)]),
                |s, t| {
                    if let Some(v) = read_real(t, "value")? {
                        s.b = v;
                    }
                    Ok(())
                },
            ),
        ]
    }

    #[test]
    fn test_absent_group_is_skipped() -> Result<()> {
        let dir = TempDir::new("archive")?;
        let path = dir.path().join("counters.safetensors");
        let src = Counters { a: 7, b: 0.1 };
        save(&src, &groups(), &GroupSelection::only(vec!["a"]), &path)?;

        let mut dest = Counters { a: 1, b: 2.5 };
        load(&mut dest, &groups(), &GroupSelection::All, &path)?;
        assert_eq!(dest.a, 7);
        assert_eq!(dest.b, 2.5);

        // Unselected groups are not loaded.
        let mut dest = Counters::default();
        load(&mut dest, &groups(), &GroupSelection::only(vec!["b"]), &path)?;
        assert_eq!(dest.a, 0);
        Ok(())
    }

    #[test]
    fn test_scalars_are_exact() -> Result<()> {
        let tensors = vec![
            ("n".to_string(), count_tensor(123_456_789)?),
            ("x".to_string(), real_tensor(0.1 + 0.2)?),
            ("f".to_string(), flag_tensor(true)?),
        ]
        .into_iter()
        .collect::<HashMap<_, _>>();
        assert_eq!(read_count(&tensors, "n")?, Some(123_456_789));
        assert_eq!(read_real(&tensors, "x")?, Some(0.1 + 0.2));
        assert_eq!(read_flag(&tensors, "f")?, Some(true));
        assert_eq!(read_flag(&tensors, "missing")?, None);
        Ok(())
    }
}
