//! Device and checkpoint loading helpers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use candle_core::{
    utils::{cuda_is_available, metal_is_available},
    DType, Device,
};
use candle_nn::VarBuilder;

use crate::error::{Error, Result};

/// Returns the best available device at `ordinal` index (in case of multiple
/// GPUs), or CPU if `force_cpu` is true.
pub fn inference_device(force_cpu: bool, ordinal: usize) -> Result<Device> {
    if force_cpu {
        log::debug!("device is forced cpu");
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        log::debug!("device is cuda {ordinal}");
        Ok(Device::new_cuda(ordinal)?)
    } else if metal_is_available() {
        log::debug!("device is metal {ordinal}");
        Ok(Device::new_metal(ordinal)?)
    } else {
        log::debug!("device is cpu");
        // fallback to cpu if nothing else available
        Ok(Device::Cpu)
    }
}

/// Resolve the requested dtype, defaulting to bf16 on accelerators and f32
/// on the CPU.
pub fn parse_dtype(requested: Option<&str>, device: &Device) -> Result<DType> {
    match requested {
        Some("f16") => Ok(DType::F16),
        Some("bf16") => Ok(DType::BF16),
        Some("f32") => Ok(DType::F32),
        Some(other) => Err(Error::config(format!("unsupported dtype {other}"))),
        None => Ok(if matches!(device, Device::Cpu) {
            DType::F32
        } else {
            DType::BF16
        }),
    }
}

/// Collect the safetensors files of a checkpoint: the single
/// model.safetensors if present, otherwise every file referenced by the hub
/// index.
pub fn safetensors_paths(data_path: &Path) -> Result<Vec<PathBuf>> {
    let single = data_path.join("model.safetensors");
    if single.is_file() {
        return Ok(vec![single]);
    }

    let index_path = data_path.join("model.safetensors.index.json");
    log::info!("loading tensors index from {} ...", index_path.display());

    let raw = std::fs::read_to_string(&index_path).map_err(|e| Error::load(e, &index_path))?;
    let index: serde_json::Value = serde_json::from_str(&raw)?;

    let weight_map = match index.get("weight_map") {
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => {
            return Err(Error::config(format!(
                "weight map in {} is not a map",
                index_path.display()
            )))
        }
        None => {
            return Err(Error::config(format!(
                "no weight map in {}",
                index_path.display()
            )))
        }
    };

    let mut files = HashSet::new();
    for value in weight_map.values() {
        if let Some(file) = value.as_str() {
            files.insert(file.to_string());
        }
    }

    Ok(files.iter().map(|file| data_path.join(file)).collect())
}

/// Create a VarBuilder over the checkpoint's safetensors.
pub fn var_builder_from_path(
    data_path: &Path,
    dtype: DType,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    let filenames = safetensors_paths(data_path)?;

    log::info!(
        "loading {} tensor file(s) from {}",
        filenames.len(),
        data_path.display()
    );

    unsafe {
        VarBuilder::from_mmaped_safetensors(&filenames, dtype, device)
            .map_err(|e| Error::inference(format!("can't mmap checkpoint tensors: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_defaults_to_f32_on_cpu() {
        assert_eq!(parse_dtype(None, &Device::Cpu).unwrap(), DType::F32);
    }

    #[test]
    fn requested_dtypes_are_honored() {
        assert_eq!(parse_dtype(Some("f16"), &Device::Cpu).unwrap(), DType::F16);
        assert_eq!(
            parse_dtype(Some("bf16"), &Device::Cpu).unwrap(),
            DType::BF16
        );
        assert_eq!(parse_dtype(Some("f32"), &Device::Cpu).unwrap(), DType::F32);
    }

    #[test]
    fn unsupported_dtypes_are_config_errors() {
        assert!(matches!(
            parse_dtype(Some("q4"), &Device::Cpu),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn single_safetensors_file_wins_over_the_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.safetensors"), b"").unwrap();

        let paths = safetensors_paths(dir.path()).unwrap();
        assert_eq!(paths, vec![dir.path().join("model.safetensors")]);
    }

    #[test]
    fn index_expands_to_the_referenced_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("model.safetensors.index.json"),
            r#"{ "weight_map": { "a.weight": "part-1.safetensors", "b.weight": "part-1.safetensors", "c.weight": "part-2.safetensors" } }"#,
        )
        .unwrap();

        let mut paths = safetensors_paths(dir.path()).unwrap();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                dir.path().join("part-1.safetensors"),
                dir.path().join("part-2.safetensors"),
            ]
        );
    }

    #[test]
    fn a_checkpoint_without_tensors_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            safetensors_paths(dir.path()),
            Err(Error::Load { .. })
        ));
    }

    #[test]
    fn an_index_without_a_weight_map_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.safetensors.index.json"), "{}").unwrap();
        assert!(matches!(
            safetensors_paths(dir.path()),
            Err(Error::Config(_))
        ));
    }
}
