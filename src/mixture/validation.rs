//! Checks run on input blocks before they are copied to the host.

use numr::dtype::DType;
use numr::error::{Error, Result};

/// Blocks are read as F32 or F64; any other dtype is refused.
pub fn validate_mixture_dtype(dtype: DType, op: &'static str) -> Result<()> {
    if matches!(dtype, DType::F32 | DType::F64) {
        Ok(())
    } else {
        Err(Error::UnsupportedDType { dtype, op })
    }
}

/// A block is an `[n_sample, n_var]` matrix with both dimensions non-zero.
pub fn validate_data_2d(shape: &[usize], op: &'static str) -> Result<()> {
    let [n_sample, n_var] = shape else {
        return Err(Error::InvalidArgument {
            arg: "data",
            reason: format!("{op}: a block must be [n_sample, n_var], got {}-D", shape.len()),
        });
    };
    if *n_sample == 0 || *n_var == 0 {
        return Err(Error::InvalidArgument {
            arg: "data",
            reason: format!("{op}: a block must hold at least one sample and one variable"),
        });
    }
    Ok(())
}

/// A mixture needs between one cluster and one cluster per sample.
pub fn validate_n_cluster(n_cluster: usize, n_sample: usize, op: &'static str) -> Result<()> {
    if n_cluster == 0 {
        return Err(Error::InvalidArgument {
            arg: "n_cluster",
            reason: format!("{op} requires n_cluster > 0"),
        });
    }
    if n_cluster > n_sample {
        return Err(Error::InvalidArgument {
            arg: "n_cluster",
            reason: format!("{op}: n_cluster={n_cluster} exceeds number of samples {n_sample}"),
        });
    }
    Ok(())
}

/// All blocks describe the same samples, so their row counts agree.
pub fn validate_same_rows(shapes: &[Vec<usize>], op: &'static str) -> Result<()> {
    let Some(first) = shapes.first() else {
        return Ok(());
    };
    if let Some((idx, shape)) = shapes
        .iter()
        .enumerate()
        .find(|(_, s)| s.first() != first.first())
    {
        return Err(Error::InvalidArgument {
            arg: "blocks",
            reason: format!(
                "{op}: block {idx} has {} rows, block 0 has {}",
                shape.first().copied().unwrap_or(0),
                first.first().copied().unwrap_or(0)
            ),
        });
    }
    Ok(())
}
