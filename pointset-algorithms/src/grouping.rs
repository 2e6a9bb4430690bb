//! Indexed gather of coordinates and features
//!
//! Pure copies driven by the index tables from sampling and ball query:
//! `gather_points` picks one column per sampled center and `group_points`
//! picks one column per neighbor slot. Channel counts are arbitrary,
//! including 0.

use itertools::iproduct;
use pointset_core::{Array3, Array4, ArrayView2, ArrayView3, Axis, Error, Result};
use rayon::prelude::*;
use tracing::instrument;

use crate::parallel;

fn check_batch(source_batch: usize, index_batch: usize) -> Result<()> {
    if source_batch != index_batch {
        return Err(Error::ShapeMismatch(format!(
            "index batch size {} does not match source batch size {}",
            index_batch, source_batch
        )));
    }
    Ok(())
}

fn check_bounds<'a>(indices: impl IntoIterator<Item = &'a usize>, num_points: usize) -> Result<()> {
    if let Some(&bad) = indices.into_iter().find(|&&idx| idx >= num_points) {
        return Err(Error::InvalidArgument(format!(
            "index {} out of range for {} points",
            bad, num_points
        )));
    }
    Ok(())
}

/// Gather source columns at sampled centers
///
/// # Arguments
/// * `source` - Coordinates or features `[B, C, N]`
/// * `centers` - Point indices `[B, M]`
///
/// # Returns
/// * `Result<Array3<f32>>` - `[B, C, M]` with `out[b, c, m] = source[b, c, centers[b, m]]`
#[instrument(skip_all, fields(shape = ?source.shape(), num_centers = centers.dim().1))]
pub fn gather_points(source: ArrayView3<f32>, centers: ArrayView2<usize>) -> Result<Array3<f32>> {
    let (batch, channels, num_points) = source.dim();
    let (index_batch, num_centers) = centers.dim();
    check_batch(batch, index_batch)?;
    check_bounds(centers.iter(), num_points)?;

    let blocks: Vec<Vec<f32>> = parallel::install(|| {
        (0..batch)
            .into_par_iter()
            .map(|b| {
                let cloud = source.index_axis(Axis(0), b);
                let row = centers.row(b);
                iproduct!(0..channels, 0..num_centers)
                    .map(|(c, m)| cloud[[c, row[m]]])
                    .collect()
            })
            .collect()
    })?;

    Ok(Array3::from_shape_vec(
        (batch, channels, num_centers),
        blocks.concat(),
    )?)
}

/// Group source columns by a neighbor table
///
/// # Arguments
/// * `source` - Coordinates or features `[B, C, N]`
/// * `table` - Neighbor indices `[B, M, K]`
///
/// # Returns
/// * `Result<Array4<f32>>` - `[B, C, M, K]` with
///   `out[b, c, m, k] = source[b, c, table[b, m, k]]`
#[instrument(skip_all, fields(shape = ?source.shape(), table = ?table.shape()))]
pub fn group_points(source: ArrayView3<f32>, table: ArrayView3<usize>) -> Result<Array4<f32>> {
    let (batch, channels, num_points) = source.dim();
    let (index_batch, num_centers, nsample) = table.dim();
    check_batch(batch, index_batch)?;
    check_bounds(table.iter(), num_points)?;

    let blocks: Vec<Vec<f32>> = parallel::install(|| {
        (0..batch)
            .into_par_iter()
            .map(|b| {
                let cloud = source.index_axis(Axis(0), b);
                let neighbors = table.index_axis(Axis(0), b);
                iproduct!(0..channels, 0..num_centers, 0..nsample)
                    .map(|(c, m, k)| cloud[[c, neighbors[[m, k]]]])
                    .collect()
            })
            .collect()
    })?;

    Ok(Array4::from_shape_vec(
        (batch, channels, num_centers, nsample),
        blocks.concat(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pointset_core::{Array2, IndexTable};

    fn source() -> Array3<f32> {
        // value encodes (batch, channel, point)
        Array3::from_shape_fn((2, 3, 5), |(b, c, n)| (b * 100 + c * 10 + n) as f32)
    }

    #[test]
    fn test_gather_points() {
        let source = source();
        let centers = Array2::from_shape_vec((2, 2), vec![4, 1, 0, 3]).unwrap();

        let gathered = gather_points(source.view(), centers.view()).unwrap();
        assert_eq!(gathered.shape(), &[2, 3, 2]);
        assert_relative_eq!(gathered[[0, 0, 0]], 4.0);
        assert_relative_eq!(gathered[[0, 2, 1]], 21.0);
        assert_relative_eq!(gathered[[1, 1, 0]], 110.0);
        assert_relative_eq!(gathered[[1, 2, 1]], 123.0);
    }

    #[test]
    fn test_group_points() {
        let source = source();
        let table = IndexTable::from_shape_fn((2, 2, 3), |(_, m, k)| (m + k) % 5);

        let grouped = group_points(source.view(), table.view()).unwrap();
        assert_eq!(grouped.shape(), &[2, 3, 2, 3]);
        for ((b, c, m, k), value) in grouped.indexed_iter() {
            let expected = source[[b, c, table[[b, m, k]]]];
            assert_relative_eq!(*value, expected);
        }
    }

    #[test]
    fn test_identity_table_reproduces_source() {
        let source = source();
        let identity = IndexTable::from_shape_fn((2, 5, 1), |(_, n, _)| n);

        let grouped = group_points(source.view(), identity.view()).unwrap();
        let squeezed = grouped.index_axis(Axis(3), 0);
        assert_eq!(squeezed, source.view());
    }

    #[test]
    fn test_zero_channels() {
        let source = Array3::<f32>::zeros((2, 0, 5));
        let table = IndexTable::zeros((2, 4, 3));

        let grouped = group_points(source.view(), table.view()).unwrap();
        assert_eq!(grouped.shape(), &[2, 0, 4, 3]);
    }

    #[test]
    fn test_out_of_range_index() {
        let source = source();
        let table = IndexTable::from_elem((2, 1, 2), 5);
        let result = group_points(source.view(), table.view());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let centers = Array2::from_elem((2, 1), 7);
        let result = gather_points(source.view(), centers.view());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_batch_mismatch() {
        let source = source();
        let table = IndexTable::zeros((3, 1, 2));
        let result = group_points(source.view(), table.view());
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }
}
