//! 灰度共生矩阵 (GLCM).
//!
//! 距离为 1 的对称共生矩阵: ROI 内相邻体素对 `(p, p + d)` 同时计入 `(i, j)`
//! 和 `(j, i)`.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;

use super::{count_roi_voxels, unit_positions, Counts, FinalizedMatrix, MatrixFamily, MergedMatrix, RawMatrix};
use crate::data::{DiscretizedImage, VoxelGrid};
use crate::spatial::SpatialUnit;

/// 共生矩阵族.
#[derive(Copy, Clone, Debug)]
pub struct Glcm;

impl MatrixFamily for Glcm {
    type Matrix = GlcmMatrix;

    const NAME: &'static str = "glcm";

    const CROPPING_DISTANCE: f64 = 0.0;

    fn tally(image: &DiscretizedImage, unit: SpatialUnit) -> RawMatrix {
        let shape = image.shape();
        let mut counts = Counts::new();
        for pos in unit_positions(unit, shape) {
            let Some(grey) = image.grey_at(pos) else {
                continue;
            };
            let Some(other) = unit
                .direction
                .next(pos, shape)
                .and_then(|q| image.grey_at(q))
            else {
                continue;
            };
            *counts.entry((grey, other)).or_insert(0) += 1;
            *counts.entry((other, grey)).or_insert(0) += 1;
        }
        RawMatrix {
            unit,
            counts,
            n_v: count_roi_voxels(image, &unit),
        }
    }

    fn finalize(merged: MergedMatrix) -> GlcmMatrix {
        GlcmMatrix::from_merged(merged)
    }
}

/// 定型后的共生矩阵. 保存归一化后的联合概率 `p_ij`.
#[derive(Debug)]
pub struct GlcmMatrix {
    entries: Vec<(u32, u32, f64)>,
    pi: Vec<(u32, f64)>,
    n_s: f64,
    marginal_stats: OnceCell<(f64, f64)>,
}

impl GlcmMatrix {
    /// 由合并后的矩阵定型.
    pub fn from_merged(merged: MergedMatrix) -> Self {
        let n_s = merged.total() as f64;
        let mut pi: BTreeMap<u32, f64> = BTreeMap::new();
        let entries = merged
            .counts
            .iter()
            .map(|(&(i, j), &c)| {
                let p = c as f64 / n_s;
                *pi.entry(i).or_insert(0.0) += p;
                (i, j, p)
            })
            .collect();
        Self {
            entries,
            pi: pi.into_iter().collect(),
            n_s,
            marginal_stats: OnceCell::new(),
        }
    }

    /// 非零联合概率 `(i, j, p_ij)`, 按 `(i, j)` 升序排列.
    #[inline]
    pub fn entries(&self) -> &[(u32, u32, f64)] {
        &self.entries
    }

    /// 行边缘概率 `p_i = Σ_j p_ij`. 由对称性, 它也是列边缘概率.
    #[inline]
    pub fn pi(&self) -> &[(u32, f64)] {
        &self.pi
    }

    /// 边缘分布的均值和方差.
    pub fn marginal_stats(&self) -> (f64, f64) {
        *self.marginal_stats.get_or_init(|| {
            let mu: f64 = self.pi.iter().map(|&(i, p)| i as f64 * p).sum();
            let var = self
                .pi
                .iter()
                .map(|&(i, p)| (i as f64 - mu).powi(2) * p)
                .sum();
            (mu, var)
        })
    }
}

impl FinalizedMatrix for GlcmMatrix {
    #[inline]
    fn n_s(&self) -> f64 {
        self.n_s
    }
}
