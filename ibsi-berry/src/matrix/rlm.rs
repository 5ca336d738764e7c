//! 灰度游程长度矩阵 (GLRLM).
//!
//! 矩阵元素 `r_ij` 为灰度 `i` 上长度为 `j` 的游程个数. 游程是沿扫描方向的,
//! 由 ROI 内相同灰度的体素组成的极大连续序列.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;

use super::{count_roi_voxels, unit_positions, Counts, FinalizedMatrix, MatrixFamily, MergedMatrix, RawMatrix};
use crate::data::{DiscretizedImage, VoxelGrid};
use crate::spatial::SpatialUnit;
use crate::Idx3d;

/// 游程长度矩阵族.
#[derive(Copy, Clone, Debug)]
pub struct Rlm;

impl MatrixFamily for Rlm {
    type Matrix = RlmMatrix;

    const NAME: &'static str = "glrlm";

    const CROPPING_DISTANCE: f64 = 0.0;

    fn tally(image: &DiscretizedImage, unit: SpatialUnit) -> RawMatrix {
        let shape = image.shape();
        let mut counts = Counts::new();
        for start in line_starts(unit, shape) {
            tally_line(image, unit, start, &mut counts);
        }
        RawMatrix {
            unit,
            counts,
            n_v: count_roi_voxels(image, &unit),
        }
    }

    fn finalize(merged: MergedMatrix) -> RlmMatrix {
        RlmMatrix::from_merged(merged)
    }
}

/// 单元扫描区域内所有扫描线的起点.
fn line_starts(unit: SpatialUnit, shape: Idx3d) -> impl Iterator<Item = Idx3d> {
    let d = unit.direction;
    unit_positions(unit, shape).filter(move |&p| d.is_line_start(p, shape))
}

/// 沿一条扫描线统计游程. 游程在灰度变化处和 ROI 边界处终止.
fn tally_line(image: &DiscretizedImage, unit: SpatialUnit, start: Idx3d, counts: &mut Counts) {
    let shape = image.shape();
    // (灰度, 当前长度)
    let mut run: Option<(u32, u32)> = None;
    let mut pos = Some(start);
    while let Some(p) = pos {
        let grey = image.grey_at(p);
        run = match (run, grey) {
            (Some((g, len)), Some(cur)) if g == cur => Some((g, len + 1)),
            (prev, cur) => {
                if let Some(key) = prev {
                    *counts.entry(key).or_insert(0) += 1;
                }
                cur.map(|g| (g, 1))
            }
        };
        pos = unit.direction.next(p, shape);
    }
    if let Some(key) = run {
        *counts.entry(key).or_insert(0) += 1;
    }
}

/// 边缘分布中的一项: `(取值, 计数之和)`.
pub type Marginal = Vec<(u32, f64)>;

/// 定型后的游程长度矩阵.
///
/// 所有统计量在构造时计算一次 (均值类统计量在首次使用时计算), 之后不再修改.
#[derive(Debug)]
pub struct RlmMatrix {
    entries: Vec<(u32, u32, f64)>,
    ri: Marginal,
    rj: Marginal,
    n_s: f64,
    n_v: f64,
    means: OnceCell<(f64, f64)>,
}

impl RlmMatrix {
    /// 由合并后的矩阵定型.
    pub fn from_merged(merged: MergedMatrix) -> Self {
        let mut ri: BTreeMap<u32, f64> = BTreeMap::new();
        let mut rj: BTreeMap<u32, f64> = BTreeMap::new();
        let mut n_s = 0.0;
        let entries: Vec<(u32, u32, f64)> = merged
            .counts
            .iter()
            .map(|(&(i, j), &c)| {
                let c = c as f64;
                *ri.entry(i).or_insert(0.0) += c;
                *rj.entry(j).or_insert(0.0) += c;
                n_s += c;
                (i, j, c)
            })
            .collect();
        Self {
            entries,
            ri: ri.into_iter().collect(),
            rj: rj.into_iter().collect(),
            n_s,
            n_v: merged.n_v as f64,
            means: OnceCell::new(),
        }
    }

    /// 非零元素 `(i, j, r_ij)`, 按 `(i, j)` 升序排列.
    #[inline]
    pub fn entries(&self) -> &[(u32, u32, f64)] {
        &self.entries
    }

    /// 按灰度的边缘分布 `r_i = Σ_j r_ij`.
    #[inline]
    pub fn ri(&self) -> &[(u32, f64)] {
        &self.ri
    }

    /// 按游程长度的边缘分布 `r_j = Σ_i r_ij`.
    #[inline]
    pub fn rj(&self) -> &[(u32, f64)] {
        &self.rj
    }

    /// 参与统计的 ROI 体素个数 (合并时累加).
    #[inline]
    pub fn n_v(&self) -> f64 {
        self.n_v
    }

    /// 以 `p_ij = r_ij / n_s` 为权的灰度均值和游程长度均值.
    pub fn means(&self) -> (f64, f64) {
        *self.means.get_or_init(|| {
            self.entries
                .iter()
                .fold((0.0, 0.0), |(mi, mj), &(i, j, c)| {
                    let p = c / self.n_s;
                    (mi + i as f64 * p, mj + j as f64 * p)
                })
        })
    }
}

impl FinalizedMatrix for RlmMatrix {
    #[inline]
    fn n_s(&self) -> f64 {
        self.n_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction, SpatialMethod, DIRECTIONS_2D};
    use ndarray::Array3;

    /// 4x4 的四块 2x2 图像.
    fn blocks() -> DiscretizedImage {
        let grey = Array3::from_shape_vec(
            (1, 4, 4),
            vec![1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4],
        )
        .unwrap();
        DiscretizedImage::new(grey, Array3::from_elem((1, 4, 4), true)).unwrap()
    }

    fn tally(img: &DiscretizedImage, d: Direction) -> RawMatrix {
        Rlm::tally(
            img,
            SpatialUnit {
                slice: Some(0),
                direction: d,
            },
        )
    }

    #[test]
    fn test_rows_of_blocks() {
        let m = tally(&blocks(), Direction(0, 0, 1));
        assert_eq!(
            m.counts,
            Counts::from([((1, 2), 2), ((2, 2), 2), ((3, 2), 2), ((4, 2), 2)])
        );
        assert_eq!(m.n_v, 16);
    }

    #[test]
    fn test_diagonal_of_blocks() {
        for d in [Direction(0, 1, 1), Direction(0, 1, -1)] {
            let m = tally(&blocks(), d);
            let short: u64 = m.counts.iter().filter(|(k, _)| k.1 == 1).map(|(_, c)| c).sum();
            let long: u64 = m.counts.iter().filter(|(k, _)| k.1 == 2).map(|(_, c)| c).sum();
            assert_eq!((short, long), (8, 4), "direction {d}");
        }
    }

    #[test]
    fn test_run_stops_at_mask_boundary() {
        let grey = Array3::from_elem((1, 1, 5), 3u32);
        let mut mask = Array3::from_elem((1, 1, 5), true);
        mask[(0, 0, 2)] = false;
        let img = DiscretizedImage::new(grey, mask).unwrap();
        let m = tally(&img, Direction(0, 0, 1));
        assert_eq!(m.counts, Counts::from([((3, 2), 2)]));
        assert_eq!(m.n_v, 4);
    }

    #[test]
    fn test_empty_and_single_voxel() {
        let img = DiscretizedImage::new(
            Array3::from_elem((1, 2, 2), 1u32),
            Array3::from_elem((1, 2, 2), false),
        )
        .unwrap();
        for d in DIRECTIONS_2D {
            assert_eq!(tally(&img, d).total(), 0);
        }

        let img = DiscretizedImage::new(
            Array3::from_elem((1, 1, 1), 2u32),
            Array3::from_elem((1, 1, 1), true),
        )
        .unwrap();
        assert_eq!(tally(&img, Direction(0, 1, 0)).counts, Counts::from([((2, 1), 1)]));
    }

    #[test]
    fn test_marginals_sum_to_n_s() {
        let img = blocks();
        for method in SpatialMethod::ALL {
            for m in super::super::build_matrices::<Rlm>(&img, method) {
                let si: f64 = m.ri().iter().map(|(_, c)| c).sum();
                let sj: f64 = m.rj().iter().map(|(_, c)| c).sum();
                assert_eq!(si, m.n_s());
                assert_eq!(sj, m.n_s());
                assert!(!m.is_empty());
            }
        }
    }

    #[test]
    fn test_volume_3d_uniform() {
        let img = DiscretizedImage::new(
            Array3::from_elem((2, 2, 2), 1u32),
            Array3::from_elem((2, 2, 2), true),
        )
        .unwrap();
        let m = Rlm::tally(
            &img,
            SpatialUnit {
                slice: None,
                direction: Direction(1, 1, 1),
            },
        );
        // 一条长度为 2 的主对角线, 其余 6 个体素各自成游程.
        assert_eq!(m.counts, Counts::from([((1, 1), 6), ((1, 2), 1)]));
        assert_eq!(m.n_v, 8);
    }
}
