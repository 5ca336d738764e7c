//! 纹理矩阵.
//!
//! 每个矩阵族 (游程长度矩阵, 共生矩阵, ...) 共享同一条流水线:
//!
//! 1. 按空间聚合方法生成空间单元, 对每个单元统计一个稀疏的 [`RawMatrix`];
//! 2. 按空间聚合方法把原始矩阵分组并逐键求和, 得到 [`MergedMatrix`];
//! 3. 由矩阵族把合并后的矩阵定型为不可变的最终矩阵 (附带边缘分布等统计量).
//!
//! 矩阵族之间只有第 1 步的统计规则和第 3 步的统计量不同.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::debug;

use crate::data::{DiscretizedImage, VoxelGrid};
use crate::spatial::{SpatialMethod, SpatialUnit};
use crate::Idx3d;

pub mod glcm;
pub mod rlm;

pub use glcm::{Glcm, GlcmMatrix};
pub use rlm::{Rlm, RlmMatrix};

/// 稀疏计数表. 键为 `(灰度, 第二轴取值)`, 值为出现次数.
///
/// 只保存实际出现过的组合, 不预先分配稠密表.
pub type Counts = BTreeMap<(u32, u32), u64>;

/// 单个空间单元的原始矩阵.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawMatrix {
    /// 产生该矩阵的空间单元.
    pub unit: SpatialUnit,

    /// 稀疏计数.
    pub counts: Counts,

    /// 单元扫描区域内的 ROI 体素个数.
    pub n_v: u64,
}

impl RawMatrix {
    /// 总计数.
    #[inline]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// 合并后的矩阵.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MergedMatrix {
    /// 参与合并的空间单元. 仅用于诊断.
    pub contributors: Vec<SpatialUnit>,

    /// 逐键求和后的稀疏计数.
    pub counts: Counts,

    /// 参与合并的单元的 ROI 体素个数之和.
    pub n_v: u64,
}

impl MergedMatrix {
    /// 将 `raw` 逐键累加进来.
    pub fn absorb(&mut self, raw: RawMatrix) {
        self.contributors.push(raw.unit);
        self.n_v += raw.n_v;
        for (key, c) in raw.counts {
            *self.counts.entry(key).or_insert(0) += c;
        }
    }

    /// 总计数.
    #[inline]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// 定型后的矩阵都需要提供的接口.
pub trait FinalizedMatrix {
    /// 总计数 `n_s`.
    fn n_s(&self) -> f64;

    /// 矩阵是否为空 (`n_s == 0`).
    #[inline]
    fn is_empty(&self) -> bool {
        self.n_s() == 0.0
    }
}

/// 矩阵族.
pub trait MatrixFamily {
    /// 定型后的矩阵类型.
    type Matrix: FinalizedMatrix + Send + Sync + 'static;

    /// 矩阵族名称, 用于日志.
    const NAME: &'static str;

    /// 离散化时包围盒外扩的距离, 单位为毫米.
    const CROPPING_DISTANCE: f64;

    /// 对单个空间单元统计原始矩阵.
    ///
    /// 退化输入 (空 ROI, 扫描方向上体素不足) 得到总计数为 0 的矩阵, 而不是错误.
    fn tally(image: &DiscretizedImage, unit: SpatialUnit) -> RawMatrix;

    /// 将合并后的矩阵定型.
    fn finalize(merged: MergedMatrix) -> Self::Matrix;
}

/// 单元 `unit` 扫描区域内的全部体素下标, 按行优先序.
///
/// 切片单元只访问自己所在的切片.
pub(crate) fn unit_positions(unit: SpatialUnit, shape: Idx3d) -> impl Iterator<Item = Idx3d> {
    let (nz, ny, nx) = shape;
    unit.z_range(nz)
        .flat_map(move |z| (0..ny).flat_map(move |y| (0..nx).map(move |x| (z, y, x))))
}

/// 单元 `unit` 扫描区域内的 ROI 体素个数.
pub(crate) fn count_roi_voxels(image: &DiscretizedImage, unit: &SpatialUnit) -> u64 {
    match unit.slice {
        None => image.roi_count() as u64,
        Some(z) => image
            .mask()
            .outer_iter()
            .nth(z)
            .map_or(0, |s| s.iter().filter(|p| **p).count() as u64),
    }
}

/// 按空间聚合方法合并原始矩阵. 分组顺序与单元生成顺序一致.
pub fn merge(raw: Vec<RawMatrix>, method: SpatialMethod) -> Vec<MergedMatrix> {
    raw.into_iter()
        .enumerate()
        .map(|(i, m)| (method.merge_group(i, &m.unit), m))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(group, _)| *group)
        .map(|(_, group)| {
            group.into_iter().fold(MergedMatrix::default(), |mut acc, m| {
                acc.absorb(m);
                acc
            })
        })
        .collect()
}

/// 完整的矩阵流水线: 生成单元, 统计, 合并, 定型.
///
/// 空 ROI 在 "合并到一个矩阵" 的方法下得到一个空矩阵, 在 "取平均" 的方法下
/// 可能得到零个矩阵; 两种情况下特征值都是 `NaN`.
pub fn build_matrices<F: MatrixFamily>(
    image: &DiscretizedImage,
    method: SpatialMethod,
) -> Vec<F::Matrix> {
    let raw: Vec<RawMatrix> = method
        .units(image.len_z())
        .map(|unit| F::tally(image, unit))
        .collect();
    let mut merged = merge(raw, method);
    if merged.is_empty() && !method.is_averaged() {
        merged.push(MergedMatrix::default());
    }

    let empty = merged.iter().filter(|m| m.total() == 0).count();
    if empty > 0 {
        debug!(
            "{}: {empty} of {} matrices are empty ({method}, up to {} units each)",
            F::NAME,
            merged.len(),
            merged.iter().map(|m| m.contributors.len()).max().unwrap_or(0)
        );
    }
    merged.into_iter().map(F::finalize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction, DIRECTIONS_2D};

    fn raw(slice: usize, direction: Direction, key: (u32, u32), c: u64) -> RawMatrix {
        RawMatrix {
            unit: SpatialUnit {
                slice: Some(slice),
                direction,
            },
            counts: Counts::from([(key, c)]),
            n_v: 4,
        }
    }

    fn two_slices() -> Vec<RawMatrix> {
        let mut v = vec![];
        for z in 0..2 {
            for (k, d) in DIRECTIONS_2D.iter().enumerate() {
                v.push(raw(z, *d, (1, k as u32 + 1), 1));
            }
        }
        v
    }

    #[test]
    fn test_merge_grouping() {
        let m = merge(two_slices(), SpatialMethod::Slice2d);
        assert_eq!(m.len(), 8);
        assert!(m.iter().all(|m| m.contributors.len() == 1));

        let m = merge(two_slices(), SpatialMethod::SliceMerge2d);
        assert_eq!(m.len(), 2);
        assert!(m.iter().all(|m| m.contributors.len() == 4 && m.n_v == 16));
        assert!(m[0].contributors.iter().all(|u| u.slice == Some(0)));

        let m = merge(two_slices(), SpatialMethod::DirectionMerge25d);
        assert_eq!(m.len(), 4);
        assert_eq!(m[0].counts, Counts::from([((1, 1), 2)]));

        let m = merge(two_slices(), SpatialMethod::VolumeMerge25d);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].total(), 8);
        assert_eq!(m[0].n_v, 32);
        assert_eq!(m[0].counts.len(), 4);
    }

    #[test]
    fn test_unit_positions_stay_in_slice() {
        let shape = (5, 2, 3);
        let unit = SpatialUnit {
            slice: Some(3),
            direction: DIRECTIONS_2D[0],
        };
        let pos: Vec<_> = unit_positions(unit, shape).collect();
        assert_eq!(pos.len(), 6);
        assert!(pos.iter().all(|&p| unit.contains(p) && p.0 == 3));
        assert_eq!(pos[0], (3, 0, 0));
        assert_eq!(pos[5], (3, 1, 2));

        // 越界切片不访问任何体素.
        let unit = SpatialUnit {
            slice: Some(7),
            ..unit
        };
        assert_eq!(unit_positions(unit, shape).count(), 0);

        let unit = SpatialUnit {
            slice: None,
            direction: Direction(1, 0, 0),
        };
        assert_eq!(unit_positions(unit, shape).count(), 30);
    }

    #[test]
    fn test_merge_sums_keywise() {
        let d = DIRECTIONS_2D[0];
        let m = merge(
            vec![raw(0, d, (2, 3), 5), raw(1, d, (2, 3), 7), raw(2, d, (1, 1), 1)],
            SpatialMethod::VolumeMerge25d,
        );
        assert_eq!(m[0].counts, Counts::from([((1, 1), 1), ((2, 3), 12)]));
    }
}
