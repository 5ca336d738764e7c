//! 空间聚合方法与扫描方向.
//!
//! 纹理矩阵总是按照某个 "空间单元" 构建: 一个 (切片, 平面方向) 对,
//! 或者一个覆盖整个体积的三维方向. 空间聚合方法决定构建哪些单元,
//! 以及之后如何将它们的矩阵合并.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::Idx3d;

/// 三维扫描方向, 按 `(dz, dy, dx)` 给出.
///
/// 每个方向与其反方向视为同一方向, 因此只保留 "正半空间" 中的那一个.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Direction(pub i8, pub i8, pub i8);

impl Direction {
    /// 是否是水平切片平面内的方向.
    #[inline]
    pub const fn is_in_plane(&self) -> bool {
        self.0 == 0
    }

    /// 返回 `pos + k * self`. 如果越界 (包括负数) 则返回 `None`.
    #[inline]
    pub fn step_from(&self, (z, y, x): Idx3d, k: usize, (nz, ny, nx): Idx3d) -> Option<Idx3d> {
        #[inline]
        fn axis(p: usize, d: i8, k: usize, n: usize) -> Option<usize> {
            let q = p as isize + d as isize * k as isize;
            (0..n as isize).contains(&q).then_some(q as usize)
        }
        Some((
            axis(z, self.0, k, nz)?,
            axis(y, self.1, k, ny)?,
            axis(x, self.2, k, nx)?,
        ))
    }

    /// `pos` 沿该方向的下一个体素.
    #[inline]
    pub fn next(&self, pos: Idx3d, shape: Idx3d) -> Option<Idx3d> {
        self.step_from(pos, 1, shape)
    }

    /// `pos` 是否是一条扫描线的起点, 即它在 `shape` 内没有前驱.
    #[inline]
    pub fn is_line_start(&self, pos: Idx3d, shape: Idx3d) -> bool {
        Direction(-self.0, -self.1, -self.2)
            .next(pos, shape)
            .is_none()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

/// 水平切片内的 4 个方向: 0°, 45°, 90°, 135°.
pub const DIRECTIONS_2D: [Direction; 4] = [
    Direction(0, 0, 1),
    Direction(0, 1, 1),
    Direction(0, 1, 0),
    Direction(0, 1, -1),
];

/// 26-邻域中去除反方向后剩下的 13 个三维方向. 前 4 个与 [`DIRECTIONS_2D`] 相同.
pub const DIRECTIONS_3D: [Direction; 13] = [
    Direction(0, 0, 1),
    Direction(0, 1, 1),
    Direction(0, 1, 0),
    Direction(0, 1, -1),
    Direction(1, -1, -1),
    Direction(1, -1, 0),
    Direction(1, -1, 1),
    Direction(1, 0, -1),
    Direction(1, 0, 0),
    Direction(1, 0, 1),
    Direction(1, 1, -1),
    Direction(1, 1, 0),
    Direction(1, 1, 1),
];

/// 一个空间单元: 单个切片上的一个平面方向, 或整个体积上的一个三维方向.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SpatialUnit {
    /// 水平切片索引. `None` 代表整个体积.
    pub slice: Option<usize>,

    /// 扫描方向.
    pub direction: Direction,
}

impl SpatialUnit {
    /// 判断 (裁剪后图像中的) 体素 `pos` 是否位于该单元的扫描区域内.
    #[inline]
    pub fn contains(&self, (z, _, _): Idx3d) -> bool {
        self.slice.map_or(true, |s| s == z)
    }

    /// 该单元的扫描区域中, 以 `shape` 为全图形状时的 z 范围.
    #[inline]
    pub fn z_range(&self, n_z: usize) -> std::ops::Range<usize> {
        match self.slice {
            Some(s) => s..(s + 1).min(n_z),
            None => 0..n_z,
        }
    }
}

/// 合并分组的键. 同组的原始矩阵会按键求和.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub(crate) enum MergeGroup {
    /// 不合并, 按单元在生成序列中的位置区分.
    Unit(usize),

    /// 按切片合并.
    Slice(usize),

    /// 按方向合并.
    Direction(Direction),

    /// 全部合并.
    Volume,
}

/// 空间聚合方法.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum SpatialMethod {
    /// 逐切片, 逐方向单独构建矩阵, 特征值取平均. (`2d_slice`, 又名 `2d_average`)
    Slice2d,

    /// 逐切片构建, 同一切片的 4 个方向合并, 特征值在切片间取平均.
    SliceMerge2d,

    /// 逐切片构建, 同一方向的所有切片合并, 特征值在方向间取平均.
    DirectionMerge25d,

    /// 逐切片构建, 所有切片和方向合并为一个矩阵.
    VolumeMerge25d,

    /// 逐三维方向构建, 特征值在 13 个方向间取平均.
    Average3d,

    /// 逐三维方向构建, 13 个方向合并为一个矩阵.
    VolumeMerge3d,
}

impl SpatialMethod {
    /// 全部空间聚合方法.
    pub const ALL: [SpatialMethod; 6] = [
        Self::Slice2d,
        Self::SliceMerge2d,
        Self::DirectionMerge25d,
        Self::VolumeMerge25d,
        Self::Average3d,
        Self::VolumeMerge3d,
    ];

    /// 配置中使用的名称.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Slice2d => "2d_slice",
            Self::SliceMerge2d => "2d_slice_merge",
            Self::DirectionMerge25d => "2.5d_direction_merge",
            Self::VolumeMerge25d => "2.5d_volume_merge",
            Self::Average3d => "3d_average",
            Self::VolumeMerge3d => "3d_volume_merge",
        }
    }

    /// 是否逐切片构建矩阵.
    #[inline]
    pub const fn is_slice_based(&self) -> bool {
        !matches!(self, Self::Average3d | Self::VolumeMerge3d)
    }

    /// 合并后是否保留多个矩阵 (之后在特征值层面取平均).
    #[inline]
    pub const fn is_averaged(&self) -> bool {
        !matches!(self, Self::VolumeMerge25d | Self::VolumeMerge3d)
    }

    /// 该方法使用的扫描方向.
    #[inline]
    pub fn directions(&self) -> &'static [Direction] {
        if self.is_slice_based() {
            &DIRECTIONS_2D
        } else {
            &DIRECTIONS_3D
        }
    }

    /// 对一个有 `n_z` 层切片的图像, 生成需要构建矩阵的全部空间单元.
    ///
    /// 逐切片方法按 "切片优先, 方向其次" 的顺序生成.
    pub fn units(&self, n_z: usize) -> impl Iterator<Item = SpatialUnit> + '_ {
        let slices: Vec<Option<usize>> = if self.is_slice_based() {
            (0..n_z).map(Some).collect()
        } else {
            vec![None]
        };
        slices.into_iter().flat_map(move |slice| {
            self.directions()
                .iter()
                .map(move |&direction| SpatialUnit { slice, direction })
        })
    }

    /// 第 `index` 个生成的单元 `unit` 所属的合并分组.
    pub(crate) fn merge_group(&self, index: usize, unit: &SpatialUnit) -> MergeGroup {
        match self {
            Self::Slice2d | Self::Average3d => MergeGroup::Unit(index),
            Self::SliceMerge2d => MergeGroup::Slice(unit.slice.unwrap_or_default()),
            Self::DirectionMerge25d => MergeGroup::Direction(unit.direction),
            Self::VolumeMerge25d | Self::VolumeMerge3d => MergeGroup::Volume,
        }
    }
}

impl FromStr for SpatialMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "2d_slice" | "2d_average" => Ok(Self::Slice2d),
            "2d_slice_merge" => Ok(Self::SliceMerge2d),
            "2.5d_direction_merge" => Ok(Self::DirectionMerge25d),
            "2.5d_volume_merge" => Ok(Self::VolumeMerge25d),
            "3d_average" => Ok(Self::Average3d),
            "3d_volume_merge" => Ok(Self::VolumeMerge3d),
            _ => Err(ConfigError::UnknownSpatialMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for SpatialMethod {
    type Error = ConfigError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpatialMethod> for String {
    #[inline]
    fn from(value: SpatialMethod) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SpatialMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_directions_unique_up_to_sign() {
        let mut seen = HashSet::new();
        for d in DIRECTIONS_3D {
            assert_ne!(d, Direction(0, 0, 0));
            assert!(seen.insert(d));
            assert!(!seen.contains(&Direction(-d.0, -d.1, -d.2)));
        }
        assert!(DIRECTIONS_2D.iter().all(Direction::is_in_plane));
        assert_eq!(DIRECTIONS_3D[..4], DIRECTIONS_2D);
    }

    #[test]
    fn test_step_and_line_start() {
        let shape = (1, 4, 4);
        let d = Direction(0, 1, -1);
        assert_eq!(d.next((0, 0, 3), shape), Some((0, 1, 2)));
        assert_eq!(d.next((0, 3, 3), shape), None);
        assert_eq!(d.next((0, 0, 0), shape), None);
        assert!(d.is_line_start((0, 0, 1), shape));
        assert!(d.is_line_start((0, 2, 3), shape));
        assert!(!d.is_line_start((0, 2, 2), shape));
    }

    #[test]
    fn test_parse_spatial_method() {
        for m in SpatialMethod::ALL {
            assert_eq!(m.as_str().parse::<SpatialMethod>(), Ok(m));
        }
        assert_eq!("2D_Average".parse::<SpatialMethod>(), Ok(SpatialMethod::Slice2d));
        assert_eq!(
            "4d_merge".parse::<SpatialMethod>(),
            Err(ConfigError::UnknownSpatialMethod("4d_merge".to_string()))
        );
    }

    #[test]
    fn test_units_count() {
        assert_eq!(SpatialMethod::Slice2d.units(3).count(), 12);
        assert_eq!(SpatialMethod::VolumeMerge25d.units(3).count(), 12);
        assert_eq!(SpatialMethod::Average3d.units(3).count(), 13);
        assert_eq!(SpatialMethod::SliceMerge2d.units(0).count(), 0);
        assert!(SpatialMethod::VolumeMerge3d
            .units(5)
            .all(|u| u.slice.is_none()));
    }
}
