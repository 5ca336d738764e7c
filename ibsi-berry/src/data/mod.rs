//! 3D 影像体积, ROI 掩膜和离散化图像的基础数据结构.
//!
//! 所有数组均按 `(z, y, x)` 组织: `z` 为相邻水平切片方向,
//! `y` 为自然图像的垂直方向, `x` 为自然图像的水平方向.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::{s, Array3, ArrayView3, Zip};

use crate::error::{ConfigError, ConfigResult, TextureError, TextureResult};
use crate::Idx3d;

pub mod discretize;

pub use discretize::Discretisation;

/// 体素网格的共用属性和部分通用操作.
pub trait VoxelGrid {
    /// 获取数据形状大小, 按 `(z, y, x)` 给出.
    fn shape(&self) -> Idx3d;

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, y, x) = self.shape();
        z * y * x
    }
}

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(0);

/// 为新创建的 [`Volume`] / [`RoiMask`] 分配身份标识.
///
/// 两者创建后数据不可变, 因此身份相同意味着内容相同.
#[inline]
fn next_grid_id() -> u64 {
    NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed)
}

#[inline]
fn dim_to_idx3d(dim: &[usize]) -> Idx3d {
    (dim[0], dim[1], dim[2])
}

/// 连续灰度 (如 CT HU 值, PET SUV 值) 的 3D 影像体积. 灰度值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct Volume {
    id: u64,
    data: Array3<f32>,
    spacing: [f64; 3],
}

impl VoxelGrid for Volume {
    #[inline]
    fn shape(&self) -> Idx3d {
        dim_to_idx3d(self.data.shape())
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 由灰度数组和体素分辨率 (`(z, y, x)`, 毫米) 创建影像体积.
    ///
    /// 分辨率必须为正的有限值, 否则返回 `Err`.
    pub fn new(data: Array3<f32>, spacing: [f64; 3]) -> ConfigResult<Self> {
        if spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            Ok(Self {
                id: next_grid_id(),
                data,
                spacing,
            })
        } else {
            Err(ConfigError::InvalidSpacing(spacing))
        }
    }

    /// 创建体素分辨率为 1mm 各向同性的影像体积.
    #[inline]
    pub fn isotropic(data: Array3<f32>) -> Self {
        Self {
            id: next_grid_id(),
            data,
            spacing: [1.0; 3],
        }
    }

    /// 获取单个体素分辨率, 以毫米为单位, 按 `(z, y, x)` 给出.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 身份标识. 克隆得到的体积共享同一标识.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// 包围盒, 两端均为闭区间.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoundingBox {
    /// 各轴最小索引.
    pub lo: Idx3d,

    /// 各轴最大索引.
    pub hi: Idx3d,
}

impl BoundingBox {
    /// 各轴向外扩张 `margin` 个体素, 结果被限制在 `shape` 之内.
    pub fn widen(&self, (mz, my, mx): Idx3d, (nz, ny, nx): Idx3d) -> Self {
        Self {
            lo: (
                self.lo.0.saturating_sub(mz),
                self.lo.1.saturating_sub(my),
                self.lo.2.saturating_sub(mx),
            ),
            hi: (
                self.hi.0.saturating_add(mz).min(nz - 1),
                self.hi.1.saturating_add(my).min(ny - 1),
                self.hi.2.saturating_add(mx).min(nx - 1),
            ),
        }
    }

    /// 包围盒的形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (
            self.hi.0 - self.lo.0 + 1,
            self.hi.1 - self.lo.1 + 1,
            self.hi.2 - self.lo.2 + 1,
        )
    }
}

/// 感兴趣区域 (ROI) 掩膜. `true` 代表体素在 ROI 内.
///
/// 相等性只比较掩膜内容, 不比较身份标识.
#[derive(Debug, Clone, Eq)]
pub struct RoiMask {
    id: u64,
    data: Array3<bool>,
}

impl PartialEq for RoiMask {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl VoxelGrid for RoiMask {
    #[inline]
    fn shape(&self) -> Idx3d {
        dim_to_idx3d(self.data.shape())
    }
}

impl Index<Idx3d> for RoiMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl RoiMask {
    /// 由布尔数组直接创建掩膜.
    #[inline]
    pub fn new(data: Array3<bool>) -> Self {
        Self {
            id: next_grid_id(),
            data,
        }
    }

    /// 由整数编码的标签体积创建掩膜, 值为 `label` 的体素属于 ROI.
    pub fn from_labels(labels: ArrayView3<u8>, label: u8) -> Self {
        Self::new(labels.mapv(|p| p == label))
    }

    /// 形状为 `shape` 且全部体素都在 ROI 内的掩膜.
    #[inline]
    pub fn full(shape: Idx3d) -> Self {
        Self::new(Array3::from_elem(shape, true))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// 身份标识. 克隆得到的掩膜共享同一标识.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// ROI 内体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// ROI 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|p| *p)
    }

    /// 收集所有 ROI 体素对应的下标, 结果按行优先存储.
    pub fn positions(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, p)| p.then_some(pos))
            .collect()
    }

    /// ROI 的最小包围盒. ROI 为空时返回 `None`.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut it = self
            .data
            .indexed_iter()
            .filter_map(|(pos, p)| p.then_some(pos));
        let first = it.next()?;
        let (lo, hi) = it.fold((first, first), |(lo, hi), (z, y, x)| {
            (
                (lo.0.min(z), lo.1.min(y), lo.2.min(x)),
                (hi.0.max(z), hi.1.max(y), hi.2.max(x)),
            )
        });
        Some(BoundingBox { lo, hi })
    }
}

/// ROI 表格视图中的一行: 体素在 (裁剪后) 图像中的索引, 以及它的离散灰度.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RoiVoxel {
    /// 体素索引.
    pub pos: Idx3d,

    /// 离散灰度, 位于 `[1, n_g]`.
    pub grey: u32,
}

/// 离散化并裁剪后的图像.
///
/// ROI 内每个体素的灰度都位于 `[1, n_g]`; ROI 外的体素以 `0` 占位,
/// 不会参与任何矩阵统计. 该结构按完整内容实现 `Hash + Eq`.
/// 内容哈希在构造时计算一次, 之后 `Hash` 只写入这个值.
#[derive(Debug, Clone, Eq)]
pub struct DiscretizedImage {
    grey: Array3<u32>,
    mask: Array3<bool>,
    n_g: u32,
    content_hash: u64,
}

impl PartialEq for DiscretizedImage {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash
            && self.n_g == other.n_g
            && self.grey == other.grey
            && self.mask == other.mask
    }
}

impl Hash for DiscretizedImage {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.content_hash);
    }
}

fn content_hash(grey: &Array3<u32>, mask: &Array3<bool>, n_g: u32) -> u64 {
    let mut h = DefaultHasher::new();
    grey.hash(&mut h);
    mask.hash(&mut h);
    n_g.hash(&mut h);
    h.finish()
}

impl VoxelGrid for DiscretizedImage {
    #[inline]
    fn shape(&self) -> Idx3d {
        dim_to_idx3d(self.grey.shape())
    }
}

impl DiscretizedImage {
    /// 由已经离散化的灰度体积和掩膜直接创建.
    ///
    /// ROI 内的灰度必须不小于 1, 否则返回 `Err`. `n_g` 取 ROI 内的最大灰度 (至少为 1).
    pub fn new(grey: Array3<u32>, mask: Array3<bool>) -> TextureResult<Self> {
        if grey.shape() != mask.shape() {
            return Err(TextureError::ShapeMismatch(
                dim_to_idx3d(grey.shape()),
                dim_to_idx3d(mask.shape()),
            ));
        }
        let mut grey = grey;
        let mut n_g = 1;
        for ((pos, g), &m) in grey.indexed_iter_mut().zip(mask.iter()) {
            if !m {
                *g = 0;
            } else if *g == 0 {
                return Err(TextureError::InvalidGreyLevel { pos, value: 0.0 });
            } else {
                n_g = n_g.max(*g);
            }
        }
        Ok(Self::from_raw(grey, mask, n_g))
    }

    /// 内部构造. 调用者保证不变量成立.
    #[inline]
    pub(crate) fn from_raw(grey: Array3<u32>, mask: Array3<bool>, n_g: u32) -> Self {
        debug_assert_eq!(grey.shape(), mask.shape());
        debug_assert!(Zip::from(&grey)
            .and(&mask)
            .all(|&g, &m| if m { (1..=n_g).contains(&g) } else { g == 0 }));
        let content_hash = content_hash(&grey, &mask, n_g);
        Self {
            grey,
            mask,
            n_g,
            content_hash,
        }
    }

    /// 形状为 `(0, 0, 0)` 的空图像.
    #[inline]
    pub(crate) fn empty(n_g: u32) -> Self {
        Self::from_raw(
            Array3::zeros((0, 0, 0)),
            Array3::from_elem((0, 0, 0), false),
            n_g.max(1),
        )
    }

    /// 灰度级数量.
    #[inline]
    pub fn n_g(&self) -> u32 {
        self.n_g
    }

    /// 构造时计算的内容哈希.
    #[inline]
    pub(crate) fn content_hash(&self) -> u64 {
        self.content_hash
    }

    /// 获取 `pos` 处体素的灰度. 越界或在 ROI 外时返回 `None`.
    #[inline]
    pub fn grey_at(&self, pos: Idx3d) -> Option<u32> {
        match self.mask.get(pos) {
            Some(true) => Some(self.grey[pos]),
            _ => None,
        }
    }

    /// ROI 内体素个数.
    #[inline]
    pub fn roi_count(&self) -> usize {
        self.mask.iter().filter(|p| **p).count()
    }

    /// ROI 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.mask.iter().any(|p| *p)
    }

    /// 以行优先序迭代所有 ROI 体素 (表格视图).
    pub fn roi_voxels(&self) -> impl Iterator<Item = RoiVoxel> + '_ {
        self.grey
            .indexed_iter()
            .zip(self.mask.iter())
            .filter_map(|((pos, &grey), &m)| m.then_some(RoiVoxel { pos, grey }))
    }

    /// 获得离散灰度的一份不可变 shallow copy. ROI 外的体素为 `0`.
    #[inline]
    pub fn grey(&self) -> ArrayView3<'_, u32> {
        self.grey.view()
    }

    /// 获得掩膜的一份不可变 shallow copy.
    #[inline]
    pub fn mask(&self) -> ArrayView3<'_, bool> {
        self.mask.view()
    }
}

/// 将 `volume` 和 `mask` 裁剪到 ROI 包围盒 (再各向外扩张 `margin` 个体素).
///
/// ROI 为空时返回 `None`.
pub(crate) fn crop_to_roi<'a>(
    volume: &'a Volume,
    mask: &RoiMask,
    margin: Idx3d,
) -> Option<(Idx3d, ArrayView3<'a, f32>, Array3<bool>)> {
    let bb = mask.bounding_box()?.widen(margin, mask.shape());
    let (lo, hi) = (bb.lo, bb.hi);
    let data = volume
        .data
        .slice(s![lo.0..=hi.0, lo.1..=hi.1, lo.2..=hi.2]);
    let roi = mask
        .data
        .slice(s![lo.0..=hi.0, lo.1..=hi.1, lo.2..=hi.2])
        .to_owned();
    Some((lo, data, roi))
}
