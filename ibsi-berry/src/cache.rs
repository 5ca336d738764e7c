//! 矩阵计算缓存.
//!
//! 同一组离散化参数和空间聚合方法下的所有特征共享同一组矩阵.
//! 缓存分两层:
//!
//! 1. 离散化图像, 以 (图像标识, 掩膜标识, 离散化参数) 为键;
//! 2. 定型矩阵, 以离散化图像的内容哈希加空间聚合方法为键, 命中时再逐项比较内容.
//!
//! 两层都与请求它的特征无关. 命中时不会复制或重新哈希图像数据.
//!
//! # 注意
//!
//! 1. 缓存没有容量上限. 处理完一对 (图像, 掩膜) 后应调用 [`MatrixCache::clear`].
//! 2. 缓存不是线程共享的. 并行提取时每个工作线程应持有自己的缓存实例.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use log::trace;

use crate::data::{Discretisation, DiscretizedImage, RoiMask, Volume};
use crate::error::TextureResult;
use crate::matrix::{build_matrices, MatrixFamily};
use crate::spatial::SpatialMethod;

/// 离散化结果的键. [`Volume`] 和 [`RoiMask`] 创建后不可变, 以标识区分即可.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
struct ImageKey {
    volume: u64,
    mask: u64,
    discretisation: Discretisation,
}

/// 同一哈希桶中的一个条目. 保留图像本身, 用于排除哈希碰撞.
struct Entry<M> {
    image: Arc<DiscretizedImage>,
    matrices: Arc<[M]>,
}

/// 某个矩阵族的矩阵缓存.
pub struct MatrixCache<F: MatrixFamily> {
    images: HashMap<ImageKey, Arc<DiscretizedImage>>,
    entries: HashMap<(u64, SpatialMethod), Vec<Entry<F::Matrix>>>,
    discretisations: usize,
    constructions: usize,
    hits: usize,
    _family: PhantomData<F>,
}

impl<F: MatrixFamily> Default for MatrixCache<F> {
    fn default() -> Self {
        Self {
            images: HashMap::new(),
            entries: HashMap::new(),
            discretisations: 0,
            constructions: 0,
            hits: 0,
            _family: PhantomData,
        }
    }
}

impl<F: MatrixFamily> fmt::Debug for MatrixCache<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixCache")
            .field("family", &F::NAME)
            .field("images", &self.images.len())
            .field("entries", &self.len())
            .field("discretisations", &self.discretisations)
            .field("constructions", &self.constructions)
            .field("hits", &self.hits)
            .finish()
    }
}

impl<F: MatrixFamily> MatrixCache<F> {
    /// 创建空缓存.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 `discretisation` 离散化 `volume` 中由 `mask` 给出的 ROI,
    /// 包围盒外扩距离取矩阵族的 [`MatrixFamily::CROPPING_DISTANCE`].
    ///
    /// 同一对 (图像, 掩膜) 和同一离散化参数只会离散化一次.
    pub fn discretise(
        &mut self,
        discretisation: Discretisation,
        volume: &Volume,
        mask: &RoiMask,
    ) -> TextureResult<Arc<DiscretizedImage>> {
        let key = ImageKey {
            volume: volume.id(),
            mask: mask.id(),
            discretisation,
        };
        if let Some(image) = self.images.get(&key) {
            return Ok(Arc::clone(image));
        }

        trace!("{}: discretising ({discretisation})", F::NAME);
        self.discretisations += 1;
        let image = Arc::new(discretisation.discretise(volume, mask, F::CROPPING_DISTANCE)?);
        self.images.insert(key, Arc::clone(&image));
        Ok(image)
    }

    /// 获取 `image` 在 `method` 下的全部定型矩阵. 未命中时构建并缓存.
    pub fn get_or_build(
        &mut self,
        image: &Arc<DiscretizedImage>,
        method: SpatialMethod,
    ) -> Arc<[F::Matrix]> {
        let bucket = self
            .entries
            .entry((image.content_hash(), method))
            .or_default();
        if let Some(hit) = bucket
            .iter()
            .find(|e| Arc::ptr_eq(&e.image, image) || e.image == *image)
        {
            self.hits += 1;
            trace!("{}: cache hit ({method})", F::NAME);
            return Arc::clone(&hit.matrices);
        }

        trace!("{}: cache miss, building matrices ({method})", F::NAME);
        self.constructions += 1;
        let matrices: Arc<[F::Matrix]> = build_matrices::<F>(image, method).into();
        bucket.push(Entry {
            image: Arc::clone(image),
            matrices: Arc::clone(&matrices),
        });
        matrices
    }

    /// 清空缓存 (包括离散化图像). 计数器不会被重置.
    pub fn clear(&mut self) {
        trace!(
            "{}: clearing {} images and {} cache entries",
            F::NAME,
            self.images.len(),
            self.len()
        );
        self.images.clear();
        self.entries.clear();
    }

    /// 当前缓存的矩阵条目数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// 缓存是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.len() == 0
    }

    /// 离散化实际执行的次数.
    #[inline]
    pub fn discretisations(&self) -> usize {
        self.discretisations
    }

    /// 矩阵流水线实际执行的次数.
    #[inline]
    pub fn constructions(&self) -> usize {
        self.constructions
    }

    /// 缓存命中次数.
    #[inline]
    pub fn hits(&self) -> usize {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Rlm;
    use ndarray::Array3;

    fn image(level: u32) -> Arc<DiscretizedImage> {
        let image = DiscretizedImage::new(
            Array3::from_elem((2, 3, 3), level),
            Array3::from_elem((2, 3, 3), true),
        )
        .unwrap();
        Arc::new(image)
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = MatrixCache::<Rlm>::new();
        let a = cache.get_or_build(&image(1), SpatialMethod::Average3d);
        // 内容相同但不是同一个对象, 仍然命中.
        let b = cache.get_or_build(&image(1), SpatialMethod::Average3d);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 13);
        assert_eq!((cache.constructions(), cache.hits()), (1, 1));

        // 内容或方法不同都会重新构建.
        cache.get_or_build(&image(2), SpatialMethod::Average3d);
        cache.get_or_build(&image(1), SpatialMethod::VolumeMerge3d);
        assert_eq!(cache.constructions(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_discretise_once_per_input() {
        let volume = Volume::isotropic(Array3::from_shape_fn((2, 3, 3), |(z, y, x)| {
            (z + y * x) as f32
        }));
        let mask = RoiMask::full((2, 3, 3));
        let fbn = Discretisation::fixed_bin_number(4).unwrap();
        let mut cache = MatrixCache::<Rlm>::new();

        let a = cache.discretise(fbn, &volume, &mask).unwrap();
        let b = cache.discretise(fbn, &volume, &mask).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.discretisations(), 1);

        // 克隆的体积与原体积共享结果.
        cache.discretise(fbn, &volume.clone(), &mask).unwrap();
        assert_eq!(cache.discretisations(), 1);

        cache.discretise(Discretisation::None, &volume, &mask).unwrap();
        let other = Volume::isotropic(volume.data().to_owned());
        let c = cache.discretise(fbn, &other, &mask).unwrap();
        assert_eq!(cache.discretisations(), 3);

        // 新体积内容相同, 矩阵仍然共享.
        cache.get_or_build(&a, SpatialMethod::Slice2d);
        cache.get_or_build(&c, SpatialMethod::Slice2d);
        assert_eq!((cache.constructions(), cache.hits()), (1, 1));
    }

    #[test]
    fn test_clear() {
        let volume = Volume::isotropic(Array3::from_elem((2, 3, 3), 1.0));
        let mask = RoiMask::full((2, 3, 3));
        let mut cache = MatrixCache::<Rlm>::new();
        let img = cache.discretise(Discretisation::None, &volume, &mask).unwrap();
        cache.get_or_build(&img, SpatialMethod::Slice2d);
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());

        let img = cache.discretise(Discretisation::None, &volume, &mask).unwrap();
        cache.get_or_build(&img, SpatialMethod::Slice2d);
        assert_eq!(cache.discretisations(), 2);
        assert_eq!(cache.constructions(), 2);
    }
}
