//! 纹理特征提取.
//!
//! [`Extractor`] 为每个矩阵族持有一个 [`MatrixCache`], 逐个计算特征.
//! 同一 (图像, 掩膜) 下共享离散化参数和空间聚合方法的特征只构建一次矩阵.
//! 多病例并行时每个工作线程持有自己的 [`Extractor`], 互不共享缓存.

use log::{debug, info};

use crate::cache::MatrixCache;
use crate::data::{RoiMask, Volume, VoxelGrid};
use crate::error::{TextureError, TextureResult};
use crate::feature::{
    CmFeature, Feature, FeatureGenerator, FeatureSettings, FeatureValue, RlmFeature,
};
use crate::matrix::{Glcm, Rlm};

/// 任一矩阵族的参数化特征.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AnyFeature {
    /// 游程长度矩阵特征.
    Rlm(Feature<RlmFeature>),

    /// 共生矩阵特征.
    Cm(Feature<CmFeature>),
}

impl AnyFeature {
    /// 可读名称.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rlm(f) => f.name(),
            Self::Cm(f) => f.name(),
        }
    }

    /// 缩写名.
    pub fn abbr_name(&self) -> &'static str {
        match self {
            Self::Rlm(f) => f.abbr_name(),
            Self::Cm(f) => f.abbr_name(),
        }
    }

    /// 特征参数.
    pub fn settings(&self) -> &FeatureSettings {
        match self {
            Self::Rlm(f) => f.settings(),
            Self::Cm(f) => f.settings(),
        }
    }

    /// 最近一次计算的结果.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Rlm(f) => f.value(),
            Self::Cm(f) => f.value(),
        }
    }

    /// 导出为结果行.
    pub fn to_value(&self) -> FeatureValue {
        match self {
            Self::Rlm(f) => f.to_value(),
            Self::Cm(f) => f.to_value(),
        }
    }
}

impl From<Feature<RlmFeature>> for AnyFeature {
    fn from(f: Feature<RlmFeature>) -> Self {
        Self::Rlm(f)
    }
}

impl From<Feature<CmFeature>> for AnyFeature {
    fn from(f: Feature<CmFeature>) -> Self {
        Self::Cm(f)
    }
}

/// 特征提取器.
#[derive(Debug, Default)]
pub struct Extractor {
    rlm: MatrixCache<Rlm>,
    cm: MatrixCache<Glcm>,
}

impl Extractor {
    /// 创建缓存为空的提取器.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算单个特征, 结果同时写回 `feature`.
    pub fn compute(
        &mut self,
        feature: &mut AnyFeature,
        volume: &Volume,
        mask: &RoiMask,
    ) -> TextureResult<f64> {
        match feature {
            AnyFeature::Rlm(f) => f.compute(volume, mask, &mut self.rlm),
            AnyFeature::Cm(f) => f.compute(volume, mask, &mut self.cm),
        }
    }

    /// 在一对 (图像, 掩膜) 上计算全部 `features`, 然后清空缓存.
    ///
    /// 任何一个特征出错都会中止提取并返回该错误.
    pub fn extract(
        &mut self,
        volume: &Volume,
        mask: &RoiMask,
        features: &mut [AnyFeature],
    ) -> TextureResult<Vec<FeatureValue>> {
        if volume.shape() != mask.shape() {
            return Err(TextureError::ShapeMismatch(volume.shape(), mask.shape()));
        }
        info!(
            "extracting {} features ({} of {} voxels in ROI)",
            features.len(),
            mask.count(),
            mask.size()
        );
        let values = features
            .iter_mut()
            .map(|f| self.compute(f, volume, mask).map(|_| f.to_value()))
            .collect();
        debug!("cache after extraction: {:?}, {:?}", self.rlm, self.cm);
        self.clear_cache();
        values
    }

    /// 以 `generator` 生成的全部特征提取.
    pub fn extract_with(
        &mut self,
        volume: &Volume,
        mask: &RoiMask,
        generator: &FeatureGenerator,
    ) -> TextureResult<Vec<FeatureValue>> {
        let mut features = generator.generate();
        self.extract(volume, mask, &mut features)
    }

    /// 清空全部缓存.
    pub fn clear_cache(&mut self) {
        self.rlm.clear();
        self.cm.clear();
    }

    /// 游程长度矩阵缓存.
    #[inline]
    pub fn rlm_cache(&self) -> &MatrixCache<Rlm> {
        &self.rlm
    }

    /// 共生矩阵缓存.
    #[inline]
    pub fn cm_cache(&self) -> &MatrixCache<Glcm> {
        &self.cm
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

        /// 借助 `rayon`, 并行地对多个病例提取特征.
        ///
        /// 并行粒度为病例: 每个工作线程持有自己的 [`Extractor`].
        /// 结果顺序与 `cases` 一致.
        pub fn par_extract(
            cases: &[(Volume, RoiMask)],
            generator: &FeatureGenerator,
        ) -> Vec<TextureResult<Vec<FeatureValue>>> {
            cases
                .par_iter()
                .map_init(Extractor::new, |extractor, (volume, mask)| {
                    extractor.extract_with(volume, mask, generator)
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Discretisation;
    use crate::feature::FeatureKind;
    use crate::spatial::SpatialMethod;
    use ndarray::Array3;

    fn case() -> (Volume, RoiMask) {
        let data = Array3::from_shape_fn((3, 4, 4), |(z, y, x)| ((z + y * x) % 5) as f32);
        (Volume::isotropic(data), RoiMask::full((3, 4, 4)))
    }

    fn rlm_features(method: SpatialMethod) -> Vec<AnyFeature> {
        let settings =
            FeatureSettings::new(Discretisation::fixed_bin_number(4).unwrap(), method);
        RlmFeature::ALL
            .iter()
            .map(|k| Feature::new(*k, settings).into())
            .collect()
    }

    #[test]
    fn test_shared_matrices() {
        let (volume, mask) = case();
        let mut ex = Extractor::new();
        let mut features = rlm_features(SpatialMethod::Average3d);
        let values = ex.extract(&volume, &mask, &mut features).unwrap();
        assert_eq!(values.len(), 16);
        assert_eq!(ex.rlm_cache().discretisations(), 1);
        assert_eq!(ex.rlm_cache().constructions(), 1);
        assert_eq!(ex.rlm_cache().hits(), 15);
        assert!(ex.rlm_cache().is_empty());
        assert!(features.iter().all(|f| f.value().is_some()));
    }

    #[test]
    fn test_discretise_once_across_methods() {
        let (volume, mask) = case();
        let mut ex = Extractor::new();
        let mut features = rlm_features(SpatialMethod::Average3d);
        features.extend(rlm_features(SpatialMethod::Slice2d));
        features.extend(rlm_features(SpatialMethod::VolumeMerge25d));
        ex.extract(&volume, &mask, &mut features).unwrap();
        assert_eq!(ex.rlm_cache().discretisations(), 1);
        assert_eq!(ex.rlm_cache().constructions(), 3);
        assert_eq!(ex.cm_cache().discretisations(), 0);

        // 清空缓存后, 下一对 (图像, 掩膜) 重新离散化.
        ex.extract(&volume, &mask, &mut features).unwrap();
        assert_eq!(ex.rlm_cache().discretisations(), 2);
    }

    #[test]
    fn test_idempotent() {
        let (volume, mask) = case();
        let mut ex = Extractor::new();
        let mut features = rlm_features(SpatialMethod::SliceMerge2d);
        let a = ex.extract(&volume, &mask, &mut features).unwrap();
        let b = ex.extract(&volume, &mask, &mut features).unwrap();
        for (a, b) in a.iter().zip(&b) {
            assert_eq!(a.value.to_bits(), b.value.to_bits());
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let (volume, _) = case();
        let mask = RoiMask::full((3, 4, 5));
        let mut features = rlm_features(SpatialMethod::Slice2d);
        assert_eq!(
            Extractor::new().extract(&volume, &mask, &mut features),
            Err(TextureError::ShapeMismatch((3, 4, 4), (3, 4, 5)))
        );
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_extract_matches_serial() {
        use crate::feature::ExtractionSettings;

        let settings = ExtractionSettings {
            discretisation: vec![crate::feature::DiscretisationSpec::fixed_bin_number(8)],
            rlm_spatial_methods: vec![SpatialMethod::DirectionMerge25d],
            cm_spatial_methods: vec![SpatialMethod::Slice2d],
            features: None,
        };
        let gen = FeatureGenerator::new(&settings).unwrap();
        let cases = vec![case(), case(), case()];
        let par = par_extract(&cases, &gen);
        let serial = Extractor::new()
            .extract_with(&cases[0].0, &cases[0].1, &gen)
            .unwrap();
        assert_eq!(par.len(), 3);
        for res in par {
            let res = res.unwrap();
            assert_eq!(res.len(), gen.len());
            for (a, b) in res.iter().zip(&serial) {
                assert_eq!(a.value.to_bits(), b.value.to_bits());
            }
        }
    }
}
