//! 纹理特征.
//!
//! 每个矩阵族的全部特征公式由一个枚举 (实现 [`FeatureKind`]) 描述,
//! 每个公式都是 "定型矩阵 -> 标量" 的纯函数. 空矩阵统一由
//! [`evaluate`] 处理为 `NaN`, 各个公式不必重复检查.

use std::fmt;
use std::hash::Hash;

use log::debug;
use num::Float;

use crate::cache::MatrixCache;
use crate::data::{Discretisation, RoiMask, Volume};
use crate::error::{ConfigResult, TextureResult};
use crate::matrix::{FinalizedMatrix, MatrixFamily};
use crate::spatial::SpatialMethod;

pub mod cm;
pub mod generate;
pub mod rlm;

pub use cm::CmFeature;
pub use generate::{DiscretisationSpec, ExtractionSettings, FeatureGenerator};
pub use rlm::RlmFeature;

/// 某个矩阵族的特征公式集合.
pub trait FeatureKind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// 特征所依赖的矩阵族.
    type Family: MatrixFamily;

    /// 该族的全部特征.
    const ALL: &'static [Self];

    /// 可读名称.
    fn name(&self) -> &'static str;

    /// 缩写名, 如 `rlm_sre`.
    fn abbr_name(&self) -> &'static str;

    /// IBSI 特征标识码.
    fn ibsi_id(&self) -> &'static str;

    /// 是否符合 IBSI 标准.
    #[inline]
    fn ibsi_compliant(&self) -> bool {
        true
    }

    /// 由缩写名查找特征.
    fn from_abbr(abbr: &str) -> Option<Self>;

    /// 在非空矩阵上计算特征值.
    fn formula(&self, matrix: &<Self::Family as MatrixFamily>::Matrix) -> f64;
}

/// 在单个矩阵上计算特征值. 空矩阵返回 `NaN`.
#[inline]
pub fn evaluate<K: FeatureKind>(kind: K, matrix: &<K::Family as MatrixFamily>::Matrix) -> f64 {
    if matrix.is_empty() {
        f64::NAN
    } else {
        kind.formula(matrix)
    }
}

/// 忽略 `NaN` 的算术平均. 全部为 `NaN` 或没有元素时返回 `NaN`.
pub fn nanmean<T: Float, I: IntoIterator<Item = T>>(values: I) -> T {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((T::zero(), 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        return T::nan();
    }
    <T as num::NumCast>::from(n).map_or_else(T::nan, |n| sum / n)
}

/// 特征的离散化参数和空间聚合方法.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FeatureSettings {
    /// 离散化方法.
    pub discretisation: Discretisation,

    /// 空间聚合方法.
    pub spatial_method: SpatialMethod,
}

impl FeatureSettings {
    /// 直接由类型化参数创建.
    #[inline]
    pub fn new(discretisation: Discretisation, spatial_method: SpatialMethod) -> Self {
        Self {
            discretisation,
            spatial_method,
        }
    }

    /// 按配置名称创建. 任何非法参数都会立即返回 `Err`.
    pub fn from_config(
        discretisation_method: &str,
        bin_width: Option<f64>,
        bin_number: Option<u32>,
        spatial_method: &str,
    ) -> ConfigResult<Self> {
        Ok(Self {
            discretisation: Discretisation::from_parts(
                discretisation_method,
                bin_width,
                bin_number,
            )?,
            spatial_method: spatial_method.parse()?,
        })
    }
}

/// 一个参数化的特征: 特征公式 + 离散化参数 + 空间聚合方法.
///
/// 除了 [`Feature::compute`] 写入的特征值外没有其他状态.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Feature<K: FeatureKind> {
    kind: K,
    settings: FeatureSettings,
    value: Option<f64>,
}

impl<K: FeatureKind> Feature<K> {
    /// 创建特征.
    #[inline]
    pub fn new(kind: K, settings: FeatureSettings) -> Self {
        Self {
            kind,
            settings,
            value: None,
        }
    }

    /// 特征公式.
    #[inline]
    pub fn kind(&self) -> K {
        self.kind
    }

    /// 特征参数.
    #[inline]
    pub fn settings(&self) -> &FeatureSettings {
        &self.settings
    }

    /// 可读名称.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// 缩写名.
    #[inline]
    pub fn abbr_name(&self) -> &'static str {
        self.kind.abbr_name()
    }

    /// IBSI 特征标识码.
    #[inline]
    pub fn ibsi_id(&self) -> &'static str {
        self.kind.ibsi_id()
    }

    /// 是否符合 IBSI 标准.
    #[inline]
    pub fn ibsi_compliant(&self) -> bool {
        self.kind.ibsi_compliant()
    }

    /// 最近一次 [`Feature::compute`] 的结果. 尚未计算时为 `None`.
    #[inline]
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// 计算特征值: 从 `cache` 获取 (或构建) 离散化图像和矩阵, 在每个矩阵上求值,
    /// 最后以 `nanmean` 在特征值层面取平均.
    ///
    /// 退化 ROI 得到 `NaN`, 不会返回 `Err`. `Err` 只来自图像与掩膜不匹配,
    /// 或未离散化图像中出现非法灰度.
    pub fn compute(
        &mut self,
        volume: &Volume,
        mask: &RoiMask,
        cache: &mut MatrixCache<K::Family>,
    ) -> TextureResult<f64> {
        let image = cache.discretise(self.settings.discretisation, volume, mask)?;
        let matrices = cache.get_or_build(&image, self.settings.spatial_method);
        let value = nanmean(matrices.iter().map(|m| evaluate(self.kind, m)));
        if value.is_nan() {
            debug!(
                "{} is NaN ({}, {})",
                self.abbr_name(),
                self.settings.discretisation,
                self.settings.spatial_method
            );
        }
        self.value = Some(value);
        Ok(value)
    }

    /// 导出为结果行. 尚未计算时特征值为 `NaN`.
    pub fn to_value(&self) -> FeatureValue {
        FeatureValue {
            name: self.name(),
            abbr_name: self.abbr_name(),
            ibsi_id: self.ibsi_id(),
            ibsi_compliant: self.ibsi_compliant(),
            spatial_method: self.settings.spatial_method,
            discretisation: self.settings.discretisation.to_string(),
            value: self.value.unwrap_or(f64::NAN),
        }
    }
}

/// 特征结果行, 交给下游的报告/统计模块.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeatureValue {
    /// 可读名称.
    pub name: &'static str,

    /// 缩写名.
    pub abbr_name: &'static str,

    /// IBSI 特征标识码.
    pub ibsi_id: &'static str,

    /// 是否符合 IBSI 标准.
    pub ibsi_compliant: bool,

    /// 空间聚合方法.
    pub spatial_method: SpatialMethod,

    /// 离散化参数标签, 如 `fbn_32`.
    pub discretisation: String,

    /// 特征值, 可能为 `NaN`.
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_nanmean() {
        assert_eq!(nanmean([1.0, f64::NAN, 3.0]), 2.0);
        assert!(nanmean([f64::NAN, f64::NAN]).is_nan());
        assert!(nanmean(Vec::<f32>::new()).is_nan());
        assert_eq!(nanmean([0.5f32]), 0.5);
    }

    #[test]
    fn test_settings_from_config() {
        let s = FeatureSettings::from_config("fixed_bin_number", None, Some(32), "3d_average")
            .unwrap();
        assert_eq!(s.spatial_method, SpatialMethod::Average3d);
        assert_eq!(s.discretisation.to_string(), "fbn_32");

        assert_eq!(
            FeatureSettings::from_config("fixed_bin_size", Some(0.0), None, "2d_slice"),
            Err(ConfigError::NonPositiveBinWidth(0.0))
        );
        assert_eq!(
            FeatureSettings::from_config("none", None, None, "2d"),
            Err(ConfigError::UnknownSpatialMethod("2d".to_string()))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_value_row_to_json() {
        let s = FeatureSettings::from_config("fixed_bin_number", None, Some(32), "3d_average")
            .unwrap();
        let row = Feature::new(RlmFeature::ShortRunEmphasis, s).to_value();
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["abbr_name"], "rlm_sre");
        assert_eq!(v["ibsi_id"], "22OV");
        assert_eq!(v["spatial_method"], "3d_average");
        assert_eq!(v["discretisation"], "fbn_32");
        // 尚未计算, `NaN` 序列化为 `null`.
        assert!(v["value"].is_null());
    }
}
