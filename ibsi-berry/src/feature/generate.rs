//! 由提取配置生成参数化特征.

use itertools::{iproduct, Itertools};
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{CmFeature, Feature, FeatureKind, FeatureSettings, RlmFeature};
use crate::data::Discretisation;
use crate::error::{ConfigError, ConfigResult};
use crate::extract::AnyFeature;
use crate::spatial::SpatialMethod;

/// 一组离散化参数的配置形式.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscretisationSpec {
    /// `fixed_bin_number`, `fixed_bin_size` 或 `none`.
    pub method: String,

    /// FBS 的 bin 宽度.
    pub bin_width: Option<f64>,

    /// FBN 的 bin 数量.
    pub bin_number: Option<u32>,

    /// FBS 第一个 bin 的下界. 缺省时取 ROI 内的最小灰度.
    pub lower_bound: Option<f64>,
}

impl DiscretisationSpec {
    /// 固定 bin 数量.
    pub fn fixed_bin_number(bin_number: u32) -> Self {
        Self {
            method: "fixed_bin_number".to_string(),
            bin_width: None,
            bin_number: Some(bin_number),
            lower_bound: None,
        }
    }

    /// 固定 bin 宽度.
    pub fn fixed_bin_size(bin_width: f64, lower_bound: Option<f64>) -> Self {
        Self {
            method: "fixed_bin_size".to_string(),
            bin_width: Some(bin_width),
            bin_number: None,
            lower_bound,
        }
    }

    /// 解析为 [`Discretisation`].
    pub fn build(&self) -> ConfigResult<Discretisation> {
        match (
            Discretisation::from_parts(&self.method, self.bin_width, self.bin_number)?,
            self.lower_bound,
        ) {
            (Discretisation::FixedBinSize { bin_width, .. }, Some(lb)) => {
                Discretisation::fixed_bin_size(bin_width.0, Some(lb))
            }
            (d, _) => Ok(d),
        }
    }
}

/// 纹理特征提取配置.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtractionSettings {
    /// 离散化参数列表.
    #[cfg_attr(feature = "serde", serde(default))]
    pub discretisation: Vec<DiscretisationSpec>,

    /// 游程长度矩阵特征使用的空间聚合方法.
    #[cfg_attr(feature = "serde", serde(default))]
    pub rlm_spatial_methods: Vec<SpatialMethod>,

    /// 共生矩阵特征使用的空间聚合方法.
    #[cfg_attr(feature = "serde", serde(default))]
    pub cm_spatial_methods: Vec<SpatialMethod>,

    /// 需要的特征缩写名. `None` 表示全部特征.
    pub features: Option<Vec<String>>,
}

impl ExtractionSettings {
    /// 检查配置并解析全部离散化参数.
    ///
    /// 未知的特征缩写名返回 [`ConfigError::UnknownFeature`].
    pub fn validate(&self) -> ConfigResult<Vec<Discretisation>> {
        if let Some(names) = &self.features {
            if let Some(bad) = names
                .iter()
                .find(|n| RlmFeature::from_abbr(n).is_none() && CmFeature::from_abbr(n).is_none())
            {
                return Err(ConfigError::UnknownFeature(bad.clone()));
            }
        }
        self.discretisation
            .iter()
            .map(DiscretisationSpec::build)
            .collect()
    }
}

/// 选出某个族中被请求的特征, 保持请求顺序并去重. 其它族的名字被忽略.
fn select<K: FeatureKind>(names: Option<&[String]>) -> Vec<K> {
    match names {
        None => K::ALL.to_vec(),
        Some(names) => names
            .iter()
            .filter_map(|n| K::from_abbr(n))
            .unique()
            .collect(),
    }
}

/// 特征生成器.
///
/// 对 "离散化参数 × 空间聚合方法 × 特征公式" 做笛卡尔积. 生成器本身不可变,
/// 每次调用 [`FeatureGenerator::iter`] 都从头开始.
#[derive(Clone, Debug)]
pub struct FeatureGenerator {
    discretisations: Vec<Discretisation>,
    rlm_methods: Vec<SpatialMethod>,
    cm_methods: Vec<SpatialMethod>,
    rlm_kinds: Vec<RlmFeature>,
    cm_kinds: Vec<CmFeature>,
}

impl FeatureGenerator {
    /// 由提取配置创建生成器. 配置非法时返回 `Err`.
    pub fn new(settings: &ExtractionSettings) -> ConfigResult<Self> {
        let discretisations = settings.validate()?;
        let names = settings.features.as_deref();
        let gen = Self {
            discretisations,
            rlm_methods: settings.rlm_spatial_methods.iter().copied().unique().collect(),
            cm_methods: settings.cm_spatial_methods.iter().copied().unique().collect(),
            rlm_kinds: select(names),
            cm_kinds: select(names),
        };
        debug!("feature generator: {} features", gen.len());
        Ok(gen)
    }

    /// 遍历全部参数化特征. 先游程长度矩阵特征, 后共生矩阵特征.
    pub fn iter(&self) -> impl Iterator<Item = AnyFeature> + '_ {
        let rlm = iproduct!(&self.discretisations, &self.rlm_methods, &self.rlm_kinds).map(
            |(d, m, k)| AnyFeature::Rlm(Feature::new(*k, FeatureSettings::new(*d, *m))),
        );
        let cm = iproduct!(&self.discretisations, &self.cm_methods, &self.cm_kinds)
            .map(|(d, m, k)| AnyFeature::Cm(Feature::new(*k, FeatureSettings::new(*d, *m))));
        rlm.chain(cm)
    }

    /// 生成的特征个数.
    pub fn len(&self) -> usize {
        self.discretisations.len()
            * (self.rlm_methods.len() * self.rlm_kinds.len()
                + self.cm_methods.len() * self.cm_kinds.len())
    }

    /// 是否不生成任何特征.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 收集全部特征.
    #[inline]
    pub fn generate(&self) -> Vec<AnyFeature> {
        self.iter().collect()
    }
}
