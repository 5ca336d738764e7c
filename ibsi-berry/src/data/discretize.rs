//! 灰度离散化.
//!
//! 将 ROI 内的连续灰度映射为有限的整数灰度级 `[1, n_g]`.

use std::fmt;

use log::debug;
use ndarray::{Array3, Zip};
use ordered_float::OrderedFloat;

use super::{crop_to_roi, DiscretizedImage, RoiMask, Volume, VoxelGrid};
use crate::error::{ConfigError, ConfigResult, TextureError, TextureResult};
use crate::Idx3d;

/// 离散化方法.
///
/// 该对象是只读的. 若要修改参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Discretisation {
    /// 固定 bin 数量 (IBSI: FBN).
    FixedBinNumber {
        /// bin 数量, 即 `n_g`.
        bin_number: u32,
    },

    /// 固定 bin 宽度 (IBSI: FBS).
    FixedBinSize {
        /// bin 宽度, 与灰度同单位.
        bin_width: OrderedFloat<f64>,

        /// 第一个 bin 的下界. `None` 时取 ROI 内的最小灰度.
        lower_bound: Option<OrderedFloat<f64>>,
    },

    /// 不离散化. 灰度值已经是灰度级, 只做四舍五入.
    None,
}

impl Discretisation {
    /// 构建固定 bin 数量的离散化方法. `bin_number` 必须为正.
    pub fn fixed_bin_number(bin_number: u32) -> ConfigResult<Self> {
        if bin_number == 0 {
            return Err(ConfigError::NonPositiveBinNumber(bin_number));
        }
        Ok(Self::FixedBinNumber { bin_number })
    }

    /// 构建固定 bin 宽度的离散化方法.
    ///
    /// `bin_width` 必须为正的有限值; `lower_bound` 若给出则必须为有限值.
    pub fn fixed_bin_size(bin_width: f64, lower_bound: Option<f64>) -> ConfigResult<Self> {
        if !(bin_width.is_finite() && bin_width > 0.0) {
            return Err(ConfigError::NonPositiveBinWidth(bin_width));
        }
        if let Some(lb) = lower_bound.filter(|lb| !lb.is_finite()) {
            return Err(ConfigError::InvalidLowerBound(lb));
        }
        Ok(Self::FixedBinSize {
            bin_width: OrderedFloat(bin_width),
            lower_bound: lower_bound.map(OrderedFloat),
        })
    }

    /// 按配置名称 (`fixed_bin_number`, `fixed_bin_size`, `none`) 及其参数构建.
    ///
    /// 与所选方法无关的参数会被忽略.
    pub fn from_parts(
        method: &str,
        bin_width: Option<f64>,
        bin_number: Option<u32>,
    ) -> ConfigResult<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "fixed_bin_number" => {
                Self::fixed_bin_number(bin_number.ok_or(ConfigError::MissingBinNumber)?)
            }
            "fixed_bin_size" => {
                Self::fixed_bin_size(bin_width.ok_or(ConfigError::MissingBinWidth)?, None)
            }
            "none" => Ok(Self::None),
            _ => Err(ConfigError::UnknownDiscretisationMethod(method.to_string())),
        }
    }

    /// 配置中使用的方法名称.
    pub const fn method_name(&self) -> &'static str {
        match self {
            Self::FixedBinNumber { .. } => "fixed_bin_number",
            Self::FixedBinSize { .. } => "fixed_bin_size",
            Self::None => "none",
        }
    }

    /// 离散化 `volume` 中由 `mask` 给出的 ROI.
    ///
    /// 图像和掩膜先被裁剪到 ROI 包围盒, 包围盒各向外扩张
    /// `cropping_distance` 毫米. ROI 内灰度不是有限值的体素会被移出 ROI.
    /// 空 ROI 得到形状为 `(0, 0, 0)` 的图像, 而不是错误.
    ///
    /// 相同的输入总是得到完全相同的输出.
    pub fn discretise(
        &self,
        volume: &Volume,
        mask: &RoiMask,
        cropping_distance: f64,
    ) -> TextureResult<DiscretizedImage> {
        if volume.shape() != mask.shape() {
            return Err(TextureError::ShapeMismatch(volume.shape(), mask.shape()));
        }
        if !(cropping_distance.is_finite() && cropping_distance >= 0.0) {
            return Err(ConfigError::InvalidCroppingDistance(cropping_distance).into());
        }

        let [sz, sy, sx] = volume.spacing();
        let margin = (
            (cropping_distance / sz).ceil() as usize,
            (cropping_distance / sy).ceil() as usize,
            (cropping_distance / sx).ceil() as usize,
        );
        let Some((origin, data, mut roi)) = crop_to_roi(volume, mask, margin) else {
            debug!("empty ROI, nothing to discretise");
            return Ok(DiscretizedImage::empty(self.default_n_g()));
        };

        // intensity mask: 非有限灰度不属于 ROI.
        Zip::from(&mut roi)
            .and(&data)
            .for_each(|m, v| *m &= v.is_finite());

        let Some((min, max)) = min_max(data.iter().zip(roi.iter())) else {
            debug!("ROI has no finite intensity");
            let (z, y, x) = (roi.shape()[0], roi.shape()[1], roi.shape()[2]);
            let grey = Array3::zeros((z, y, x));
            return Ok(DiscretizedImage::from_raw(grey, roi, self.default_n_g()));
        };

        let mut grey = Array3::<u32>::zeros(data.raw_dim());
        let mut n_g = 1;
        for (((pos, g), &v), &m) in grey.indexed_iter_mut().zip(data.iter()).zip(roi.iter()) {
            if !m {
                continue;
            }
            let level = self.level(v as f64, min, max);
            if level < 1.0 {
                let (z, y, x) = pos;
                let pos: Idx3d = (z + origin.0, y + origin.1, x + origin.2);
                return Err(TextureError::InvalidGreyLevel { pos, value: level });
            }
            // 超大灰度级按 `u32::MAX` 饱和.
            *g = level as u32;
            n_g = n_g.max(*g);
        }

        let n_g = match self {
            Self::FixedBinNumber { bin_number } => *bin_number,
            _ => n_g,
        };
        Ok(DiscretizedImage::from_raw(grey, roi, n_g))
    }

    /// 单个灰度值对应的灰度级. ROI 灰度范围为 `[min, max]`.
    ///
    /// 只有 [`Discretisation::None`] 可能返回小于 1 的值.
    fn level(&self, x: f64, min: f64, max: f64) -> f64 {
        match *self {
            Self::FixedBinNumber { bin_number } => {
                if max <= min {
                    return 1.0;
                }
                let n = bin_number as f64;
                // `x == max` 落在最后一个 bin.
                ((n * (x - min) / (max - min)).floor() + 1.0).min(n)
            }
            Self::FixedBinSize {
                bin_width,
                lower_bound,
            } => {
                let lb = lower_bound.map_or(min, |lb| lb.0);
                // 低于下界的灰度被截断到第一个 bin.
                ((x - lb) / bin_width.0).floor().max(0.0) + 1.0
            }
            Self::None => x.round(),
        }
    }

    /// 空 ROI 时使用的 `n_g`.
    #[inline]
    fn default_n_g(&self) -> u32 {
        match self {
            Self::FixedBinNumber { bin_number } => *bin_number,
            _ => 1,
        }
    }
}

/// ROI 内的灰度范围. ROI 为空时返回 `None`.
fn min_max<'a, I>(it: I) -> Option<(f64, f64)>
where
    I: Iterator<Item = (&'a f32, &'a bool)>,
{
    it.filter_map(|(v, m)| m.then_some(*v as f64))
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

impl fmt::Display for Discretisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedBinNumber { bin_number } => write!(f, "fbn_{bin_number}"),
            Self::FixedBinSize { bin_width, .. } => write!(f, "fbs_{}", bin_width.0),
            Self::None => f.write_str("none"),
        }
    }
}
