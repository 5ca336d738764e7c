//! 运行时错误.
//!
//! 只有两类错误: 配置错误和输入数据契约错误. 空 ROI, 空矩阵等退化情况不属于错误,
//! 它们在特征层被表示为 `NaN`.

use thiserror::Error;

use crate::Idx3d;

/// 配置错误. 在构造特征或离散化参数时立即返回, 不会被静默修正.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 未知的离散化方法名称.
    #[error("unknown discretisation method `{0}`")]
    UnknownDiscretisationMethod(String),

    /// 未知的空间聚合方法名称.
    #[error("unknown spatial method `{0}`")]
    UnknownSpatialMethod(String),

    /// 未知的特征缩写名.
    #[error("unknown feature `{0}`")]
    UnknownFeature(String),

    /// 固定 bin 宽度方法缺少 `bin_width`.
    #[error("`fixed_bin_size` requires a bin width")]
    MissingBinWidth,

    /// 固定 bin 数量方法缺少 `bin_number`.
    #[error("`fixed_bin_number` requires a bin number")]
    MissingBinNumber,

    /// bin 宽度非正 (或不是有限值).
    #[error("bin width must be a positive finite number, got {0}")]
    NonPositiveBinWidth(f64),

    /// bin 数量为 0.
    #[error("bin number must be positive, got {0}")]
    NonPositiveBinNumber(u32),

    /// 离散化下界不是有限值.
    #[error("intensity lower bound must be finite, got {0}")]
    InvalidLowerBound(f64),

    /// 体素分辨率非正 (或不是有限值). 按 `(z, y, x)` 给出.
    #[error("voxel spacing must be positive and finite, got {0:?}")]
    InvalidSpacing([f64; 3]),

    /// 裁剪距离为负 (或不是有限值).
    #[error("cropping distance must be non-negative, got {0}")]
    InvalidCroppingDistance(f64),
}

/// 纹理计算的运行时错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TextureError {
    /// 参数配置错误.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 图像和掩膜形状不一致. 第一个参数为图像形状, 第二个为掩膜形状.
    #[error("image shape {0:?} does not match mask shape {1:?}")]
    ShapeMismatch(Idx3d, Idx3d),

    /// 不做离散化时, ROI 内出现了小于 1 的灰度值.
    #[error("grey level {value} at {pos:?} is below 1; the image is not discretised")]
    InvalidGreyLevel {
        /// 出错体素在原图中的索引.
        pos: Idx3d,

        /// 取整后的灰度值.
        value: f64,
    },
}

/// 配置相关的运行时结果.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 纹理计算的运行时结果.
pub type TextureResult<T> = Result<T, TextureError>;
