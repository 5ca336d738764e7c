#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 基于 IBSI 标准的 3D 医学影像纹理矩阵与纹理特征计算引擎.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 流水线
//!
//! 1. 离散化: 连续灰度的 [`Volume`] + [`RoiMask`] -> [`DiscretizedImage`],
//!   见 [`data::discretize`];
//! 2. 矩阵构建: 按空间聚合方法 ([`SpatialMethod`]) 生成空间单元,
//!   对每个单元统计稀疏原始矩阵, 见 [`matrix`];
//! 3. 合并: 按空间聚合方法把原始矩阵分组求和, 见 [`matrix::merge`];
//! 4. 定型: 计算总计数和边缘分布;
//! 5. 特征: 在每个矩阵上求特征值, 以 `nanmean` 取平均, 见 [`feature`].
//!
//! 第 1 至 4 步的结果由 [`MatrixCache`] 缓存, 在共享离散化参数和空间聚合方法的
//! 特征之间复用.
//!
//! # 注意
//!
//! 1. 所有数组按 `(z, y, x)` 组织.
//! 2. 退化输入 (空 ROI, 方向上体素不足, 常量 ROI) 得到 `NaN` 特征值, 不会返回 `Err`.
//!   `Err` 只用于非法配置和违反输入契约的数据.
//! 3. 矩阵族目前实现了游程长度矩阵 (GLRLM) 和共生矩阵 (GLCM).
//!   新的矩阵族只需实现 [`MatrixFamily`] 和 [`feature::FeatureKind`].

/// 三维索引, 按 `(z, y, x)` 给出.
pub type Idx3d = (usize, usize, usize);

pub mod cache;
pub mod data;
pub mod error;
pub mod extract;
pub mod feature;
pub mod matrix;
pub mod prelude;
pub mod spatial;

pub use cache::MatrixCache;
pub use data::{Discretisation, DiscretizedImage, RoiMask, Volume, VoxelGrid};
pub use error::{ConfigError, ConfigResult, TextureError, TextureResult};
pub use extract::{AnyFeature, Extractor};
pub use matrix::{FinalizedMatrix, MatrixFamily};
pub use spatial::SpatialMethod;

#[cfg(feature = "rayon")]
pub use extract::par_extract;
