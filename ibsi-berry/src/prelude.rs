//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::cache::MatrixCache;
pub use crate::data::{Discretisation, DiscretizedImage, RoiMask, Volume, VoxelGrid};
pub use crate::error::{ConfigError, TextureError};
pub use crate::extract::{AnyFeature, Extractor};
pub use crate::feature::{
    CmFeature, DiscretisationSpec, ExtractionSettings, Feature, FeatureGenerator, FeatureKind,
    FeatureSettings, FeatureValue, RlmFeature,
};
pub use crate::matrix::{FinalizedMatrix, Glcm, MatrixFamily, Rlm};
pub use crate::spatial::SpatialMethod;
pub use crate::Idx3d;

#[cfg(feature = "rayon")]
pub use crate::extract::par_extract;
