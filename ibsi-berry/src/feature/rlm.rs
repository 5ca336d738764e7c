//! 游程长度矩阵特征.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::FeatureKind;
use crate::matrix::{FinalizedMatrix, Rlm, RlmMatrix};

/// 游程长度矩阵特征公式.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RlmFeature {
    /// 短游程强调.
    ShortRunEmphasis,

    /// 长游程强调.
    LongRunEmphasis,

    /// 低灰度游程强调.
    LowGreyLevelRunEmphasis,

    /// 高灰度游程强调.
    HighGreyLevelRunEmphasis,

    /// 短游程低灰度强调.
    ShortRunLowGreyLevelEmphasis,

    /// 短游程高灰度强调.
    ShortRunHighGreyLevelEmphasis,

    /// 长游程低灰度强调.
    LongRunLowGreyLevelEmphasis,

    /// 长游程高灰度强调.
    LongRunHighGreyLevelEmphasis,

    /// 灰度不均匀性.
    GreyLevelNonUniformity,

    /// 归一化灰度不均匀性.
    GreyLevelNonUniformityNormalized,

    /// 游程长度不均匀性.
    RunLengthNonUniformity,

    /// 归一化游程长度不均匀性.
    RunLengthNonUniformityNormalized,

    /// 游程百分比.
    RunPercentage,

    /// 灰度方差.
    GreyLevelVariance,

    /// 游程长度方差.
    RunLengthVariance,

    /// 游程熵.
    RunEntropy,
}

use RlmFeature::*;

static BY_ABBR: Lazy<HashMap<&'static str, RlmFeature>> =
    Lazy::new(|| RlmFeature::ALL.iter().map(|k| (k.abbr_name(), *k)).collect());

/// `Σ_j f(j) r_j / n_s`.
#[inline]
fn weighted_rj(m: &RlmMatrix, f: impl Fn(f64) -> f64) -> f64 {
    m.rj().iter().map(|&(j, c)| c * f(j as f64)).sum::<f64>() / m.n_s()
}

/// `Σ_i f(i) r_i / n_s`.
#[inline]
fn weighted_ri(m: &RlmMatrix, f: impl Fn(f64) -> f64) -> f64 {
    m.ri().iter().map(|&(i, c)| c * f(i as f64)).sum::<f64>() / m.n_s()
}

/// `Σ_ij f(i, j) r_ij / n_s`.
#[inline]
fn weighted_rij(m: &RlmMatrix, f: impl Fn(f64, f64) -> f64) -> f64 {
    m.entries()
        .iter()
        .map(|&(i, j, c)| c * f(i as f64, j as f64))
        .sum::<f64>()
        / m.n_s()
}

impl FeatureKind for RlmFeature {
    type Family = Rlm;

    const ALL: &'static [Self] = &[
        ShortRunEmphasis,
        LongRunEmphasis,
        LowGreyLevelRunEmphasis,
        HighGreyLevelRunEmphasis,
        ShortRunLowGreyLevelEmphasis,
        ShortRunHighGreyLevelEmphasis,
        LongRunLowGreyLevelEmphasis,
        LongRunHighGreyLevelEmphasis,
        GreyLevelNonUniformity,
        GreyLevelNonUniformityNormalized,
        RunLengthNonUniformity,
        RunLengthNonUniformityNormalized,
        RunPercentage,
        GreyLevelVariance,
        RunLengthVariance,
        RunEntropy,
    ];

    fn name(&self) -> &'static str {
        match self {
            ShortRunEmphasis => "RLM - short runs emphasis",
            LongRunEmphasis => "RLM - long runs emphasis",
            LowGreyLevelRunEmphasis => "RLM - low grey level run emphasis",
            HighGreyLevelRunEmphasis => "RLM - high grey level run emphasis",
            ShortRunLowGreyLevelEmphasis => "RLM - short run low grey level emphasis",
            ShortRunHighGreyLevelEmphasis => "RLM - short run high grey level emphasis",
            LongRunLowGreyLevelEmphasis => "RLM - long run low grey level emphasis",
            LongRunHighGreyLevelEmphasis => "RLM - long run high grey level emphasis",
            GreyLevelNonUniformity => "RLM - grey level non-uniformity",
            GreyLevelNonUniformityNormalized => "RLM - normalised grey level non-uniformity",
            RunLengthNonUniformity => "RLM - run length non-uniformity",
            RunLengthNonUniformityNormalized => "RLM - normalised run length non-uniformity",
            RunPercentage => "RLM - run percentage",
            GreyLevelVariance => "RLM - grey level variance",
            RunLengthVariance => "RLM - run length variance",
            RunEntropy => "RLM - run entropy",
        }
    }

    fn abbr_name(&self) -> &'static str {
        match self {
            ShortRunEmphasis => "rlm_sre",
            LongRunEmphasis => "rlm_lre",
            LowGreyLevelRunEmphasis => "rlm_lgre",
            HighGreyLevelRunEmphasis => "rlm_hgre",
            ShortRunLowGreyLevelEmphasis => "rlm_srlge",
            ShortRunHighGreyLevelEmphasis => "rlm_srhge",
            LongRunLowGreyLevelEmphasis => "rlm_lrlge",
            LongRunHighGreyLevelEmphasis => "rlm_lrhge",
            GreyLevelNonUniformity => "rlm_glnu",
            GreyLevelNonUniformityNormalized => "rlm_glnu_norm",
            RunLengthNonUniformity => "rlm_rlnu",
            RunLengthNonUniformityNormalized => "rlm_rlnu_norm",
            RunPercentage => "rlm_r_perc",
            GreyLevelVariance => "rlm_gl_var",
            RunLengthVariance => "rlm_rl_var",
            RunEntropy => "rlm_rl_entr",
        }
    }

    fn ibsi_id(&self) -> &'static str {
        match self {
            ShortRunEmphasis => "22OV",
            LongRunEmphasis => "W4KF",
            LowGreyLevelRunEmphasis => "V3SW",
            HighGreyLevelRunEmphasis => "G3QZ",
            ShortRunLowGreyLevelEmphasis => "HTZT",
            ShortRunHighGreyLevelEmphasis => "GD3A",
            LongRunLowGreyLevelEmphasis => "IVPO",
            LongRunHighGreyLevelEmphasis => "3KUM",
            GreyLevelNonUniformity => "R5YN",
            GreyLevelNonUniformityNormalized => "OVBL",
            RunLengthNonUniformity => "W92Y",
            RunLengthNonUniformityNormalized => "IC23",
            RunPercentage => "9ZK5",
            GreyLevelVariance => "8CE5",
            RunLengthVariance => "SXLW",
            RunEntropy => "HJ9O",
        }
    }

    #[inline]
    fn from_abbr(abbr: &str) -> Option<Self> {
        BY_ABBR.get(abbr).copied()
    }

    fn formula(&self, m: &RlmMatrix) -> f64 {
        let n_s = m.n_s();
        match self {
            ShortRunEmphasis => weighted_rj(m, |j| j.powi(-2)),
            LongRunEmphasis => weighted_rj(m, |j| j.powi(2)),
            LowGreyLevelRunEmphasis => weighted_ri(m, |i| i.powi(-2)),
            HighGreyLevelRunEmphasis => weighted_ri(m, |i| i.powi(2)),
            ShortRunLowGreyLevelEmphasis => weighted_rij(m, |i, j| (i * j).powi(-2)),
            ShortRunHighGreyLevelEmphasis => weighted_rij(m, |i, j| (i / j).powi(2)),
            LongRunLowGreyLevelEmphasis => weighted_rij(m, |i, j| (j / i).powi(2)),
            LongRunHighGreyLevelEmphasis => weighted_rij(m, |i, j| (i * j).powi(2)),
            GreyLevelNonUniformity => sum_sq(m.ri()) / n_s,
            GreyLevelNonUniformityNormalized => sum_sq(m.ri()) / (n_s * n_s),
            RunLengthNonUniformity => sum_sq(m.rj()) / n_s,
            RunLengthNonUniformityNormalized => sum_sq(m.rj()) / (n_s * n_s),
            RunPercentage => n_s / m.n_v(),
            GreyLevelVariance => {
                let (mu, _) = m.means();
                weighted_rij(m, |i, _| (i - mu).powi(2))
            }
            RunLengthVariance => {
                let (_, mu) = m.means();
                weighted_rij(m, |_, j| (j - mu).powi(2))
            }
            RunEntropy => -m
                .entries()
                .iter()
                .map(|&(_, _, c)| {
                    let p = c / n_s;
                    p * p.log2()
                })
                .sum::<f64>(),
        }
    }
}

/// 边缘分布的平方和.
#[inline]
fn sum_sq(marginal: &[(u32, f64)]) -> f64 {
    marginal.iter().map(|(_, c)| c * c).sum()
}
