//! 共生矩阵特征.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::FeatureKind;
use crate::matrix::{Glcm, GlcmMatrix};

/// 共生矩阵特征公式.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CmFeature {
    /// 联合最大值.
    JointMaximum,

    /// 联合均值.
    JointAverage,

    /// 联合方差.
    JointVariance,

    /// 联合熵.
    JointEntropy,

    /// 角二阶矩 (能量).
    AngularSecondMoment,

    /// 对比度.
    Contrast,

    /// 相异性.
    Dissimilarity,

    /// 逆差.
    InverseDifference,

    /// 逆差矩.
    InverseDifferenceMoment,

    /// 相关性.
    Correlation,
}

use CmFeature::*;

static BY_ABBR: Lazy<HashMap<&'static str, CmFeature>> =
    Lazy::new(|| CmFeature::ALL.iter().map(|k| (k.abbr_name(), *k)).collect());

/// `Σ_ij f(i, j) p_ij`.
#[inline]
fn expectation(m: &GlcmMatrix, f: impl Fn(f64, f64) -> f64) -> f64 {
    m.entries()
        .iter()
        .map(|&(i, j, p)| p * f(i as f64, j as f64))
        .sum()
}

impl FeatureKind for CmFeature {
    type Family = Glcm;

    const ALL: &'static [Self] = &[
        JointMaximum,
        JointAverage,
        JointVariance,
        JointEntropy,
        AngularSecondMoment,
        Contrast,
        Dissimilarity,
        InverseDifference,
        InverseDifferenceMoment,
        Correlation,
    ];

    fn name(&self) -> &'static str {
        match self {
            JointMaximum => "CM - joint maximum",
            JointAverage => "CM - joint average",
            JointVariance => "CM - joint variance",
            JointEntropy => "CM - joint entropy",
            AngularSecondMoment => "CM - angular second moment",
            Contrast => "CM - contrast",
            Dissimilarity => "CM - dissimilarity",
            InverseDifference => "CM - inverse difference",
            InverseDifferenceMoment => "CM - inverse difference moment",
            Correlation => "CM - correlation",
        }
    }

    fn abbr_name(&self) -> &'static str {
        match self {
            JointMaximum => "cm_joint_max",
            JointAverage => "cm_joint_avg",
            JointVariance => "cm_joint_var",
            JointEntropy => "cm_joint_entr",
            AngularSecondMoment => "cm_energy",
            Contrast => "cm_contrast",
            Dissimilarity => "cm_dissimilarity",
            InverseDifference => "cm_inv_diff",
            InverseDifferenceMoment => "cm_inv_diff_mom",
            Correlation => "cm_corr",
        }
    }

    fn ibsi_id(&self) -> &'static str {
        match self {
            JointMaximum => "GYBY",
            JointAverage => "60VM",
            JointVariance => "UR99",
            JointEntropy => "TU9B",
            AngularSecondMoment => "8ZQL",
            Contrast => "ACUI",
            Dissimilarity => "8S9J",
            InverseDifference => "IB1Z",
            InverseDifferenceMoment => "WF0Z",
            Correlation => "NI2N",
        }
    }

    #[inline]
    fn from_abbr(abbr: &str) -> Option<Self> {
        BY_ABBR.get(abbr).copied()
    }

    fn formula(&self, m: &GlcmMatrix) -> f64 {
        match self {
            JointMaximum => m
                .entries()
                .iter()
                .map(|&(_, _, p)| p)
                .fold(f64::NAN, f64::max),
            JointAverage => expectation(m, |i, _| i),
            JointVariance => {
                let mu = expectation(m, |i, _| i);
                expectation(m, |i, _| (i - mu).powi(2))
            }
            JointEntropy => -m
                .entries()
                .iter()
                .map(|&(_, _, p)| p * p.log2())
                .sum::<f64>(),
            AngularSecondMoment => m.entries().iter().map(|&(_, _, p)| p * p).sum(),
            Contrast => expectation(m, |i, j| (i - j).powi(2)),
            Dissimilarity => expectation(m, |i, j| (i - j).abs()),
            InverseDifference => expectation(m, |i, j| 1.0 / (1.0 + (i - j).abs())),
            InverseDifferenceMoment => expectation(m, |i, j| 1.0 / (1.0 + (i - j).powi(2))),
            Correlation => {
                let (mu, var) = m.marginal_stats();
                if var <= 0.0 {
                    return f64::NAN;
                }
                expectation(m, |i, j| (i - mu) * (j - mu)) / var
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::evaluate;
    use crate::matrix::{Counts, MergedMatrix};

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    fn matrix(counts: &[((u32, u32), u64)]) -> GlcmMatrix {
        GlcmMatrix::from_merged(MergedMatrix {
            contributors: vec![],
            counts: Counts::from_iter(counts.iter().copied()),
            n_v: 0,
        })
    }

    #[test]
    fn test_abbr_table() {
        for k in CmFeature::ALL {
            assert_eq!(CmFeature::from_abbr(k.abbr_name()), Some(*k));
        }
        assert_eq!(CmFeature::from_abbr("rlm_sre"), None);
    }

    #[test]
    fn test_hand_computed() {
        // 序列 1 2 2 3 的水平对称共生矩阵.
        let m = matrix(&[((1, 2), 1), ((2, 1), 1), ((2, 2), 2), ((2, 3), 1), ((3, 2), 1)]);
        let ev = |k: CmFeature| evaluate(k, &m);
        assert!(float_eq(ev(JointMaximum), 2.0 / 6.0));
        assert!(float_eq(ev(JointAverage), 2.0));
        assert!(float_eq(ev(JointVariance), 2.0 / 6.0));
        assert!(float_eq(ev(AngularSecondMoment), (4.0 + 4.0) / 36.0));
        assert!(float_eq(ev(Contrast), 4.0 / 6.0));
        assert!(float_eq(ev(Dissimilarity), 4.0 / 6.0));
        assert!(float_eq(ev(InverseDifference), 2.0 / 6.0 + 4.0 / 6.0 * 0.5));
        assert!(float_eq(ev(InverseDifferenceMoment), 2.0 / 6.0 + 4.0 / 6.0 * 0.5));
        // 每个非零元素都有一个坐标等于均值 2, 协方差为 0.
        assert!(float_eq(ev(Correlation), 0.0));
        let entr = -(4.0 * (1.0f64 / 6.0) * (1.0f64 / 6.0).log2() + (2.0 / 6.0) * (2.0f64 / 6.0).log2());
        assert!(float_eq(ev(JointEntropy), entr));
    }

    #[test]
    fn test_uniform_and_empty() {
        let m = matrix(&[((3, 3), 10)]);
        assert!(float_eq(evaluate(JointMaximum, &m), 1.0));
        assert!(float_eq(evaluate(Contrast, &m), 0.0));
        assert!(evaluate(Correlation, &m).is_nan());

        let m = matrix(&[]);
        for k in CmFeature::ALL {
            assert!(evaluate(*k, &m).is_nan());
        }
    }
}
