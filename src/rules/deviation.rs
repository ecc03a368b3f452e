use crate::config::DeviationPolicy;

/// Signed difference between a candidate distance and the recorded one, with
/// the policy's verdict attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    pub delta: f64,
    /// `|delta| / |recorded|`; infinite when recorded is zero and delta is not.
    pub relative: f64,
    pub material: bool,
}

impl DeviationPolicy {
    pub fn assess(&self, candidate: f64, recorded: f64) -> Deviation {
        let delta = candidate - recorded;
        let relative = if delta == 0.0 {
            0.0
        } else if recorded == 0.0 {
            f64::INFINITY
        } else {
            (delta / recorded).abs()
        };

        let over_absolute = self.absolute_km.is_some_and(|limit| delta.abs() > limit);
        let over_relative = self.relative.is_some_and(|limit| relative > limit);

        Deviation {
            delta,
            relative,
            material: over_absolute || over_relative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(absolute_km: Option<f64>, relative: Option<f64>) -> DeviationPolicy {
        DeviationPolicy {
            absolute_km,
            relative,
        }
    }

    #[test]
    fn test_relative_threshold() {
        let p = policy(None, Some(0.20));

        let d = p.assess(15.0, 10.0);
        assert_eq!(d.delta, 5.0);
        assert_eq!(d.relative, 0.5);
        assert!(d.material);

        assert!(!p.assess(8.0, 8.0).material);
        assert!(!p.assess(11.0, 10.0).material);
    }

    #[test]
    fn test_threshold_is_strict() {
        let p = policy(Some(2.0), None);
        assert!(!p.assess(12.0, 10.0).material);
        assert!(p.assess(12.5, 10.0).material);
        assert!(p.assess(7.5, 10.0).material);
    }

    #[test]
    fn test_either_threshold_suffices() {
        let p = policy(Some(50.0), Some(0.20));
        // 5 km on a 10 km store: relative fires, absolute does not
        assert!(p.assess(15.0, 10.0).material);
        // 60 km on a 1000 km store: absolute fires, relative does not
        assert!(p.assess(1060.0, 1000.0).material);
        assert!(!p.assess(1010.0, 1000.0).material);
    }

    #[test]
    fn test_zero_recorded_value() {
        let p = policy(None, Some(0.20));
        let d = p.assess(4.0, 0.0);
        assert!(d.relative.is_infinite());
        assert!(d.material);

        assert!(!p.assess(0.0, 0.0).material);
    }

    #[test]
    fn test_no_thresholds_is_never_material() {
        let p = policy(None, None);
        assert!(!p.assess(1000.0, 1.0).material);
    }
}
