/// 同一学生同一题目已有的提交情况
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorSubmissions {
    pub latest_version: i64,
    /// 当前最佳版本的总分，没有最佳标记时为None
    pub best_total: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionDecision {
    pub version: i64,
    pub is_best: bool,
    /// 写入新记录前需要清除旧的最佳标记
    pub clear_previous_best: bool,
}

/// 决定新提交的版本号以及是否成为最佳版本
pub struct VersionSelector;

impl VersionSelector {
    pub fn decide(prior: Option<&PriorSubmissions>, new_total: f64) -> VersionDecision {
        let Some(prior) = prior else {
            return VersionDecision {
                version: 1,
                is_best: true,
                clear_previous_best: false,
            };
        };
        let version = prior.latest_version + 1;
        match prior.best_total {
            // 只有严格高于旧的最佳分数才替换，同分保留旧版本
            Some(best_total) if new_total > best_total => VersionDecision {
                version,
                is_best: true,
                clear_previous_best: true,
            },
            Some(_) => VersionDecision {
                version,
                is_best: false,
                clear_previous_best: false,
            },
            // 有历史提交却没有最佳标记，由新提交补上
            None => VersionDecision {
                version,
                is_best: true,
                clear_previous_best: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior(latest_version: i64, best_total: Option<f64>) -> PriorSubmissions {
        PriorSubmissions {
            latest_version,
            best_total,
        }
    }

    #[test]
    fn first_submission_is_best() {
        assert_eq!(
            VersionSelector::decide(None, 0.0),
            VersionDecision {
                version: 1,
                is_best: true,
                clear_previous_best: false
            }
        );
    }

    #[test]
    fn strict_improvement_takes_over() {
        let decision = VersionSelector::decide(Some(&prior(1, Some(6.0))), 8.0);
        assert_eq!(decision.version, 2);
        assert!(decision.is_best);
        assert!(decision.clear_previous_best);
    }

    #[test]
    fn regression_keeps_previous_best() {
        let decision = VersionSelector::decide(Some(&prior(3, Some(6.0))), 5.0);
        assert_eq!(decision.version, 4);
        assert!(!decision.is_best);
        assert!(!decision.clear_previous_best);
    }

    #[test]
    fn tie_keeps_previous_best() {
        let decision = VersionSelector::decide(Some(&prior(2, Some(6.0))), 6.0);
        assert_eq!(decision.version, 3);
        assert!(!decision.is_best);
        assert!(!decision.clear_previous_best);
    }

    #[test]
    fn missing_best_flag_is_restored() {
        let decision = VersionSelector::decide(Some(&prior(2, None)), 1.0);
        assert_eq!(decision.version, 3);
        assert!(decision.is_best);
        assert!(decision.clear_previous_best);
    }
}
