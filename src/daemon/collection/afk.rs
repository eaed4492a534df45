/// Decides whether the user is away based on the time since the last input.
#[derive(Debug, Clone, Copy)]
pub struct AfkEvaluator {
    threshold_s: u32,
}

impl AfkEvaluator {
    pub fn from_seconds(threshold_s: u32) -> Self {
        Self { threshold_s }
    }

    pub fn is_afk(&self, idle_s: u32) -> bool {
        self.threshold_s < idle_s
    }
}

#[cfg(test)]
mod tests {
    use super::AfkEvaluator;

    #[test]
    fn test_threshold_is_exclusive() {
        let afk = AfkEvaluator::from_seconds(10);
        assert!(!afk.is_afk(0));
        assert!(!afk.is_afk(10));
        assert!(afk.is_afk(11));
    }
}
