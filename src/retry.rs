/// Retry budget carried across the attempts of one logical call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RetryState {
    retry_count: usize,
    max_retries: usize,
}

impl RetryState {
    pub(crate) fn new(max_retries: usize) -> Self {
        Self {
            retry_count: 0,
            max_retries,
        }
    }

    pub(crate) fn retry_count(&self) -> usize {
        self.retry_count
    }

    pub(crate) fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// 1-based number of the attempt about to run.
    pub(crate) fn attempt_number(&self) -> usize {
        self.retry_count + 1
    }

    pub(crate) fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Consumes one retry. Returns `false` once the budget is spent.
    pub(crate) fn record_retry(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.retry_count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::RetryState;

    #[test]
    fn budget_allows_max_retries_plus_one_attempts() {
        let mut state = RetryState::new(3);
        let mut attempts = 1;
        while state.record_retry() {
            attempts += 1;
        }

        assert_eq!(attempts, 4);
        assert_eq!(state.retry_count(), state.max_retries());
        assert!(!state.can_retry());
    }

    #[test]
    fn retry_count_never_exceeds_max() {
        let mut state = RetryState::new(1);
        assert!(state.record_retry());
        assert!(!state.record_retry());
        assert!(!state.record_retry());
        assert_eq!(state.retry_count(), 1);
        assert_eq!(state.attempt_number(), 2);
    }

    #[test]
    fn zero_budget_means_single_attempt() {
        let state = RetryState::new(0);
        assert_eq!(state.attempt_number(), 1);
        assert!(!state.can_retry());
    }
}
