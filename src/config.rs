//! Interpreter settings

/// Knobs for a single interpreter instance
#[derive(Debug, Clone)]
pub struct Config {
    /// Nested calls allowed before a StackOverflowError
    pub max_call_depth: usize,
    /// Print calls, stream resumptions and task activity to stderr
    pub trace: bool,
    /// Resume tasks still parked at an `await` once the program body finishes
    pub drain_tasks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: 200,
            trace: false,
            drain_tasks: true,
        }
    }
}

impl Config {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_drain_tasks(mut self, drain: bool) -> Self {
        self.drain_tasks = drain;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = Config::default().with_max_call_depth(8).with_trace(true);
        assert_eq!(config.max_call_depth, 8);
        assert!(config.trace);
        assert!(config.drain_tasks);
    }
}
