//! Runtime configuration options.

/// Runtime configuration options.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Allocations since the last cycle before an automatic collection.
    pub gc_threshold: usize,
    /// Floor for the threshold after it adapts to the live set.
    pub min_gc_threshold: usize,
    /// Next threshold as a multiple of the objects surviving a cycle.
    pub growth_factor: f64,
    /// Hard ceiling on live heap objects.
    pub max_objects: Option<usize>,
    pub initial_stack_capacity: usize,
    pub pin_buckets: usize,
    /// Whether allocation may start a collection on its own.
    pub auto_collect: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc_threshold: 4096,
            min_gc_threshold: 1024,
            growth_factor: 2.0,
            max_objects: None,
            initial_stack_capacity: 16,
            pin_buckets: 64,
            auto_collect: true,
        }
    }
}

impl RuntimeConfig {
    /// Threshold for the next cycle given the number of surviving objects.
    pub(crate) fn next_threshold(&self, live: usize) -> usize {
        let scaled = (live as f64 * self.growth_factor) as usize;
        scaled.max(self.min_gc_threshold)
    }
}
