use std::time::Duration;

pub struct CoordinatorConfig {
    pub read_model_ttl: Duration,
    pub cache_capacity: usize,
    pub command_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            read_model_ttl: Duration::from_secs(1),
            cache_capacity: 16,
            command_buffer: 100,
        }
    }
}
