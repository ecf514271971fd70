use uuid::Uuid;

/// Outbound seam to the data plane. The orchestrator asks it how an input
/// reference splits into partitions and how intermediate results are named;
/// it never touches chunk bytes itself.
pub trait PartitionProvider: Send + Sync {
    /// Partition references for one input, one map task per entry.
    fn partitions(&self, input_ref: &str) -> Vec<String>;

    /// Reference to the intermediate results feeding one reducer.
    fn intermediate_ref(&self, job_id: &Uuid, reducer_index: u32) -> String {
        format!("{job_id}/intermediate/reducer_{reducer_index}")
    }
}

/// Size-based partitioner: splits an input into fixed-size chunks, assuming
/// a nominal input size when the data plane has not reported one.
#[derive(Debug, Clone)]
pub struct FixedSizePartitioner {
    pub partition_size_mb: u64,
    pub assumed_input_mb: u64,
}

impl FixedSizePartitioner {
    pub fn new(partition_size_mb: u64) -> Self {
        Self {
            partition_size_mb: partition_size_mb.max(1),
            assumed_input_mb: 100,
        }
    }

    fn partition_count(&self) -> u64 {
        self.assumed_input_mb.div_ceil(self.partition_size_mb).max(1)
    }
}

impl PartitionProvider for FixedSizePartitioner {
    fn partitions(&self, input_ref: &str) -> Vec<String> {
        (0..self.partition_count())
            .map(|i| format!("{input_ref}_chunk_{i}"))
            .collect()
    }
}
