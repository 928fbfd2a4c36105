pub mod chunked_writer;
pub mod conversion;
pub mod extractors;
pub mod ingestion;
pub mod task_registry;
pub mod worker;
