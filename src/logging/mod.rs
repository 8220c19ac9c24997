pub mod sink;

pub use sink::{LogCrateSink, LogSink, MemorySink, NullSink};
