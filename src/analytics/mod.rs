pub mod factors;
pub mod ingest;
pub mod risk;
pub mod snapshot;
