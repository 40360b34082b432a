pub mod orchestrator;
pub mod shopify;
pub mod staging;
pub mod storage;
