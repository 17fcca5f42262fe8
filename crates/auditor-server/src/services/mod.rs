pub mod adapters;
pub mod context;
pub mod generation;
pub mod retrieval;
